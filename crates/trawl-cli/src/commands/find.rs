//! Find command - run a streaming search and print matches as they arrive.

use crate::OutputFormat;
use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use trawl_core::{
    ChannelQueryHandler, Config, ContentOptions, ContentSyntax, IndexOptions, QueryConfig,
    QueryController, QueryEvent, QueryResult, RecentSpan, SizeFilter, TimeWindow, TypeFilter,
};

/// Exit code after Ctrl-C, as shells report SIGINT
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Args, Debug, Default)]
pub struct FindArgs {
    /// Directory to search (defaults to the current directory)
    pub root: Option<PathBuf>,

    /// Name patterns, separated by ';' (e.g., "*.txt;*.md")
    #[arg(short, long)]
    pub name: Option<String>,

    /// Match names case-sensitively
    #[arg(long)]
    pub case_sensitive: bool,

    /// Do not descend into subdirectories
    #[arg(long)]
    pub no_recursive: bool,

    /// Follow symbolic links while listing
    #[arg(long)]
    pub follow_links: bool,

    /// Minimum size (suffixes K, M, G)
    #[arg(long, conflicts_with = "size")]
    pub min_size: Option<String>,

    /// Maximum size (suffixes K, M, G)
    #[arg(long, conflicts_with = "size")]
    pub max_size: Option<String>,

    /// Exact size (suffixes K, M, G)
    #[arg(long)]
    pub size: Option<String>,

    /// Modified at or after this date (YYYY-MM-DD or RFC 3339)
    #[arg(long, conflicts_with = "within")]
    pub newer: Option<String>,

    /// Modified at or before this date (YYYY-MM-DD or RFC 3339)
    #[arg(long, conflicts_with = "within")]
    pub older: Option<String>,

    /// Modified during the last span (e.g., 30m, 12h, 3d, 2mo, 1y)
    #[arg(long)]
    pub within: Option<String>,

    /// Owner name
    #[arg(long)]
    pub user: Option<String>,

    /// Group name
    #[arg(long)]
    pub group: Option<String>,

    /// Entry type: f (file), d (dir), l (link), s (special), x (executable), suid
    #[arg(short = 't', long = "type")]
    pub file_type: Option<String>,

    /// Allowed mime type (repeatable)
    #[arg(long, conflicts_with = "file_type")]
    pub mime: Vec<String>,

    /// Only files containing this text
    #[arg(short = 'c', long)]
    pub contains: Option<String>,

    /// Treat --contains as a regular expression
    #[arg(long, requires = "contains", conflicts_with = "wildcard")]
    pub regex: bool,

    /// Treat --contains as a wildcard pattern
    #[arg(long, requires = "contains")]
    pub wildcard: bool,

    /// Match --contains case-sensitively
    #[arg(long, requires = "contains")]
    pub content_case_sensitive: bool,

    /// Also search files that look binary
    #[arg(long, requires = "contains")]
    pub binary: bool,

    /// Metadata key pattern (wildcards allowed)
    #[arg(long, requires = "meta_value")]
    pub meta_key: Option<String>,

    /// Text the metadata value must contain
    #[arg(long)]
    pub meta_value: Option<String>,

    /// Use the locate database instead of listing the directory
    #[arg(long)]
    pub locate: bool,

    /// Stop after this many matches (0 = unlimited)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub output: OutputFormat,
}

/// Run the find command.
pub fn run(config: Config, args: FindArgs, quiet: bool) -> anyhow::Result<ExitCode> {
    let limit = args.limit.unwrap_or(config.general.max_results);
    let output = args.output;
    let query = build_query(&config, args, Utc::now())?;

    let (handler, events) = ChannelQueryHandler::new();
    let mut controller =
        QueryController::new(query, Arc::new(handler))?.with_limit(limit);

    let kill = controller.kill_handle();
    ctrlc::set_handler(move || kill.kill()).context("Failed to install Ctrl-C handler")?;

    let start = Instant::now();
    controller.start()?;

    let mut found = 0usize;
    let mut result = QueryResult::Cancelled;
    for event in events.iter() {
        match event {
            QueryEvent::Match(m) => {
                found += 1;
                match output {
                    OutputFormat::Text => match &m.matching_line {
                        Some(line) => println!("{}:{}", m.entry.path.display(), line),
                        None => println!("{}", m.entry.path.display()),
                    },
                    OutputFormat::Json => println!("{}", serde_json::to_string(&m)?),
                }
            }
            QueryEvent::Notice(message) => {
                if !quiet {
                    eprintln!("{}", message);
                }
            }
            QueryEvent::Finished(r) => {
                result = r;
                break;
            }
        }
    }
    let elapsed = start.elapsed();

    if !quiet && output == OutputFormat::Text {
        eprintln!(
            "Found {} matches in {:.3}ms",
            found,
            elapsed.as_secs_f64() * 1000.0
        );
    }

    Ok(match result {
        QueryResult::Success => ExitCode::SUCCESS,
        QueryResult::Cancelled => {
            if !quiet {
                eprintln!("Search cancelled");
            }
            ExitCode::from(EXIT_INTERRUPTED)
        }
        QueryResult::Failed(e) => {
            eprintln!("Search failed: {} (code {})", e, e.code());
            ExitCode::FAILURE
        }
    })
}

/// Turn command-line arguments into a query, on top of the config defaults.
fn build_query(config: &Config, args: FindArgs, now: DateTime<Utc>) -> anyhow::Result<QueryConfig> {
    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir().context("Cannot determine current directory")?,
    };

    let mut query = QueryConfig::from_defaults(config, root);
    if let Some(names) = args.name {
        query = query.with_names(names, args.case_sensitive || config.search.case_sensitive);
    }
    if args.no_recursive {
        query = query.recursive(false);
    }
    if args.follow_links {
        query.follow_links = true;
    }

    query = query.with_size(match args.size {
        Some(exact) => SizeFilter::Equal(parse_size(&exact)?),
        None => SizeFilter::from_bounds(
            args.min_size.as_deref().map(parse_size).transpose()?,
            args.max_size.as_deref().map(parse_size).transpose()?,
        ),
    });

    let time = match args.within {
        Some(span) => {
            let span = RecentSpan::parse(&span).ok_or_else(|| {
                anyhow!("Invalid time span '{}' (try 30m, 12h, 3d, 2mo, 1y)", span)
            })?;
            TimeWindow::within(span, now)
        }
        None => TimeWindow {
            from: args.newer.as_deref().map(parse_time).transpose()?,
            to: args.older.as_deref().map(parse_time).transpose()?,
        },
    };
    query = query.with_time_window(time);

    if let Some(user) = args.user {
        query = query.with_owner(user);
    }
    if let Some(group) = args.group {
        query = query.with_group(group);
    }

    if !args.mime.is_empty() {
        query = query
            .with_type(TypeFilter::MimeTypeList)
            .with_mime_types(args.mime);
    } else if let Some(kind) = args.file_type {
        query = query.with_type(parse_type(&kind)?);
    }

    if let Some(pattern) = args.contains {
        let syntax = if args.regex {
            ContentSyntax::Regex
        } else if args.wildcard {
            ContentSyntax::Wildcard
        } else {
            ContentSyntax::Literal
        };
        query = query.with_content(ContentOptions {
            pattern,
            syntax,
            case_sensitive: args.content_case_sensitive,
            search_binary: args.binary || config.content.search_binary,
        });
    }

    if let Some(value) = args.meta_value {
        query = query.with_metadata(args.meta_key.unwrap_or_default(), value);
    }

    if args.locate {
        query = query.with_external_index(IndexOptions {
            program: config.locate.program.clone(),
            args: config.locate.args.clone(),
        });
    }

    Ok(query)
}

/// Parse a size such as `512`, `10K`, `1.5M` or `2G` (binary multiples).
fn parse_size(input: &str) -> anyhow::Result<u64> {
    let input = input.trim();
    let (number, multiplier) = match input.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => {
            let multiplier: u64 = match c.to_ascii_uppercase() {
                'K' => 1 << 10,
                'M' => 1 << 20,
                'G' => 1 << 30,
                _ => bail!("Unknown size suffix in '{}' (use K, M or G)", input),
            };
            (&input[..i], multiplier)
        }
        _ => (input, 1),
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| anyhow!("Size '{}' is too large", input));
    }
    let fractional: f64 = number
        .parse()
        .map_err(|_| anyhow!("Invalid size '{}'", input))?;
    if !fractional.is_finite() || fractional < 0.0 {
        bail!("Invalid size '{}'", input);
    }
    Ok((fractional * multiplier as f64) as u64)
}

/// Parse a date (`YYYY-MM-DD`, midnight UTC) or an RFC 3339 timestamp.
fn parse_time(input: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(input) {
        return Ok(stamp.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| anyhow!("Invalid date '{}' (use YYYY-MM-DD or RFC 3339)", input))?;
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| anyhow!("Invalid date '{}'", input))
}

fn parse_type(input: &str) -> anyhow::Result<TypeFilter> {
    Ok(match input.to_lowercase().as_str() {
        "f" | "file" => TypeFilter::RegularFile,
        "d" | "dir" | "directory" => TypeFilter::Directory,
        "l" | "link" | "symlink" => TypeFilter::SymbolicLink,
        "s" | "special" => TypeFilter::SpecialFile,
        "x" | "exec" | "executable" => TypeFilter::Executable,
        "suid" | "setuid" => TypeFilter::SetUid,
        other => bail!("Unknown type '{}' (use f, d, l, s, x or suid)", other),
    })
}
