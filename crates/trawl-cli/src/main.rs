//! # Trawl CLI
//!
//! Command-line interface for the Trawl file search tool.
//!
//! ## Commands
//!
//! - `trawl find [root]` - Search below a directory by name, attributes and content
//! - `trawl config` - Show the effective configuration or write a default file
//!
//! ## Example Usage
//!
//! ```bash
//! # Markdown and text files modified in the last three days
//! trawl find ~/notes -n "*.md;*.txt" --within 3d
//!
//! # Rust sources mentioning a function, with the matching line
//! trawl find ~/src -n "*.rs" -c "fn main"
//!
//! # Ask the locate database instead of listing the disk
//! trawl find /usr/share --locate -n "*.desktop"
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Trawl - Streaming file search
#[derive(Parser)]
#[command(name = "trawl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress everything except results and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for files below a directory
    #[command(alias = "f")]
    Find(commands::find::FindArgs),

    /// Show the effective configuration
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => trawl_core::Config::load_from(path)?,
        None => trawl_core::Config::load()?,
    };

    // Setup logging; results go to stdout, logs to stderr
    let log_level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.general.log_level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)))
        .init();

    // Execute command
    match cli.command {
        Commands::Find(args) => commands::find::run(config, args, cli.quiet),
        Commands::Config { init, force } => {
            commands::config::run(&config, cli.config.as_deref(), init, force)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
