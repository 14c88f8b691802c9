//! Line-oriented content search.
//!
//! The scanner reads a file one line at a time and stops at the first line
//! that matches the content pattern. Zip-packaged office documents are
//! searched through their XML payload with markup removed.
//!
//! Scanning fails closed: any problem reading an entry means "no match",
//! never an error for the whole query.

use crate::archive;
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::filter::{Providers, DEVICE_PREFIX};
use crate::mime::{is_ignored, is_text, looks_binary, office_family};
use crate::pattern::ContentPattern;
use crate::query::ContentOptions;
use crate::types::{CandidateEntry, EntryKind};
use regex::Regex;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Cursor, Read};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Result of scanning one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// First matching line, formatted as `"<line number>: <text>"`
    Matched(String),
    NoMatch,
    /// The query was cancelled mid-scan
    Cancelled,
}

/// Compiled content search of one query.
#[derive(Debug, Clone)]
pub struct ContentScanner {
    pattern: ContentPattern,
    search_binary: bool,
    sniff_bytes: usize,
}

impl ContentScanner {
    /// Compile the content options of a query.
    pub fn compile(options: &ContentOptions, sniff_bytes: usize) -> Result<Self> {
        Ok(ContentScanner {
            pattern: ContentPattern::compile(options)?,
            search_binary: options.search_binary,
            sniff_bytes,
        })
    }

    /// Search the content of `entry` for the first matching line.
    pub fn scan(
        &self,
        entry: &CandidateEntry,
        providers: &Providers,
        token: &CancellationToken,
    ) -> ScanOutcome {
        if token.check().is_none() {
            return ScanOutcome::Cancelled;
        }

        let path = entry.path.as_path();
        if !is_regular_file(entry) {
            debug!(path = %path.display(), kind = ?entry.kind, "Ignoring, not a regular file");
            return ScanOutcome::NoMatch;
        }

        let mime = providers.mime_of(entry);

        if !self.search_binary && is_ignored(&mime) {
            debug!(
                path = %path.display(),
                mime = %mime,
                "Ignoring, mime type is in exclusion list"
            );
            return ScanOutcome::NoMatch;
        }

        if let Some(family) = office_family(&mime) {
            return match archive::read_member(path, family.payload()) {
                Ok(payload) => self.scan_lines(Cursor::new(payload), true, token),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read document payload");
                    ScanOutcome::NoMatch
                }
            };
        }

        if path.starts_with(DEVICE_PREFIX) {
            return ScanOutcome::NoMatch;
        }

        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot open file");
                return ScanOutcome::NoMatch;
            }
        };

        if self.search_binary || is_text(&mime) {
            return self.scan_lines(BufReader::new(file), false, token);
        }

        let mut prefix = Vec::with_capacity(self.sniff_bytes);
        if let Err(e) = file
            .by_ref()
            .take(self.sniff_bytes as u64)
            .read_to_end(&mut prefix)
        {
            warn!(path = %path.display(), error = %e, "Cannot read file");
            return ScanOutcome::NoMatch;
        }
        if looks_binary(&prefix) {
            debug!(path = %path.display(), "Ignoring, not a text file");
            return ScanOutcome::NoMatch;
        }

        self.scan_lines(BufReader::new(Cursor::new(prefix).chain(file)), false, token)
    }

    /// Test lines in order, stopping at the first match.
    fn scan_lines<R: BufRead>(
        &self,
        mut reader: R,
        strip_tags: bool,
        token: &CancellationToken,
    ) -> ScanOutcome {
        let mut buf = Vec::new();
        let mut line_number = 0usize;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => return ScanOutcome::NoMatch,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, line = line_number + 1, "Read failed mid-scan");
                    return ScanOutcome::NoMatch;
                }
            }
            line_number += 1;

            let decoded = String::from_utf8_lossy(&buf);
            let mut line = decoded.trim_end_matches(&['\n', '\r'][..]).to_string();
            if strip_tags {
                line = strip_xml_tags(&line);
            }

            if self.pattern.matches(&line) {
                return ScanOutcome::Matched(format!("{}: {}", line_number, line));
            }

            if token.checkpoint().is_none() {
                return ScanOutcome::Cancelled;
            }
        }
    }
}

/// Whether `entry` is a regular file, following symlinks.
///
/// Opening a fifo with no writer blocks, so only regular files are read.
fn is_regular_file(entry: &CandidateEntry) -> bool {
    match entry.kind {
        Some(EntryKind::Regular) => true,
        Some(EntryKind::Symlink) | None => fs::metadata(&entry.path)
            .map(|m| m.is_file())
            .unwrap_or(false),
        Some(_) => false,
    }
}

/// Remove every `<...>` span from a line.
pub fn strip_xml_tags(line: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<.*?>").expect("tag pattern is valid"))
        .replace_all(line, "")
        .into_owned()
}
