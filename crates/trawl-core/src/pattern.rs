//! Name and content pattern compilation.
//!
//! Name patterns are `;`-separated globs matched against the whole file
//! name. Content patterns are matched anywhere within a line and come in
//! three syntaxes: literal substring, wildcard, and regular expression.
//!
//! All patterns are compiled up front so that malformed input is reported
//! before a query starts rather than while scanning.

use crate::error::{Result, TrawlError};
use crate::query::{ContentOptions, ContentSyntax};
use crate::types::CandidateEntry;
use aho_corasick::AhoCorasick;
use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};

/// Compiled set of file-name globs.
///
/// An entry matches if any member matches its name. An empty set matches
/// everything.
#[derive(Debug, Clone)]
pub struct NamePatterns {
    patterns: Vec<Pattern>,
    options: MatchOptions,
}

impl NamePatterns {
    /// Compile a `;`-separated pattern list. Empty members are dropped.
    pub fn compile(raw: &str, case_sensitive: bool) -> Result<Self> {
        let patterns = raw
            .split(';')
            .filter(|member| !member.is_empty())
            .map(|member| {
                Pattern::new(member).map_err(|e| TrawlError::invalid_pattern(member, e))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NamePatterns {
            patterns,
            options: glob_options(case_sensitive),
        })
    }

    /// A set that matches every name
    pub fn any() -> Self {
        NamePatterns {
            patterns: Vec::new(),
            options: glob_options(false),
        }
    }

    /// Check a file name against the set
    pub fn matches_name(&self, name: &str) -> bool {
        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|p| p.matches_with(name, self.options))
    }

    /// Check an entry's file name against the set
    pub fn matches(&self, entry: &CandidateEntry) -> bool {
        self.matches_name(&entry.name)
    }

    /// Number of compiled members
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when the set restricts nothing
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn glob_options(case_sensitive: bool) -> MatchOptions {
    MatchOptions {
        case_sensitive,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    }
}

/// Compiled metadata key pattern (whole-key wildcard, case-sensitive).
#[derive(Debug, Clone)]
pub struct KeyPattern(Pattern);

impl KeyPattern {
    /// Compile a key wildcard
    pub fn compile(raw: &str) -> Result<Self> {
        Pattern::new(raw)
            .map(KeyPattern)
            .map_err(|e| TrawlError::invalid_pattern(raw, e))
    }

    /// Check a metadata key
    pub fn matches(&self, key: &str) -> bool {
        self.0.matches_with(key, glob_options(true))
    }
}

/// Compiled content pattern, tested against one line at a time.
#[derive(Debug, Clone)]
pub enum ContentPattern {
    /// Substring search
    Literal(AhoCorasick),
    /// Glob matched anywhere in the line, same dialect as name patterns
    Wildcard(Pattern, MatchOptions),
    /// Regular expression search
    Regex(Regex),
}

impl ContentPattern {
    /// Compile content options into a matcher
    pub fn compile(options: &ContentOptions) -> Result<Self> {
        let raw = options.pattern.as_str();
        let case_sensitive = options.case_sensitive;

        match options.syntax {
            ContentSyntax::Literal if case_sensitive || raw.is_ascii() => {
                let matcher = AhoCorasick::builder()
                    .ascii_case_insensitive(!case_sensitive)
                    .build([raw])
                    .map_err(|e| TrawlError::invalid_pattern(raw, e))?;
                Ok(ContentPattern::Literal(matcher))
            }
            // Non-ASCII case folding needs the regex engine
            ContentSyntax::Literal => build_regex(raw, &regex::escape(raw), case_sensitive),
            ContentSyntax::Wildcard => {
                let mut unanchored = String::with_capacity(raw.len() + 2);
                if !raw.starts_with('*') {
                    unanchored.push('*');
                }
                unanchored.push_str(raw);
                if !unanchored.ends_with('*') {
                    unanchored.push('*');
                }
                let pattern = Pattern::new(&unanchored)
                    .map_err(|e| TrawlError::invalid_pattern(raw, e))?;
                Ok(ContentPattern::Wildcard(pattern, glob_options(case_sensitive)))
            }
            ContentSyntax::Regex => build_regex(raw, raw, case_sensitive),
        }
    }

    /// Check whether a line contains a match
    pub fn matches(&self, line: &str) -> bool {
        match self {
            ContentPattern::Literal(matcher) => matcher.is_match(line),
            ContentPattern::Wildcard(pattern, options) => pattern.matches_with(line, *options),
            ContentPattern::Regex(regex) => regex.is_match(line),
        }
    }
}

fn build_regex(raw: &str, source: &str, case_sensitive: bool) -> Result<ContentPattern> {
    RegexBuilder::new(source)
        .case_insensitive(!case_sensitive)
        .build()
        .map(ContentPattern::Regex)
        .map_err(|e| TrawlError::invalid_pattern(raw, e))
}
