//! Query configuration.
//!
//! A [`QueryConfig`] describes one search: where to look, which entry
//! source to use, and every predicate an entry must satisfy. It is plain
//! data; patterns are compiled from it by [`crate::pattern`] when a
//! controller is created.

use crate::config::Config;
use chrono::{DateTime, Duration, Months, Utc};
use std::path::PathBuf;

/// Size restriction on candidate entries. All bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeFilter {
    #[default]
    None,
    AtLeast(u64),
    AtMost(u64),
    Equal(u64),
    Between(u64, u64),
}

impl SizeFilter {
    /// Check a size against this filter
    pub fn accepts(&self, size: u64) -> bool {
        match *self {
            SizeFilter::None => true,
            SizeFilter::AtLeast(min) => size >= min,
            SizeFilter::AtMost(max) => size <= max,
            SizeFilter::Equal(exact) => size == exact,
            SizeFilter::Between(min, max) => size >= min && size <= max,
        }
    }

    /// Build a filter from optional lower and upper bounds
    pub fn from_bounds(min: Option<u64>, max: Option<u64>) -> Self {
        match (min, max) {
            (None, None) => SizeFilter::None,
            (Some(min), None) => SizeFilter::AtLeast(min),
            (None, Some(max)) => SizeFilter::AtMost(max),
            (Some(min), Some(max)) => SizeFilter::Between(min, max),
        }
    }
}

/// Modification-time window. An unset bound is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Window with both bounds
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        TimeWindow {
            from: Some(from),
            to: Some(to),
        }
    }

    /// Everything modified at or after `from`
    pub fn since(from: DateTime<Utc>) -> Self {
        TimeWindow {
            from: Some(from),
            to: None,
        }
    }

    /// Everything modified at or before `to`
    pub fn until(to: DateTime<Utc>) -> Self {
        TimeWindow {
            from: None,
            to: Some(to),
        }
    }

    /// Everything modified during the last `span`, measured from `now`
    pub fn within(span: RecentSpan, now: DateTime<Utc>) -> Self {
        TimeWindow {
            from: Some(span.start_from(now)),
            to: Some(now),
        }
    }

    /// Check a modification time against this window
    pub fn accepts(&self, time: DateTime<Utc>) -> bool {
        if self.from.is_some_and(|from| time < from) {
            return false;
        }
        if self.to.is_some_and(|to| time > to) {
            return false;
        }
        true
    }

    /// True when neither bound is set
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// A relative span such as "the last 3 days".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecentSpan {
    Minutes(u32),
    Hours(u32),
    Days(u32),
    Months(u32),
    Years(u32),
}

impl RecentSpan {
    /// The start of the span that ends at `now`
    pub fn start_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            RecentSpan::Minutes(n) => saturating_sub(now, Duration::minutes(i64::from(n))),
            RecentSpan::Hours(n) => saturating_sub(now, Duration::hours(i64::from(n))),
            RecentSpan::Days(n) => saturating_sub(now, Duration::days(i64::from(n))),
            RecentSpan::Months(n) => now
                .checked_sub_months(Months::new(n))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            RecentSpan::Years(n) => now
                .checked_sub_months(Months::new(n.saturating_mul(12)))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Parse spans like `30m`, `12h`, `3d`, `2mo`, `1y`
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let split = input.find(|c: char| !c.is_ascii_digit())?;
        let (digits, unit) = input.split_at(split);
        let n: u32 = digits.parse().ok()?;
        match unit {
            "m" | "min" => Some(RecentSpan::Minutes(n)),
            "h" => Some(RecentSpan::Hours(n)),
            "d" => Some(RecentSpan::Days(n)),
            "mo" => Some(RecentSpan::Months(n)),
            "y" => Some(RecentSpan::Years(n)),
            _ => None,
        }
    }
}

fn saturating_sub(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(span)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Restriction on the kind of entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeFilter {
    #[default]
    Any,
    RegularFile,
    Directory,
    SymbolicLink,
    /// Character device, block device, fifo or socket
    SpecialFile,
    /// All execute bits set, and not a directory
    Executable,
    SetUid,
    /// Restrict to the configured mime-type allow-list
    MimeTypeList,
}

/// How a content pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentSyntax {
    /// Plain substring search
    #[default]
    Literal,
    /// Wildcards (`*`, `?`, `[...]`) matched anywhere in a line
    Wildcard,
    /// Regular expression matched anywhere in a line
    Regex,
}

/// Content search options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentOptions {
    pub pattern: String,
    pub syntax: ContentSyntax,
    pub case_sensitive: bool,
    /// Also inspect files that look binary or are on the ignore list
    pub search_binary: bool,
}

impl ContentOptions {
    /// Substring search for `pattern`
    pub fn literal(pattern: impl Into<String>) -> Self {
        ContentOptions {
            pattern: pattern.into(),
            ..Default::default()
        }
    }

    /// Regular expression search for `pattern`
    pub fn regex(pattern: impl Into<String>) -> Self {
        ContentOptions {
            pattern: pattern.into(),
            syntax: ContentSyntax::Regex,
            ..Default::default()
        }
    }

    /// Set case sensitivity
    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    /// Set whether binary files are searched
    pub fn search_binary(mut self, yes: bool) -> Self {
        self.search_binary = yes;
        self
    }
}

/// Metadata restriction: some key matching `key_pattern` must have a value
/// containing `value`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataFilter {
    pub key_pattern: String,
    pub value: String,
}

impl MetadataFilter {
    /// True when both strings are set
    pub fn is_active(&self) -> bool {
        !self.key_pattern.is_empty() && !self.value.is_empty()
    }
}

/// External index program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    pub program: String,
    /// Arguments placed before the search root
    pub args: Vec<String>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            program: "locate".to_string(),
            args: Vec::new(),
        }
    }
}

/// A complete search description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    pub root: PathBuf,
    pub recursive: bool,
    pub follow_links: bool,
    /// `;`-separated name globs; empty matches everything
    pub names: String,
    pub names_case_sensitive: bool,
    pub size: SizeFilter,
    pub time: TimeWindow,
    /// Required owner name; empty means unchecked
    pub owner: String,
    /// Required group name; empty means unchecked
    pub group: String,
    pub file_type: TypeFilter,
    pub mime_types: Vec<String>,
    /// Content search; `None` or an empty pattern disables it
    pub content: Option<ContentOptions>,
    pub metadata: MetadataFilter,
    /// Use the external index program instead of listing the root
    pub use_external_index: bool,
    pub index: IndexOptions,
    /// Entries per listing batch
    pub batch_size: usize,
    /// Bytes read by the binary-content heuristic
    pub sniff_bytes: usize,
}

impl QueryConfig {
    /// Create a query rooted at `root` with no restrictions
    pub fn new(root: impl Into<PathBuf>) -> Self {
        QueryConfig {
            root: root.into(),
            recursive: true,
            follow_links: false,
            names: String::new(),
            names_case_sensitive: false,
            size: SizeFilter::None,
            time: TimeWindow::default(),
            owner: String::new(),
            group: String::new(),
            file_type: TypeFilter::Any,
            mime_types: Vec::new(),
            content: None,
            metadata: MetadataFilter::default(),
            use_external_index: false,
            index: IndexOptions::default(),
            batch_size: 256,
            sniff_bytes: 1024,
        }
    }

    /// Create a query seeded from the configuration file defaults
    pub fn from_defaults(config: &Config, root: impl Into<PathBuf>) -> Self {
        let mut query = QueryConfig::new(root);
        query.recursive = config.search.recursive;
        query.follow_links = config.search.follow_links;
        query.names_case_sensitive = config.search.case_sensitive;
        query.batch_size = config.search.batch_size.max(1);
        query.sniff_bytes = config.content.sniff_bytes;
        query.index = IndexOptions {
            program: config.locate.program.clone(),
            args: config.locate.args.clone(),
        };
        query
    }

    /// Set the name patterns
    pub fn with_names(mut self, names: impl Into<String>, case_sensitive: bool) -> Self {
        self.names = names.into();
        self.names_case_sensitive = case_sensitive;
        self
    }

    /// Set recursion
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set the size filter
    pub fn with_size(mut self, size: SizeFilter) -> Self {
        self.size = size;
        self
    }

    /// Set the modification-time window
    pub fn with_time_window(mut self, time: TimeWindow) -> Self {
        self.time = time;
        self
    }

    /// Require an owner
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Require a group
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set the type filter
    pub fn with_type(mut self, file_type: TypeFilter) -> Self {
        self.file_type = file_type;
        self
    }

    /// Set the mime-type allow-list
    pub fn with_mime_types<I, S>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mime_types = mime_types.into_iter().map(Into::into).collect();
        self
    }

    /// Enable content search
    pub fn with_content(mut self, content: ContentOptions) -> Self {
        self.content = Some(content);
        self
    }

    /// Set the metadata filter
    pub fn with_metadata(
        mut self,
        key_pattern: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata = MetadataFilter {
            key_pattern: key_pattern.into(),
            value: value.into(),
        };
        self
    }

    /// Use the external index program
    pub fn with_external_index(mut self, index: IndexOptions) -> Self {
        self.use_external_index = true;
        self.index = index;
        self
    }

    /// The content options, if content search is active
    pub fn active_content(&self) -> Option<&ContentOptions> {
        self.content.as_ref().filter(|c| !c.pattern.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_size_between_inclusive() {
        let filter = SizeFilter::Between(100, 200);
        assert!(filter.accepts(100));
        assert!(filter.accepts(150));
        assert!(filter.accepts(200));
        assert!(!filter.accepts(99));
        assert!(!filter.accepts(201));
    }

    #[test]
    fn test_size_modes() {
        assert!(SizeFilter::None.accepts(u64::MAX));
        assert!(SizeFilter::AtLeast(10).accepts(10));
        assert!(!SizeFilter::AtLeast(10).accepts(9));
        assert!(SizeFilter::AtMost(10).accepts(10));
        assert!(!SizeFilter::AtMost(10).accepts(11));
        assert!(SizeFilter::Equal(7).accepts(7));
        assert!(!SizeFilter::Equal(7).accepts(8));
    }

    #[test]
    fn test_size_from_bounds() {
        assert_eq!(SizeFilter::from_bounds(None, None), SizeFilter::None);
        assert_eq!(SizeFilter::from_bounds(Some(1), None), SizeFilter::AtLeast(1));
        assert_eq!(SizeFilter::from_bounds(None, Some(2)), SizeFilter::AtMost(2));
        assert_eq!(
            SizeFilter::from_bounds(Some(1), Some(2)),
            SizeFilter::Between(1, 2)
        );
    }

    #[test]
    fn test_time_window_bounds() {
        let t = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();

        let since = TimeWindow::since(t(10));
        assert!(since.accepts(t(10)));
        assert!(since.accepts(t(20)));
        assert!(!since.accepts(t(9)));

        let until = TimeWindow::until(t(10));
        assert!(until.accepts(t(10)));
        assert!(!until.accepts(t(11)));

        let open = TimeWindow::default();
        assert!(open.is_unbounded());
        assert!(open.accepts(t(1)));
    }

    #[test]
    fn test_recent_span() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(RecentSpan::parse("3d"), Some(RecentSpan::Days(3)));
        assert_eq!(RecentSpan::parse("2mo"), Some(RecentSpan::Months(2)));
        assert_eq!(RecentSpan::parse("d"), None);
        assert_eq!(RecentSpan::parse("5w"), None);

        let window = TimeWindow::within(RecentSpan::Hours(2), now);
        assert_eq!(window.from, Some(now - Duration::hours(2)));
        assert_eq!(window.to, Some(now));

        let year = RecentSpan::Years(1).start_from(now);
        assert_eq!(year, Utc.with_ymd_and_hms(2023, 3, 31, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_huge_span_saturates() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let span = RecentSpan::parse("4000000000d").unwrap();
        let window = TimeWindow::within(span, now);
        assert_eq!(window.from, Some(DateTime::<Utc>::MIN_UTC));
        assert!(window.accepts(Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()));

        assert_eq!(
            RecentSpan::Years(u32::MAX).start_from(now),
            DateTime::<Utc>::MIN_UTC
        );
        assert_eq!(
            RecentSpan::Minutes(u32::MAX).start_from(now),
            now - Duration::minutes(i64::from(u32::MAX))
        );
    }

    #[test]
    fn test_active_content() {
        let query = QueryConfig::new("/").with_content(ContentOptions::literal(""));
        assert!(query.active_content().is_none());

        let query = QueryConfig::new("/").with_content(ContentOptions::literal("todo"));
        assert_eq!(query.active_content().map(|c| c.pattern.as_str()), Some("todo"));
    }

    #[test]
    fn test_metadata_filter_activity() {
        assert!(!MetadataFilter::default().is_active());
        let query = QueryConfig::new("/").with_metadata("title", "");
        assert!(!query.metadata.is_active());
        let query = QueryConfig::new("/").with_metadata("*", "Report");
        assert!(query.metadata.is_active());
    }
}
