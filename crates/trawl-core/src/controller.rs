//! Query execution.
//!
//! A [`QueryController`] owns one query: its compiled filters, the optional
//! content scanner, the entry source and a queue of entries waiting to be
//! checked. Running a query moves it through
//!
//! ```text
//! Idle -> Listing <-> Draining -> Completed | Cancelled | Failed
//! ```
//!
//! Entries are processed strictly one at a time on a driver thread, in the
//! order the source delivered them. Matches and the single terminal result
//! are reported through a [`QueryHandler`].

use crate::cancel::CancellationToken;
use crate::content::{ContentScanner, ScanOutcome};
use crate::error::{Result, SourceError, TrawlError};
use crate::filter::{FilterPipeline, Providers};
use crate::query::{ContentOptions, QueryConfig};
use crate::source::{self, EntrySource, SourceEvent};
use crate::types::{CandidateEntry, MatchResult};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::{Condvar, Mutex, ReentrantMutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result code of a query that ran to completion
pub const RESULT_SUCCESS: i32 = 0;

/// Result code of a query stopped by `kill()`
pub const RESULT_CANCELLED: i32 = -1;

/// How long the driver waits for source events before re-checking for a kill
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Terminal outcome of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    Success,
    Cancelled,
    /// The entry source failed; its provider code is passed through
    Failed(SourceError),
}

impl QueryResult {
    /// Numeric result code: 0, [`RESULT_CANCELLED`], or the provider's code
    pub fn code(&self) -> i32 {
        match self {
            QueryResult::Success => RESULT_SUCCESS,
            QueryResult::Cancelled => RESULT_CANCELLED,
            QueryResult::Failed(e) => e.code(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Success)
    }

    fn from_source(status: std::result::Result<(), SourceError>) -> Self {
        match status {
            Ok(()) => QueryResult::Success,
            Err(SourceError::Cancelled) => QueryResult::Cancelled,
            Err(e) => QueryResult::Failed(e),
        }
    }
}

/// Lifecycle state of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    /// Waiting for the source with nothing queued
    Listing,
    /// Working through queued entries
    Draining,
    Completed,
    Cancelled,
    Failed,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::Completed | QueryState::Cancelled | QueryState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryState::Idle => "idle",
            QueryState::Listing => "listing",
            QueryState::Draining => "draining",
            QueryState::Completed => "completed",
            QueryState::Cancelled => "cancelled",
            QueryState::Failed => "failed",
        }
    }
}

/// Receives the output of a running query.
///
/// Methods are called from the query's driver thread, or from the thread
/// calling `kill()` for the cancellation result.
pub trait QueryHandler: Send + Sync {
    /// An entry passed every filter
    fn on_match(&self, result: MatchResult);

    /// The query finished; called exactly once
    fn on_result(&self, result: QueryResult);

    /// The source reported something worth showing (e.g., index program stderr)
    fn on_notice(&self, _message: String) {}
}

/// Messages sent by [`ChannelQueryHandler`]
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    Match(MatchResult),
    Notice(String),
    Finished(QueryResult),
}

/// A query handler that forwards everything over a channel
pub struct ChannelQueryHandler {
    sender: Sender<QueryEvent>,
}

impl ChannelQueryHandler {
    pub fn new() -> (Self, Receiver<QueryEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (ChannelQueryHandler { sender }, receiver)
    }
}

impl Default for ChannelQueryHandler {
    fn default() -> Self {
        Self::new().0
    }
}

impl QueryHandler for ChannelQueryHandler {
    fn on_match(&self, result: MatchResult) {
        let _ = self.sender.send(QueryEvent::Match(result));
    }

    fn on_result(&self, result: QueryResult) {
        let _ = self.sender.send(QueryEvent::Finished(result));
    }

    fn on_notice(&self, message: String) {
        let _ = self.sender.send(QueryEvent::Notice(message));
    }
}

/// State shared between the controller, its driver thread and kill handles.
struct Shared {
    state: Mutex<QueryState>,
    pending: Mutex<VecDeque<CandidateEntry>>,
    /// Set while a drain is running; a second drain request is a no-op
    draining: AtomicBool,
    /// Held while a match is being emitted. `kill()` takes it so that no
    /// match is reported once it returns.
    emit: ReentrantMutex<()>,
    finished: AtomicBool,
    outcome: Mutex<Option<QueryResult>>,
    outcome_ready: Condvar,
    matches: AtomicUsize,
    token: CancellationToken,
    source: Mutex<Option<Box<dyn EntrySource>>>,
    handler: Arc<dyn QueryHandler>,
}

impl Shared {
    fn new(handler: Arc<dyn QueryHandler>) -> Self {
        Shared {
            state: Mutex::new(QueryState::Idle),
            pending: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            emit: ReentrantMutex::new(()),
            finished: AtomicBool::new(false),
            outcome: Mutex::new(None),
            outcome_ready: Condvar::new(),
            matches: AtomicUsize::new(0),
            token: CancellationToken::new(),
            source: Mutex::new(None),
            handler,
        }
    }

    fn set_state(&self, state: QueryState) {
        let mut current = self.state.lock();
        if !current.is_terminal() {
            *current = state;
        }
    }

    /// Report the terminal result. Only the first call has any effect.
    fn finish(&self, result: QueryResult) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        *self.state.lock() = match result {
            QueryResult::Success => QueryState::Completed,
            QueryResult::Cancelled => QueryState::Cancelled,
            QueryResult::Failed(_) => QueryState::Failed,
        };
        info!(
            code = result.code(),
            matches = self.matches.load(Ordering::SeqCst),
            "Query finished"
        );

        self.handler.on_result(result.clone());
        *self.outcome.lock() = Some(result);
        self.outcome_ready.notify_all();
    }

    fn kill(&self) {
        self.token.cancel();
        if let Some(source) = self.source.lock().as_mut() {
            debug!(source = source.name(), "Killing entry source");
            source.kill();
        }

        // Wait out a match being emitted on the driver thread
        let _fence = self.emit.lock();
        self.pending.lock().clear();
        self.finish(QueryResult::Cancelled);
    }

    /// Emit a match unless the query was killed or finished meanwhile.
    fn emit(&self, result: MatchResult) {
        let _guard = self.emit.lock();
        if self.token.is_cancelled() || self.finished.load(Ordering::SeqCst) {
            return;
        }
        self.matches.fetch_add(1, Ordering::SeqCst);
        self.handler.on_match(result);
    }
}

/// A cloneable handle that can stop a query from any thread.
#[derive(Clone)]
pub struct KillHandle {
    shared: Arc<Shared>,
}

impl KillHandle {
    pub fn kill(&self) {
        self.shared.kill();
    }
}

/// Runs one query from configuration to terminal result.
pub struct QueryController {
    config: QueryConfig,
    filters: FilterPipeline,
    scanner: Option<ContentScanner>,
    providers: Providers,
    source: Option<Box<dyn EntrySource>>,
    limit: usize,
    shared: Arc<Shared>,
    driver: Option<JoinHandle<()>>,
}

impl QueryController {
    /// Compile a query.
    ///
    /// Invalid name, metadata key or content patterns are reported here,
    /// before anything runs.
    pub fn new(config: QueryConfig, handler: Arc<dyn QueryHandler>) -> Result<Self> {
        let filters = FilterPipeline::compile(&config)?;
        let scanner = config
            .active_content()
            .map(|content| ContentScanner::compile(content, config.sniff_bytes))
            .transpose()?;

        Ok(QueryController {
            config,
            filters,
            scanner,
            providers: Providers::default(),
            source: None,
            limit: 0,
            shared: Arc::new(Shared::new(handler)),
            driver: None,
        })
    }

    /// Use other mime and metadata providers
    pub fn with_providers(mut self, providers: Providers) -> Self {
        self.providers = providers;
        self
    }

    /// Use a specific entry source instead of the one the configuration selects
    pub fn with_source(mut self, source: Box<dyn EntrySource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Stop successfully after `limit` matches (0 = unlimited)
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn state(&self) -> QueryState {
        *self.shared.state.lock()
    }

    /// Number of matches emitted so far
    pub fn matches(&self) -> usize {
        self.shared.matches.load(Ordering::SeqCst)
    }

    /// Replace the content search before the query starts.
    pub fn set_content(&mut self, content: Option<ContentOptions>) -> Result<()> {
        self.require_idle("set_content")?;
        let scanner = content
            .as_ref()
            .filter(|options| !options.pattern.is_empty())
            .map(|options| ContentScanner::compile(options, self.config.sniff_bytes))
            .transpose()?;
        self.config.content = content;
        self.scanner = scanner;
        Ok(())
    }

    /// Start the query. Returns as soon as the source is running.
    ///
    /// A source that cannot start is not an error here; it ends the query
    /// with a `Failed` result carrying the provider's code.
    pub fn start(&mut self) -> Result<()> {
        self.require_idle("start")?;

        self.shared.pending.lock().clear();
        self.shared.set_state(QueryState::Listing);

        let mut source = self
            .source
            .take()
            .unwrap_or_else(|| source::for_query(&self.config, &self.providers));
        info!(
            root = %self.config.root.display(),
            source = source.name(),
            content = self.scanner.is_some(),
            "Query started"
        );

        let (sink, events) = crossbeam_channel::unbounded();
        if let Err(e) = source.start(sink, self.shared.token.clone()) {
            warn!(source = source.name(), error = %e, "Entry source failed to start");
            self.shared.finish(QueryResult::from_source(Err(e)));
            return Ok(());
        }
        *self.shared.source.lock() = Some(source);

        let driver = Driver {
            shared: Arc::clone(&self.shared),
            filters: self.filters.clone(),
            scanner: self.scanner.clone(),
            providers: self.providers.clone(),
            events,
            source_status: None,
            limit: self.limit,
        };
        self.driver = Some(thread::spawn(move || driver.run()));
        Ok(())
    }

    /// Stop the query. Callable in any state and from any thread via
    /// [`kill_handle`](Self::kill_handle).
    ///
    /// Once this returns no further match is reported. A query that has not
    /// finished yet ends with [`QueryResult::Cancelled`].
    pub fn kill(&self) {
        self.shared.kill();
    }

    pub fn kill_handle(&self) -> KillHandle {
        KillHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Block until the query has finished and return its result.
    pub fn wait(&self) -> Result<QueryResult> {
        if self.state() == QueryState::Idle {
            return Err(TrawlError::InvalidState {
                operation: "wait",
                state: QueryState::Idle.as_str(),
            });
        }

        let mut outcome = self.shared.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return Ok(result.clone());
            }
            self.shared.outcome_ready.wait(&mut outcome);
        }
    }

    fn require_idle(&self, operation: &'static str) -> Result<()> {
        match self.state() {
            QueryState::Idle => Ok(()),
            state => Err(TrawlError::InvalidState {
                operation,
                state: state.as_str(),
            }),
        }
    }
}

impl Drop for QueryController {
    fn drop(&mut self) {
        if self.driver.is_some() && !self.shared.finished.load(Ordering::SeqCst) {
            self.shared.kill();
        }
        if let Some(driver) = self.driver.take() {
            let _ = driver.join();
        }
        // Dropping the source joins or reaps its background work
        self.shared.source.lock().take();
    }
}

/// The per-query loop running on its own thread.
struct Driver {
    shared: Arc<Shared>,
    filters: FilterPipeline,
    scanner: Option<ContentScanner>,
    providers: Providers,
    events: Receiver<SourceEvent>,
    /// Set once the source reported completion
    source_status: Option<std::result::Result<(), SourceError>>,
    limit: usize,
}

impl Driver {
    fn run(mut self) {
        loop {
            if self.shared.token.is_cancelled() || self.shared.finished.load(Ordering::SeqCst) {
                return;
            }

            if self.source_status.is_none() && self.shared.pending.lock().is_empty() {
                match self.events.recv_timeout(POLL_INTERVAL) {
                    Ok(event) => self.accept(event),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => self.source_gone(),
                }
            }
            self.pump();
            self.drain();

            if self.source_status.is_some() && self.shared.pending.lock().is_empty() {
                if let Some(status) = self.source_status.take() {
                    self.shared.finish(QueryResult::from_source(status));
                }
                return;
            }
        }
    }

    /// Take every source event that is already waiting.
    fn pump(&mut self) {
        while self.source_status.is_none() {
            match self.events.try_recv() {
                Ok(event) => self.accept(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.source_gone(),
            }
        }
    }

    fn accept(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Entries(batch) => {
                if batch.is_empty() || self.shared.token.is_cancelled() {
                    return;
                }
                debug!(count = batch.len(), "Queued entries");
                self.shared.pending.lock().extend(batch);
            }
            SourceEvent::Notice(message) => {
                info!(notice = %message, "Entry source notice");
                self.shared.handler.on_notice(message);
            }
            SourceEvent::Finished(status) => {
                if matches!(status, Err(SourceError::Cancelled)) {
                    self.shared.pending.lock().clear();
                }
                self.source_status = Some(status);
            }
        }
    }

    fn source_gone(&mut self) {
        warn!("Entry source stopped without reporting a result");
        self.source_status = Some(Ok(()));
    }

    /// Work through the queue one entry at a time.
    fn drain(&mut self) {
        if self.shared.draining.swap(true, Ordering::SeqCst) {
            return;
        }

        loop {
            let next = self.shared.pending.lock().pop_front();
            let Some(entry) = next else { break };
            self.shared.set_state(QueryState::Draining);

            self.process(entry);

            if self.shared.token.checkpoint().is_none() || self.limit_reached() {
                break;
            }
            self.pump();
        }

        self.shared.draining.store(false, Ordering::SeqCst);
        if self.source_status.is_none() {
            self.shared.set_state(QueryState::Listing);
        }
    }

    fn process(&self, entry: CandidateEntry) {
        if !self.filters.passes(&entry, &self.providers) {
            return;
        }

        let result = match &self.scanner {
            None => MatchResult::new(entry),
            Some(scanner) => match scanner.scan(&entry, &self.providers, &self.shared.token) {
                ScanOutcome::Matched(line) => MatchResult::with_line(entry, line),
                ScanOutcome::NoMatch | ScanOutcome::Cancelled => return,
            },
        };
        self.shared.emit(result);
    }

    fn limit_reached(&mut self) -> bool {
        if self.limit == 0 || self.shared.matches.load(Ordering::SeqCst) < self.limit {
            return false;
        }

        debug!(limit = self.limit, "Result limit reached");
        if let Some(source) = self.shared.source.lock().as_mut() {
            source.kill();
        }
        self.shared.pending.lock().clear();
        self.source_status = Some(Ok(()));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_zip;
    use crate::query::{ContentOptions, IndexOptions, TypeFilter};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Replays a fixed list of events from a background thread.
    struct ScriptedSource {
        events: Vec<SourceEvent>,
        /// Wait for this long before each event
        delay: Duration,
        start_error: Option<SourceError>,
        token: CancellationToken,
    }

    impl ScriptedSource {
        fn new(events: Vec<SourceEvent>) -> Self {
            ScriptedSource {
                events,
                delay: Duration::ZERO,
                start_error: None,
                token: CancellationToken::new(),
            }
        }

        fn entries(paths: &[PathBuf]) -> Self {
            Self::new(vec![
                SourceEvent::Entries(paths.iter().map(CandidateEntry::from_path).collect()),
                SourceEvent::Finished(Ok(())),
            ])
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    impl EntrySource for ScriptedSource {
        fn start(
            &mut self,
            sink: Sender<SourceEvent>,
            token: CancellationToken,
        ) -> std::result::Result<(), SourceError> {
            if let Some(e) = self.start_error.take() {
                return Err(e);
            }
            self.token = token.clone();
            let events = std::mem::take(&mut self.events);
            let delay = self.delay;
            thread::spawn(move || {
                for event in events {
                    thread::sleep(delay);
                    if token.is_cancelled() {
                        let _ = sink.send(SourceEvent::Finished(Err(SourceError::Cancelled)));
                        return;
                    }
                    let _ = sink.send(event);
                }
            });
            Ok(())
        }

        fn kill(&mut self) {
            self.token.cancel();
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn run(
        config: QueryConfig,
        source: ScriptedSource,
    ) -> (Vec<MatchResult>, Vec<String>, QueryResult) {
        let (handler, events) = ChannelQueryHandler::new();
        let mut controller = QueryController::new(config, Arc::new(handler))
            .unwrap()
            .with_source(Box::new(source));
        controller.start().unwrap();
        collect(&events)
    }

    fn collect(events: &Receiver<QueryEvent>) -> (Vec<MatchResult>, Vec<String>, QueryResult) {
        let mut matches = Vec::new();
        let mut notices = Vec::new();
        loop {
            match events.recv_timeout(TIMEOUT).unwrap() {
                QueryEvent::Match(m) => matches.push(m),
                QueryEvent::Notice(n) => notices.push(n),
                QueryEvent::Finished(result) => return (matches, notices, result),
            }
        }
    }

    fn names(matches: &[MatchResult]) -> Vec<&str> {
        matches.iter().map(|m| m.entry.name.as_str()).collect()
    }

    fn text_files(dir: &TempDir, files: &[(&str, &str)]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|(name, body)| {
                let path = dir.path().join(name);
                fs::write(&path, body).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_matches_in_arrival_order() {
        let paths: Vec<PathBuf> = ["/q/c.txt", "/q/a.md", "/q/b.txt", "/q/d.doc"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let config = QueryConfig::new("/q").with_names("*.txt;*.md", false);

        let (matches, _, result) = run(config, ScriptedSource::entries(&paths));
        assert_eq!(names(&matches), vec!["c.txt", "a.md", "b.txt"]);
        assert_eq!(result, QueryResult::Success);
        assert_eq!(result.code(), 0);
    }

    #[test]
    fn test_order_preserved_across_batches() {
        let batch = |names: &[&str]| {
            SourceEvent::Entries(
                names
                    .iter()
                    .map(|n| CandidateEntry::from_path(format!("/r/{}", n)))
                    .collect(),
            )
        };
        let source = ScriptedSource::new(vec![
            batch(&["1", "2"]),
            SourceEvent::Entries(Vec::new()),
            batch(&["3"]),
            SourceEvent::Entries(Vec::new()),
            batch(&["4", "5"]),
            SourceEvent::Finished(Ok(())),
        ]);

        let (matches, _, result) = run(QueryConfig::new("/r"), source);
        assert_eq!(names(&matches), vec!["1", "2", "3", "4", "5"]);
        assert_eq!(result, QueryResult::Success);
    }

    #[test]
    fn test_empty_source_completes() {
        let source = ScriptedSource::new(vec![SourceEvent::Finished(Ok(()))]);
        let (matches, _, result) = run(QueryConfig::new("/"), source);
        assert!(matches.is_empty());
        assert_eq!(result, QueryResult::Success);
    }

    #[test]
    fn test_content_match_carries_line() {
        let dir = TempDir::new().unwrap();
        let paths = text_files(
            &dir,
            &[
                ("a.txt", "alpha\nneedle one\ngamma\nneedle two\nepsilon\n"),
                ("b.txt", "nothing\n"),
            ],
        );
        let config = QueryConfig::new(dir.path()).with_content(ContentOptions::literal("needle"));

        let (matches, _, result) = run(config, ScriptedSource::entries(&paths));
        assert_eq!(result, QueryResult::Success);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entry.name, "a.txt");
        assert_eq!(matches[0].matching_line.as_deref(), Some("2: needle one"));
    }

    #[test]
    fn test_broken_document_dropped_and_query_completes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("only.odt");
        write_zip(&path, &[("styles.xml", "<x/>")]);
        let config = QueryConfig::new(dir.path()).with_content(ContentOptions::literal("anything"));

        let (matches, _, result) = run(config, ScriptedSource::entries(&[path]));
        assert!(matches.is_empty());
        assert_eq!(result.code(), 0);
    }

    #[test]
    fn test_source_error_code_passed_through() {
        let denied = SourceError::Io {
            path: PathBuf::from("/root"),
            code: 13,
            message: "Permission denied".to_string(),
        };
        let source = ScriptedSource::new(vec![
            SourceEvent::Entries(vec![CandidateEntry::from_path("/root/a")]),
            SourceEvent::Finished(Err(denied.clone())),
        ]);

        let (matches, _, result) = run(QueryConfig::new("/root"), source);
        // Entries that arrived before the failure are still reported
        assert_eq!(names(&matches), vec!["a"]);
        assert_eq!(result, QueryResult::Failed(denied));
        assert_eq!(result.code(), 13);
    }

    #[test]
    fn test_start_failure_ends_query() {
        let mut source = ScriptedSource::new(Vec::new());
        source.start_error = Some(SourceError::Io {
            path: PathBuf::from("/missing"),
            code: 2,
            message: "No such file or directory".to_string(),
        });

        let (handler, events) = ChannelQueryHandler::new();
        let mut controller = QueryController::new(QueryConfig::new("/missing"), Arc::new(handler))
            .unwrap()
            .with_source(Box::new(source));
        controller.start().unwrap();

        assert_eq!(controller.wait().unwrap().code(), 2);
        assert_eq!(controller.state(), QueryState::Failed);
        let (_, _, result) = collect(&events);
        assert_eq!(result.code(), 2);
    }

    #[test]
    fn test_notices_forwarded() {
        let source = ScriptedSource::new(vec![
            SourceEvent::Notice("database is stale".to_string()),
            SourceEvent::Finished(Ok(())),
        ]);
        let (_, notices, result) = run(QueryConfig::new("/"), source);
        assert_eq!(notices, vec!["database is stale".to_string()]);
        assert!(result.is_success());
    }

    #[test]
    fn test_kill_stops_matches() {
        let events: Vec<SourceEvent> = (0..200)
            .map(|i| SourceEvent::Entries(vec![CandidateEntry::from_path(format!("/k/{}", i))]))
            .chain(std::iter::once(SourceEvent::Finished(Ok(()))))
            .collect();
        let source = ScriptedSource::new(events).slow(Duration::from_millis(5));

        let (handler, rx) = ChannelQueryHandler::new();
        let mut controller = QueryController::new(QueryConfig::new("/k"), Arc::new(handler))
            .unwrap()
            .with_source(Box::new(source));
        controller.start().unwrap();

        // Let a few matches through, then kill
        match rx.recv_timeout(TIMEOUT).unwrap() {
            QueryEvent::Match(_) => {}
            other => panic!("expected a match, got {:?}", other),
        }
        controller.kill();
        let seen = controller.matches();

        let (matches, _, result) = collect(&rx);
        assert_eq!(result, QueryResult::Cancelled);
        assert_eq!(result.code(), RESULT_CANCELLED);
        // Everything already in the channel was emitted before kill returned
        assert_eq!(matches.len() + 1, seen);
        assert!(seen < 200);
        assert_eq!(controller.state(), QueryState::Cancelled);

        // Nothing after the terminal result
        thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_kill_before_start() {
        let (handler, rx) = ChannelQueryHandler::new();
        let mut controller =
            QueryController::new(QueryConfig::new("/"), Arc::new(handler)).unwrap();

        controller.kill();
        assert_eq!(controller.state(), QueryState::Cancelled);
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), QueryEvent::Finished(QueryResult::Cancelled));

        // A killed query cannot be started
        assert!(matches!(
            controller.start(),
            Err(TrawlError::InvalidState { operation: "start", .. })
        ));
        // Result is reported once only
        controller.kill();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_kill_after_completion_keeps_result() {
        let (handler, rx) = ChannelQueryHandler::new();
        let mut controller = QueryController::new(QueryConfig::new("/"), Arc::new(handler))
            .unwrap()
            .with_source(Box::new(ScriptedSource::new(vec![SourceEvent::Finished(Ok(()))])));
        controller.start().unwrap();
        assert_eq!(controller.wait().unwrap(), QueryResult::Success);

        controller.kill();
        assert_eq!(controller.state(), QueryState::Completed);
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), QueryEvent::Finished(QueryResult::Success));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_kill_handle_from_other_thread() {
        let source = ScriptedSource::new(vec![SourceEvent::Finished(Ok(()))])
            .slow(Duration::from_secs(5));
        let (handler, _rx) = ChannelQueryHandler::new();
        let mut controller = QueryController::new(QueryConfig::new("/"), Arc::new(handler))
            .unwrap()
            .with_source(Box::new(source));
        controller.start().unwrap();

        let handle = controller.kill_handle();
        thread::spawn(move || handle.kill()).join().unwrap();
        assert_eq!(controller.wait().unwrap(), QueryResult::Cancelled);
    }

    #[test]
    fn test_source_cancellation_is_cancelled_result() {
        let source = ScriptedSource::new(vec![
            SourceEvent::Entries(vec![CandidateEntry::from_path("/c/x")]),
            SourceEvent::Finished(Err(SourceError::Cancelled)),
        ]);
        let (_, _, result) = run(QueryConfig::new("/c"), source);
        assert_eq!(result, QueryResult::Cancelled);
    }

    #[test]
    fn test_limit_stops_early_with_success() {
        let paths: Vec<PathBuf> = (0..10).map(|i| PathBuf::from(format!("/l/{}", i))).collect();
        let (handler, rx) = ChannelQueryHandler::new();
        let mut controller = QueryController::new(QueryConfig::new("/l"), Arc::new(handler))
            .unwrap()
            .with_source(Box::new(ScriptedSource::entries(&paths)))
            .with_limit(3);
        controller.start().unwrap();

        let (matches, _, result) = collect(&rx);
        assert_eq!(names(&matches), vec!["0", "1", "2"]);
        assert_eq!(result, QueryResult::Success);
    }

    #[test]
    fn test_invalid_pattern_rejected_before_start() {
        let (handler, _rx) = ChannelQueryHandler::new();
        let config = QueryConfig::new("/").with_content(ContentOptions::regex("(unclosed"));
        let err = QueryController::new(config, Arc::new(handler)).err().unwrap();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_set_content_only_when_idle() {
        let (handler, _rx) = ChannelQueryHandler::new();
        let mut controller = QueryController::new(QueryConfig::new("/"), Arc::new(handler))
            .unwrap()
            .with_source(Box::new(ScriptedSource::new(vec![SourceEvent::Finished(Ok(()))])));

        controller.set_content(Some(ContentOptions::literal("x"))).unwrap();
        assert!(controller.set_content(Some(ContentOptions::regex("["))).is_err());
        // A failed recompile leaves the previous search in place
        assert_eq!(controller.config().content, Some(ContentOptions::literal("x")));

        controller.start().unwrap();
        controller.wait().unwrap();
        assert!(matches!(
            controller.set_content(None),
            Err(TrawlError::InvalidState { operation: "set_content", .. })
        ));
    }

    #[test]
    fn test_wait_before_start_is_error() {
        let (handler, _rx) = ChannelQueryHandler::new();
        let controller = QueryController::new(QueryConfig::new("/"), Arc::new(handler)).unwrap();
        assert!(controller.wait().is_err());
    }

    #[test]
    fn test_live_listing_end_to_end() {
        let dir = TempDir::new().unwrap();
        text_files(&dir, &[("keep.txt", "x"), ("skip.bin", "x")]);
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("deep.txt"), "x").unwrap();

        let config = QueryConfig::new(dir.path())
            .with_names("*.txt", false)
            .with_type(TypeFilter::RegularFile);
        let (handler, rx) = ChannelQueryHandler::new();
        let mut controller = QueryController::new(config, Arc::new(handler)).unwrap();
        controller.start().unwrap();

        let (matches, _, result) = collect(&rx);
        let mut found: Vec<_> = names(&matches);
        found.sort();
        assert_eq!(found, vec!["deep.txt", "keep.txt"]);
        assert_eq!(result, QueryResult::Success);
    }

    #[test]
    fn test_live_listing_missing_root() {
        let dir = TempDir::new().unwrap();
        let (handler, rx) = ChannelQueryHandler::new();
        let config = QueryConfig::new(dir.path().join("gone"));
        let mut controller = QueryController::new(config, Arc::new(handler)).unwrap();
        controller.start().unwrap();

        let (_, _, result) = collect(&rx);
        assert!(matches!(result, QueryResult::Failed(SourceError::Io { code: 2, .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_external_index_end_to_end() {
        let index = IndexOptions {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "printf '/a/b.txt\\n/a/c.txt\\n/a/d.log\\n'".to_string(),
                "index".to_string(),
            ],
        };
        let config = QueryConfig::new("/a")
            .with_names("*.txt", false)
            .with_external_index(index);
        let (handler, rx) = ChannelQueryHandler::new();
        let mut controller = QueryController::new(config, Arc::new(handler)).unwrap();
        controller.start().unwrap();

        let (matches, _, result) = collect(&rx);
        let paths: Vec<_> = matches.iter().map(|m| m.entry.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/a/b.txt"), PathBuf::from("/a/c.txt")]);
        assert_eq!(result, QueryResult::Success);
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_stops_external_index() {
        let index = IndexOptions {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "exec sleep 30".to_string(),
                "index".to_string(),
            ],
        };
        let config = QueryConfig::new("/a").with_external_index(index);
        let (handler, rx) = ChannelQueryHandler::new();
        let mut controller = QueryController::new(config, Arc::new(handler)).unwrap();
        controller.start().unwrap();

        let killed_at = std::time::Instant::now();
        controller.kill();
        assert_eq!(controller.wait().unwrap(), QueryResult::Cancelled);
        let (matches, _, result) = collect(&rx);
        assert!(matches.is_empty());
        assert_eq!(result.code(), RESULT_CANCELLED);

        drop(controller);
        assert!(killed_at.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_content_search_skips_fifo() {
        use nix::sys::stat::Mode;

        let dir = TempDir::new().unwrap();
        nix::unistd::mkfifo(&dir.path().join("pipe"), Mode::S_IRWXU).unwrap();
        text_files(&dir, &[("a.txt", "needle\n")]);

        let config = QueryConfig::new(dir.path()).with_content(ContentOptions::literal("needle"));
        let (handler, rx) = ChannelQueryHandler::new();
        let mut controller = QueryController::new(config, Arc::new(handler)).unwrap();
        controller.start().unwrap();

        let (matches, _, result) = collect(&rx);
        assert_eq!(names(&matches), vec!["a.txt"]);
        assert_eq!(result.code(), RESULT_SUCCESS);
    }
}
