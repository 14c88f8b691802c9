//! Entry sources.
//!
//! An [`EntrySource`] produces candidate entries for a query and reports
//! when it is done. Two implementations exist:
//!
//! - [`LiveListing`]: enumerates the search root on a background thread and
//!   delivers entries in batches as they are found.
//! - [`ExternalIndex`]: runs an index lookup program (`locate` by default)
//!   and delivers its output once the program exits.
//!
//! A query picks one source when it starts and keeps it for its lifetime.

mod listing;
mod locate;

pub use listing::LiveListing;
pub use locate::{parse_index_output, ExternalIndex};

use crate::cancel::CancellationToken;
use crate::error::SourceError;
use crate::filter::Providers;
use crate::query::QueryConfig;
use crate::types::CandidateEntry;
use crossbeam_channel::Sender;

/// Messages sent by an entry source to its query.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// A batch of entries, possibly empty
    Entries(Vec<CandidateEntry>),
    /// A message for the user that does not stop the source
    Notice(String),
    /// The source is done; no further events follow
    Finished(Result<(), SourceError>),
}

/// Producer of candidate entries.
///
/// `start` must not block on the enumeration itself; work happens on a
/// background thread that reports through `sink`. `kill` may be called
/// from any thread at any time, including before `start` or after the
/// source has finished.
pub trait EntrySource: Send {
    /// Begin producing entries.
    ///
    /// Fails only if the source cannot start at all, for example when the
    /// root cannot be read or the index program cannot be spawned.
    fn start(
        &mut self,
        sink: Sender<SourceEvent>,
        token: CancellationToken,
    ) -> Result<(), SourceError>;

    /// Stop producing entries immediately.
    fn kill(&mut self);

    /// Short name for logs (e.g., "listing", "locate")
    fn name(&self) -> &'static str;
}

/// Build the source a query is configured for.
pub fn for_query(config: &QueryConfig, providers: &Providers) -> Box<dyn EntrySource> {
    if config.use_external_index {
        Box::new(ExternalIndex::new(&config.root, config.index.clone()))
    } else {
        Box::new(LiveListing::new(config, providers.mime.clone()))
    }
}
