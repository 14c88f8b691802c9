//! # Trawl Core Library
//!
//! This crate provides the streaming search engine behind the Trawl file
//! finder. A query enumerates candidate entries below a root directory (or
//! asks an external `locate` index for them), narrows them through a chain
//! of attribute filters, optionally searches their content line by line, and
//! reports each match as soon as it is known.
//!
//! ## Architecture
//!
//! - **Query** (`query`): Search description and its builders
//! - **Patterns** (`pattern`): Compiled name, metadata key and content patterns
//! - **Sources** (`source`): Live directory listing and external index lookup
//! - **Filters** (`filter`): Ordered attribute checks applied to each entry
//! - **Content** (`content`): First-matching-line search, including office documents
//! - **Controller** (`controller`): Runs a query, handles kill and the final result
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trawl_core::{ChannelQueryHandler, QueryConfig, QueryController, QueryEvent};
//!
//! let query = QueryConfig::new("/home/ada/notes").with_names("*.txt;*.md", false);
//! let (handler, events) = ChannelQueryHandler::new();
//! let mut controller = QueryController::new(query, Arc::new(handler))?;
//! controller.start()?;
//!
//! for event in events {
//!     match event {
//!         QueryEvent::Match(found) => println!("{}", found.entry.path.display()),
//!         QueryEvent::Notice(_) => {}
//!         QueryEvent::Finished(result) => break,
//!     }
//! }
//! ```

pub mod archive;
pub mod cancel;
pub mod config;
pub mod content;
pub mod controller;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod mime;
pub mod pattern;
pub mod query;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use config::Config;
pub use content::{ContentScanner, ScanOutcome};
pub use controller::{
    ChannelQueryHandler, KillHandle, QueryController, QueryEvent, QueryHandler, QueryResult,
    QueryState, RESULT_CANCELLED, RESULT_SUCCESS,
};
pub use error::{Result, SourceError, TrawlError};
pub use filter::{FilterPipeline, Providers, Rejection};
pub use metadata::{DocumentMetadata, MetadataProvider};
pub use mime::{ExtensionClassifier, MimeClassifier};
pub use pattern::{ContentPattern, KeyPattern, NamePatterns};
pub use query::{
    ContentOptions, ContentSyntax, IndexOptions, MetadataFilter, QueryConfig, RecentSpan,
    SizeFilter, TimeWindow, TypeFilter,
};
pub use source::{EntrySource, ExternalIndex, LiveListing, SourceEvent};
pub use types::{CandidateEntry, EntryKind, MatchResult};
