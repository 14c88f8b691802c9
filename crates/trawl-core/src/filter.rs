//! Non-content predicates applied to candidate entries.
//!
//! The pipeline rejects `.` and `..`, then evaluates in order: name, size,
//! time, owner, group, type and metadata, stopping at the first stage that
//! rejects. Stages that need an attribute the entry does not carry (entries
//! from the external index only know their path) let the entry through.

use crate::error::Result;
use crate::metadata::{DocumentMetadata, MetadataProvider};
use crate::mime::{ExtensionClassifier, MimeClassifier};
use crate::pattern::{KeyPattern, NamePatterns};
use crate::query::{QueryConfig, SizeFilter, TimeWindow, TypeFilter};
use crate::types::{CandidateEntry, EntryKind, ANY_EXECUTE, SET_UID};
use std::sync::Arc;
use tracing::warn;

/// Paths under this prefix are device files
pub const DEVICE_PREFIX: &str = "/dev/";

/// External collaborators used while evaluating entries.
#[derive(Clone)]
pub struct Providers {
    pub mime: Arc<dyn MimeClassifier>,
    pub metadata: Arc<dyn MetadataProvider>,
}

impl Default for Providers {
    fn default() -> Self {
        Providers {
            mime: Arc::new(ExtensionClassifier),
            metadata: Arc::new(DocumentMetadata),
        }
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}

impl Providers {
    /// Mime type of an entry, classifying it if the source did not
    pub fn mime_of(&self, entry: &CandidateEntry) -> String {
        entry
            .mime_type
            .clone()
            .unwrap_or_else(|| self.mime.classify(&entry.path, entry.kind))
    }
}

/// The stage that rejected an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    DotEntry,
    Name,
    Size,
    Time,
    Owner,
    Group,
    Type,
    Metadata,
}

#[derive(Debug, Clone)]
struct MetadataStage {
    key: KeyPattern,
    value: String,
}

/// Compiled non-content filters of one query.
#[derive(Debug, Clone)]
pub struct FilterPipeline {
    names: NamePatterns,
    size: SizeFilter,
    time: TimeWindow,
    owner: String,
    group: String,
    file_type: TypeFilter,
    mime_types: Vec<String>,
    metadata: Option<MetadataStage>,
}

impl FilterPipeline {
    /// Compile the filters of a query. Malformed patterns fail here.
    pub fn compile(config: &QueryConfig) -> Result<Self> {
        let names = NamePatterns::compile(&config.names, config.names_case_sensitive)?;

        let metadata = if config.metadata.is_active() {
            Some(MetadataStage {
                key: KeyPattern::compile(&config.metadata.key_pattern)?,
                value: config.metadata.value.clone(),
            })
        } else {
            None
        };

        Ok(FilterPipeline {
            names,
            size: config.size,
            time: config.time,
            owner: config.owner.clone(),
            group: config.group.clone(),
            file_type: config.file_type,
            mime_types: config.mime_types.clone(),
            metadata,
        })
    }

    /// True if the entry passes every stage
    pub fn passes(&self, entry: &CandidateEntry, providers: &Providers) -> bool {
        self.evaluate(entry, providers).is_ok()
    }

    /// Run every stage, reporting the first one that rejects
    pub fn evaluate(
        &self,
        entry: &CandidateEntry,
        providers: &Providers,
    ) -> std::result::Result<(), Rejection> {
        if entry.is_dot_entry() {
            return Err(Rejection::DotEntry);
        }
        if !self.names.matches(entry) {
            return Err(Rejection::Name);
        }
        if !entry.size.map_or(true, |size| self.size.accepts(size)) {
            return Err(Rejection::Size);
        }
        if !entry.modified.map_or(true, |time| self.time.accepts(time)) {
            return Err(Rejection::Time);
        }
        if !name_matches(&self.owner, entry.owner.as_deref()) {
            return Err(Rejection::Owner);
        }
        if !name_matches(&self.group, entry.group.as_deref()) {
            return Err(Rejection::Group);
        }
        if !self.type_matches(entry) {
            return Err(Rejection::Type);
        }
        if !self.metadata_matches(entry, providers) {
            return Err(Rejection::Metadata);
        }
        Ok(())
    }

    fn type_matches(&self, entry: &CandidateEntry) -> bool {
        let Some(kind) = entry.kind else {
            // Nothing is known about the entry beyond its path
            return self.file_type != TypeFilter::MimeTypeList || self.mime_matches(entry);
        };

        match self.file_type {
            TypeFilter::Any => true,
            TypeFilter::RegularFile => kind == EntryKind::Regular,
            TypeFilter::Directory => entry.is_dir(),
            TypeFilter::SymbolicLink => entry.is_link(),
            TypeFilter::SpecialFile => kind.is_special(),
            TypeFilter::Executable => {
                !entry.is_dir()
                    && entry
                        .permissions()
                        .map_or(true, |perms| perms & ANY_EXECUTE == ANY_EXECUTE)
            }
            TypeFilter::SetUid => entry
                .permissions()
                .map_or(true, |perms| perms & SET_UID == SET_UID),
            TypeFilter::MimeTypeList => self.mime_matches(entry),
        }
    }

    fn mime_matches(&self, entry: &CandidateEntry) -> bool {
        if self.mime_types.is_empty() {
            return true;
        }
        entry
            .mime_type
            .as_ref()
            .map_or(true, |mime| self.mime_types.contains(mime))
    }

    fn metadata_matches(&self, entry: &CandidateEntry, providers: &Providers) -> bool {
        let Some(stage) = &self.metadata else {
            return true;
        };
        if entry.path.starts_with(DEVICE_PREFIX) {
            return true;
        }

        let mime = providers.mime_of(entry);
        match providers.metadata.entries(entry, &mime) {
            Ok(pairs) => pairs
                .iter()
                .any(|(key, value)| stage.key.matches(key) && value.contains(&stage.value)),
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "Cannot read metadata");
                false
            }
        }
    }
}

fn name_matches(required: &str, actual: Option<&str>) -> bool {
    required.is_empty() || actual.map_or(true, |actual| actual == required)
}
