//! Live directory listing source.

use super::{EntrySource, SourceEvent};
use crate::cancel::CancellationToken;
use crate::error::SourceError;
use crate::mime::MimeClassifier;
use crate::query::QueryConfig;
use crate::types::{file_name_of, CandidateEntry, EntryKind};
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Enumerates the search root on a background thread.
///
/// Entries are sent in batches of at most `batch_size`. Unreadable
/// subdirectories are logged and skipped; only a root that cannot be listed
/// fails the source.
pub struct LiveListing {
    root: PathBuf,
    recursive: bool,
    follow_links: bool,
    batch_size: usize,
    mime: Arc<dyn MimeClassifier>,
    token: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl LiveListing {
    /// Create a listing for the root and options of a query
    pub fn new(config: &QueryConfig, mime: Arc<dyn MimeClassifier>) -> Self {
        LiveListing {
            root: config.root.clone(),
            recursive: config.recursive,
            follow_links: config.follow_links,
            batch_size: config.batch_size.max(1),
            mime,
            token: CancellationToken::new(),
            worker: None,
        }
    }
}

impl EntrySource for LiveListing {
    fn start(
        &mut self,
        sink: Sender<SourceEvent>,
        token: CancellationToken,
    ) -> Result<(), SourceError> {
        fs::read_dir(&self.root).map_err(|e| SourceError::io(&self.root, &e))?;

        self.token = token.clone();
        let mut walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(self.follow_links);
        if !self.recursive {
            walker = walker.max_depth(1);
        }

        let batch_size = self.batch_size;
        let mime = Arc::clone(&self.mime);
        debug!(root = %self.root.display(), recursive = self.recursive, "Starting listing");

        self.worker = Some(thread::spawn(move || {
            walk(walker, batch_size, mime.as_ref(), &sink, &token);
        }));
        Ok(())
    }

    fn kill(&mut self) {
        self.token.cancel();
    }

    fn name(&self) -> &'static str {
        "listing"
    }
}

impl Drop for LiveListing {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn walk(
    walker: WalkDir,
    batch_size: usize,
    mime: &dyn MimeClassifier,
    sink: &Sender<SourceEvent>,
    token: &CancellationToken,
) {
    let mut owners = OwnerCache::default();
    let mut batch = Vec::with_capacity(batch_size);

    for result in walker {
        if token.is_cancelled() {
            let _ = sink.send(SourceEvent::Finished(Err(SourceError::Cancelled)));
            return;
        }

        let dir_entry = match result {
            Ok(dir_entry) => dir_entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        match convert(&dir_entry, &mut owners, mime) {
            Ok(entry) => batch.push(entry),
            Err(e) => {
                warn!(path = %dir_entry.path().display(), error = %e, "Cannot stat entry");
                continue;
            }
        }

        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if sink.send(SourceEvent::Entries(full)).is_err() {
                // Query went away
                return;
            }
        }
    }

    if !batch.is_empty() && sink.send(SourceEvent::Entries(batch)).is_err() {
        return;
    }
    let _ = sink.send(SourceEvent::Finished(Ok(())));
}

/// Convert a raw directory record into a candidate entry.
fn convert(
    dir_entry: &DirEntry,
    owners: &mut OwnerCache,
    mime: &dyn MimeClassifier,
) -> std::io::Result<CandidateEntry> {
    let path = dir_entry.path().to_path_buf();
    let metadata = dir_entry.metadata().map_err(std::io::Error::from)?;
    let kind = EntryKind::from_file_type(dir_entry.file_type());
    let links_to_dir =
        kind == EntryKind::Symlink && fs::metadata(&path).map(|m| m.is_dir()).unwrap_or(false);

    let mime_type = mime.classify(&path, Some(kind));
    let mut entry = CandidateEntry::from_path(path)
        .with_kind(kind)
        .with_size(metadata.len())
        .with_mime_type(mime_type);
    entry.name = dir_entry
        .file_name()
        .to_str()
        .map(str::to_string)
        .unwrap_or_else(|| file_name_of(dir_entry.path()));
    entry.links_to_dir = links_to_dir;

    if let Ok(modified) = metadata.modified() {
        entry = entry.with_modified(DateTime::<Utc>::from(modified));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let owner = owners.user(metadata.uid());
        let group = owners.group(metadata.gid());
        entry = entry.with_mode(metadata.mode()).with_ownership(owner, group);
    }
    #[cfg(not(unix))]
    let _ = owners;

    Ok(entry)
}

/// Caches uid and gid to name lookups for the duration of one listing.
#[derive(Default)]
struct OwnerCache {
    #[cfg(unix)]
    users: std::collections::HashMap<u32, String>,
    #[cfg(unix)]
    groups: std::collections::HashMap<u32, String>,
}

#[cfg(unix)]
impl OwnerCache {
    fn user(&mut self, uid: u32) -> Option<String> {
        use nix::unistd::{Uid, User};
        let name = self.users.entry(uid).or_insert_with(|| {
            User::from_uid(Uid::from_raw(uid))
                .ok()
                .flatten()
                .map(|user| user.name)
                .unwrap_or_else(|| uid.to_string())
        });
        Some(name.clone())
    }

    fn group(&mut self, gid: u32) -> Option<String> {
        use nix::unistd::{Gid, Group};
        let name = self.groups.entry(gid).or_insert_with(|| {
            Group::from_gid(Gid::from_raw(gid))
                .ok()
                .flatten()
                .map(|group| group.name)
                .unwrap_or_else(|| gid.to_string())
        });
        Some(name.clone())
    }
}
