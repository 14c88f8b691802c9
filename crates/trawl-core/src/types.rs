//! Core data types for Trawl.
//!
//! Entries are value objects produced by an entry source and consumed
//! read-only by the filter pipeline and the content scanner. An entry never
//! outlives the processing step that evaluates it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Permission bit mask (`0o7777`) of a POSIX mode
pub const PERMISSION_MASK: u32 = 0o7777;

/// Execute bits for user, group and other
pub const ANY_EXECUTE: u32 = 0o111;

/// Set-user-id bit
pub const SET_UID: u32 = 0o4000;

/// The kind of a filesystem entry, as reported by `lstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
}

impl EntryKind {
    /// Derive the kind from the file-type bits of a POSIX mode
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & 0o170000 {
            0o100000 => Some(EntryKind::Regular),
            0o040000 => Some(EntryKind::Directory),
            0o120000 => Some(EntryKind::Symlink),
            0o020000 => Some(EntryKind::CharDevice),
            0o060000 => Some(EntryKind::BlockDevice),
            0o010000 => Some(EntryKind::Fifo),
            0o140000 => Some(EntryKind::Socket),
            _ => None,
        }
    }

    /// Derive the kind from a std file type
    pub fn from_file_type(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            return EntryKind::Symlink;
        }
        if file_type.is_dir() {
            return EntryKind::Directory;
        }
        if file_type.is_file() {
            return EntryKind::Regular;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if file_type.is_char_device() {
                return EntryKind::CharDevice;
            }
            if file_type.is_block_device() {
                return EntryKind::BlockDevice;
            }
            if file_type.is_fifo() {
                return EntryKind::Fifo;
            }
            if file_type.is_socket() {
                return EntryKind::Socket;
            }
        }

        EntryKind::Regular
    }

    /// True for character devices, block devices, fifos and sockets
    pub fn is_special(&self) -> bool {
        matches!(
            self,
            EntryKind::CharDevice | EntryKind::BlockDevice | EntryKind::Fifo | EntryKind::Socket
        )
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryKind::Regular => "file",
            EntryKind::Directory => "directory",
            EntryKind::Symlink => "symlink",
            EntryKind::CharDevice => "char_device",
            EntryKind::BlockDevice => "block_device",
            EntryKind::Fifo => "fifo",
            EntryKind::Socket => "socket",
        };
        f.write_str(s)
    }
}

/// A candidate filesystem entry awaiting evaluation.
///
/// Attributes are optional because the external index source only knows
/// paths. A predicate that needs an unknown attribute never rejects the
/// entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateEntry {
    /// File name without its parent (e.g., "notes.txt")
    pub name: String,

    /// Absolute path of the entry
    pub path: PathBuf,

    /// Size in bytes
    pub size: Option<u64>,

    /// Last modification time
    pub modified: Option<DateTime<Utc>>,

    /// Owning user name
    pub owner: Option<String>,

    /// Owning group name
    pub group: Option<String>,

    /// Full POSIX mode (file type and permission bits)
    pub mode: Option<u32>,

    /// Entry kind, from `lstat`
    pub kind: Option<EntryKind>,

    /// True if the entry is a symlink that resolves to a directory
    pub links_to_dir: bool,

    /// Mime type, if already classified
    pub mime_type: Option<String>,
}

impl CandidateEntry {
    /// Create an entry that knows only its path.
    ///
    /// This is what the external index source produces for each output line.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = file_name_of(&path);
        CandidateEntry {
            name,
            path,
            size: None,
            modified: None,
            owner: None,
            group: None,
            mode: None,
            kind: None,
            links_to_dir: false,
            mime_type: None,
        }
    }

    /// Set the size
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the modification time
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Set the owner and group names
    pub fn with_ownership(mut self, owner: Option<String>, group: Option<String>) -> Self {
        self.owner = owner;
        self.group = group;
        self
    }

    /// Set the POSIX mode; the kind is derived from its file-type bits
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        if let Some(kind) = EntryKind::from_mode(mode) {
            self.kind = Some(kind);
        }
        self
    }

    /// Set the entry kind
    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the mime type
    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    /// Parent directory of the entry
    pub fn parent(&self) -> Option<&Path> {
        self.path.parent()
    }

    /// Permission bits of the mode, if known
    pub fn permissions(&self) -> Option<u32> {
        self.mode.map(|m| m & PERMISSION_MASK)
    }

    /// True for directories and symlinks pointing at directories
    pub fn is_dir(&self) -> bool {
        self.kind == Some(EntryKind::Directory) || self.links_to_dir
    }

    /// True for symbolic links
    pub fn is_link(&self) -> bool {
        self.kind == Some(EntryKind::Symlink)
    }

    /// True for the synthetic `.` and `..` directory entries
    pub fn is_dot_entry(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// Extract the file name of a path, ignoring any trailing separator
pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| {
            // `file_name` is None for paths ending in `..` or the root
            path.to_string_lossy()
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        })
}

/// A matched entry, with the first matching content line when a content
/// pattern was configured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// The entry that passed every filter
    pub entry: CandidateEntry,

    /// `"<line number>: <line text>"` for content searches
    pub matching_line: Option<String>,
}

impl MatchResult {
    /// Create a match without a content line
    pub fn new(entry: CandidateEntry) -> Self {
        MatchResult {
            entry,
            matching_line: None,
        }
    }

    /// Create a match with the content line that satisfied the pattern
    pub fn with_line(entry: CandidateEntry, line: String) -> Self {
        MatchResult {
            entry,
            matching_line: Some(line),
        }
    }
}
