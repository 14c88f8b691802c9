//! Mime-type classification and content-kind tables.
//!
//! The tables in this module are fixed for the life of the process. They
//! decide which files the content scanner skips outright and which zip
//! packaged office formats it unpacks.

use crate::types::EntryKind;
use memchr::memchr;
use std::path::Path;

/// Mime types that are never content-searched unless binary search is on.
///
/// These formats are often classified as text but are not useful to scan
/// line by line.
pub const IGNORED_MIME_TYPES: &[&str] = &["application/pdf", "application/postscript"];

/// Zip-packaged documents whose text lives in `content.xml`.
pub const OPENDOCUMENT_MIME_TYPES: &[&str] = &[
    "application/vnd.sun.xml.writer",
    "application/vnd.sun.xml.calc",
    "application/vnd.sun.xml.impress",
    "application/vnd.oasis.opendocument.presentation-template",
    "application/vnd.oasis.opendocument.presentation",
    "application/vnd.oasis.opendocument.spreadsheet-template",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.oasis.opendocument.text-template",
    "application/vnd.oasis.opendocument.text",
];

/// Zip-packaged documents whose text lives in `maindoc.xml`.
pub const KOFFICE_MIME_TYPES: &[&str] = &[
    "application/x-kword",
    "application/x-kspread",
    "application/x-kpresenter",
];

/// Fallback for files with no recognised extension
pub const OCTET_STREAM: &str = "application/octet-stream";

/// A zip-packaged office document family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfficeFamily {
    /// OpenDocument and StarOffice formats
    OpenDocument,
    /// KOffice 1.3 formats
    KOffice,
}

impl OfficeFamily {
    /// Archive member holding the document body
    pub fn payload(&self) -> &'static str {
        match self {
            OfficeFamily::OpenDocument => "content.xml",
            OfficeFamily::KOffice => "maindoc.xml",
        }
    }

    /// Archive member holding document properties
    pub fn properties(&self) -> &'static str {
        match self {
            OfficeFamily::OpenDocument => "meta.xml",
            OfficeFamily::KOffice => "documentinfo.xml",
        }
    }
}

/// Office family of a mime type, if it is a zip-packaged document
pub fn office_family(mime: &str) -> Option<OfficeFamily> {
    if OPENDOCUMENT_MIME_TYPES.contains(&mime) {
        Some(OfficeFamily::OpenDocument)
    } else if KOFFICE_MIME_TYPES.contains(&mime) {
        Some(OfficeFamily::KOffice)
    } else {
        None
    }
}

/// True if the mime type is on the content-search ignore list
pub fn is_ignored(mime: &str) -> bool {
    IGNORED_MIME_TYPES.contains(&mime)
}

/// True for `text/*` mime types
pub fn is_text(mime: &str) -> bool {
    mime.starts_with("text/")
}

/// Classifies entries into mime types.
pub trait MimeClassifier: Send + Sync {
    /// Mime type of the entry at `path`. `kind` is the entry kind when it
    /// is already known.
    fn classify(&self, path: &Path, kind: Option<EntryKind>) -> String;
}

/// Classifier based on entry kind and file-name extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionClassifier;

/// Extension table, lowercase extensions.
const EXTENSIONS: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("text", "text/plain"),
    ("log", "text/x-log"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("xml", "text/xml"),
    ("c", "text/x-csrc"),
    ("h", "text/x-chdr"),
    ("cpp", "text/x-c++src"),
    ("cc", "text/x-c++src"),
    ("hpp", "text/x-c++hdr"),
    ("rs", "text/rust"),
    ("py", "text/x-python"),
    ("sh", "application/x-shellscript"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("toml", "application/toml"),
    ("pdf", "application/pdf"),
    ("ps", "application/postscript"),
    ("eps", "application/postscript"),
    ("sxw", "application/vnd.sun.xml.writer"),
    ("sxc", "application/vnd.sun.xml.calc"),
    ("sxi", "application/vnd.sun.xml.impress"),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("ott", "application/vnd.oasis.opendocument.text-template"),
    ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
    ("ots", "application/vnd.oasis.opendocument.spreadsheet-template"),
    ("odp", "application/vnd.oasis.opendocument.presentation"),
    ("otp", "application/vnd.oasis.opendocument.presentation-template"),
    ("kwd", "application/x-kword"),
    ("ksp", "application/x-kspread"),
    ("kpr", "application/x-kpresenter"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("mp4", "video/mp4"),
];

impl MimeClassifier for ExtensionClassifier {
    fn classify(&self, path: &Path, kind: Option<EntryKind>) -> String {
        match kind {
            Some(EntryKind::Directory) => return "inode/directory".to_string(),
            Some(EntryKind::Symlink) => return "inode/symlink".to_string(),
            Some(EntryKind::CharDevice) => return "inode/chardevice".to_string(),
            Some(EntryKind::BlockDevice) => return "inode/blockdevice".to_string(),
            Some(EntryKind::Fifo) => return "inode/fifo".to_string(),
            Some(EntryKind::Socket) => return "inode/socket".to_string(),
            Some(EntryKind::Regular) | None => {}
        }

        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .and_then(|ext| {
                EXTENSIONS
                    .iter()
                    .find(|(candidate, _)| *candidate == ext)
                    .map(|(_, mime)| mime.to_string())
            })
            .unwrap_or_else(|| OCTET_STREAM.to_string())
    }
}

/// Heuristic binary-content check over a prefix of a file.
///
/// A prefix is binary if it contains a NUL byte, or if more than a tenth of
/// it is control characters other than common whitespace.
pub fn looks_binary(prefix: &[u8]) -> bool {
    if prefix.is_empty() {
        return false;
    }
    if memchr(0, prefix).is_some() {
        return true;
    }

    let control = prefix
        .iter()
        .filter(|&&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b))
        .count();
    control * 10 > prefix.len()
}
