//! Metadata extraction for the metadata filter.
//!
//! A [`MetadataProvider`] lists the key/value pairs it can extract from a
//! file. The default provider reports the file name and mime type of every
//! entry, plus the document properties stored inside zip-packaged office
//! documents (`meta.xml` or `documentinfo.xml`).

use crate::archive;
use crate::error::{Result, TrawlError};
use crate::mime::office_family;
use crate::types::CandidateEntry;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Extracts key/value metadata from files.
pub trait MetadataProvider: Send + Sync {
    /// All key/value pairs extractable from `entry`, whose mime type is
    /// `mime`.
    fn entries(&self, entry: &CandidateEntry, mime: &str) -> Result<Vec<(String, String)>>;
}

/// Default provider for generic and office-document metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentMetadata;

impl MetadataProvider for DocumentMetadata {
    fn entries(&self, entry: &CandidateEntry, mime: &str) -> Result<Vec<(String, String)>> {
        let mut pairs = vec![
            ("file_name".to_string(), entry.name.clone()),
            ("mime_type".to_string(), mime.to_string()),
        ];

        if let Some(family) = office_family(mime) {
            let xml = archive::read_member(&entry.path, family.properties())
                .map_err(|e| TrawlError::metadata(&entry.path, e))?;
            let xml = String::from_utf8_lossy(&xml);
            let properties = parse_properties(&xml);
            debug!(
                path = %entry.path.display(),
                count = properties.len(),
                "Read document properties"
            );
            pairs.extend(properties);
        }

        Ok(pairs)
    }
}

fn element_regex() -> &'static Regex {
    static ELEMENT: OnceLock<Regex> = OnceLock::new();
    ELEMENT.get_or_init(|| {
        Regex::new(r"<([A-Za-z_][\w.\-]*(?::[A-Za-z_][\w.\-]*)?)(?:\s[^>]*)?>([^<]*)</([\w.:\-]+)>")
            .expect("element pattern is valid")
    })
}

/// Collect leaf elements with text content as `(qualified name, text)`.
fn parse_properties(xml: &str) -> Vec<(String, String)> {
    element_regex()
        .captures_iter(xml)
        .filter(|caps| caps[1] == caps[3])
        .filter_map(|caps| {
            let value = unescape(caps[2].trim());
            (!value.is_empty()).then(|| (caps[1].to_string(), value))
        })
        .collect()
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
