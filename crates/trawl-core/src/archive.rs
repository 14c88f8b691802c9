//! Read-only access to members of zip-packaged documents.

use crate::error::{Result, TrawlError};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

/// Largest member that is read into memory
pub const MAX_MEMBER_BYTES: u64 = 64 * 1024 * 1024;

/// Read one member of the zip archive at `path`.
///
/// Fails with [`TrawlError::Archive`] if the file is not a readable zip
/// archive, has no member called `member`, or the member is larger than
/// [`MAX_MEMBER_BYTES`] once decompressed.
pub fn read_member(path: &Path, member: &str) -> Result<Vec<u8>> {
    read_member_limited(path, member, MAX_MEMBER_BYTES)
}

fn read_member_limited(path: &Path, member: &str, limit: u64) -> Result<Vec<u8>> {
    let is_file = fs::metadata(path)
        .map_err(|e| TrawlError::archive(path, e))?
        .is_file();
    if !is_file {
        return Err(TrawlError::archive(path, "not a regular file"));
    }

    let file = File::open(path).map_err(|e| TrawlError::archive(path, e))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| TrawlError::archive(path, format!("cannot open: {e}")))?;

    let mut entry = match archive.by_name(member) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(TrawlError::archive(path, format!("missing member {member}")));
        }
        Err(e) => return Err(TrawlError::archive(path, e)),
    };

    // The size in the header is not trusted
    let mut data = Vec::new();
    entry
        .by_ref()
        .take(limit + 1)
        .read_to_end(&mut data)
        .map_err(|e| TrawlError::archive(path, e))?;
    if data.len() as u64 > limit {
        return Err(TrawlError::archive(
            path,
            format!("member {member} exceeds {limit} bytes"),
        ));
    }
    Ok(data)
}
