//! File source
//!
//! Reads a whole file in a declared encoding. A missing file is not an
//! error: it means there is nothing to collect yet.

use encoding_rs::Encoding;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::Payload;
use crate::error::{Error, Result};
use crate::utils::decode_strict;

/// Suffix appended to a file once it has been collected
pub const COLLECTED_SUFFIX: &str = ".collected";

/// Read and decode `path`
///
/// Returns `Ok(None)` when the file does not exist. Any other I/O failure is
/// an error, and so are bytes that are not valid in `encoding`.
pub fn read_source(path: &Path, encoding: &'static Encoding) -> Result<Option<Payload>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Source file does not exist");
            return Ok(None);
        }
        Err(e) => return Err(Error::Io(e)),
    };

    if decode_strict(&raw, encoding).is_none() {
        return Err(Error::Encoding {
            path: path.to_path_buf(),
            encoding: encoding.name(),
        });
    }

    tracing::debug!(
        path = %path.display(),
        encoding = encoding.name(),
        bytes = raw.len(),
        "Source file read"
    );
    Ok(Some(Payload::Text { raw, encoding }))
}

/// Path a collected file is renamed to
pub fn consumed_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(COLLECTED_SUFFIX);
    PathBuf::from(name)
}

/// Rename `path` by appending [`COLLECTED_SUFFIX`], returning the new path
///
/// An existing file at the destination is replaced.
pub fn mark_consumed(path: &Path) -> Result<PathBuf> {
    let target = consumed_path(path);
    fs::rename(path, &target)?;

    tracing::debug!(
        from = %path.display(),
        to = %target.display(),
        "Source file marked as collected"
    );
    Ok(target)
}
