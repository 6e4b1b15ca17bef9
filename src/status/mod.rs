//! Status file persistence for daily deduplication
//!
//! The status file holds a single [`CollectionStatus`] record: the time of
//! the last successful collection for one source. It is read in full on every
//! query and rewritten in full on every update.
//!
//! # Format
//!
//! Pretty-printed JSON carrying an explicit `schema_version`. Records with a
//! different version, or content that does not parse, are reported as
//! [`Error::Storage`] rather than silently treated as empty.
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "last_collection_time": "2024-07-09T20:00:00+09:00"
//! }
//! ```
//!
//! # Concurrency
//!
//! Writes go to a sibling temp file that is renamed over the status file, so
//! a crash never leaves a truncated record behind. Concurrent invocations are
//! NOT coordinated: two read-modify-write cycles racing on the same file can
//! lose an update (last writer wins).
//!
//! # Example
//!
//! ```no_run
//! use logcollect::status::StatusStore;
//!
//! # fn example() -> logcollect::error::Result<()> {
//! let store = StatusStore::open("/var/lib/logcollect/app.status")?;
//! store.record_collection_time(chrono::Local::now().fixed_offset())?;
//! assert!(store.last_collection_time()?.is_some());
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Version written into every status record
pub const SCHEMA_VERSION: u32 = 1;

/// Persisted collection state for one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStatus {
    /// Record format version
    pub schema_version: u32,

    /// When the source was last collected, with the local offset at that time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_collection_time: Option<DateTime<FixedOffset>>,
}

impl Default for CollectionStatus {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            last_collection_time: None,
        }
    }
}

/// Reads and writes the status file at a single path
#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    /// Open a store, creating the parent directory if it does not exist yet
    ///
    /// The status file itself is only created by the first update.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                Error::storage(
                    &path,
                    format!("failed to create directory {}: {e}", dir.display()),
                )
            })?;
        }

        Ok(Self { path })
    }

    /// Path of the status file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted record, or an empty one if the file does not exist
    pub fn read(&self) -> Result<CollectionStatus> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CollectionStatus::default()),
            Err(e) => return Err(Error::storage(&self.path, format!("failed to read: {e}"))),
        };

        let status: CollectionStatus = serde_json::from_slice(&bytes)
            .map_err(|e| Error::storage(&self.path, format!("corrupt status record: {e}")))?;

        if status.schema_version != SCHEMA_VERSION {
            return Err(Error::storage(
                &self.path,
                format!(
                    "unsupported schema version {} (expected {SCHEMA_VERSION})",
                    status.schema_version
                ),
            ));
        }

        tracing::debug!(path = %self.path.display(), "Status loaded");
        Ok(status)
    }

    /// Time of the last recorded collection, if any
    pub fn last_collection_time(&self) -> Result<Option<DateTime<FixedOffset>>> {
        Ok(self.read()?.last_collection_time)
    }

    /// Record `time` as the last collection time, rewriting the whole record
    pub fn record_collection_time(&self, time: DateTime<FixedOffset>) -> Result<()> {
        let mut status = self.read()?;
        status.last_collection_time = Some(time);
        self.write(&status)?;

        tracing::debug!(
            path = %self.path.display(),
            last_collection_time = %time.to_rfc3339(),
            "Status updated"
        );
        Ok(())
    }

    fn write(&self, status: &CollectionStatus) -> Result<()> {
        let temp_path = self.temp_path();

        let result = write_record(&temp_path, status).and_then(|()| {
            fs::rename(&temp_path, &self.path)
                .map_err(|e| format!("failed to replace status file: {e}"))
        });

        if let Err(reason) = result {
            // Leftover temp files are harmless, but keep the directory tidy.
            let _ = fs::remove_file(&temp_path);
            return Err(Error::storage(&self.path, reason));
        }

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("status"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn write_record(path: &Path, status: &CollectionStatus) -> std::result::Result<(), String> {
    let file = File::create(path)
        .map_err(|e| format!("failed to create {}: {e}", path.display()))?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, status)
        .map_err(|e| format!("failed to serialize status: {e}"))?;

    let file = writer
        .into_inner()
        .map_err(|e| format!("failed to flush status: {}", e.error()))?;
    file.sync_all()
        .map_err(|e| format!("failed to sync status: {e}"))?;

    Ok(())
}
