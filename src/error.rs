//! Unified error handling for logcollect
//!
//! Every failure the collection core can produce is a variant of [`Error`].
//! The runner catches all of them at its boundary, so only argument
//! validation ever changes the process exit status.
//!
//! # Taxonomy
//!
//! - [`Error::Argument`] - bad CLI input, rejected before the core runs
//! - [`Error::Storage`] - status file unreadable, corrupt or unwritable
//! - [`Error::SourceUnavailable`] - the source could not be reached at all
//! - [`Error::CommandFailure`] / [`Error::Timeout`] - the collection command misbehaved
//! - [`Error::Encoding`] - file bytes not decodable in the declared encoding
//!
//! # Usage
//!
//! ```rust
//! use logcollect::error::{Error, ErrorCategory};
//!
//! let err = Error::storage("/var/lib/logcollect/status", "unexpected end of input");
//! assert_eq!(err.category(), ErrorCategory::Storage);
//! assert!(!err.is_recoverable());
//! ```

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use crate::config::ArgumentError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid command-line or configuration input
    Argument,
    /// Status file persistence
    Storage,
    /// File or command could not be reached
    Source,
    /// Command ran but failed or hung
    Command,
    /// Text decoding
    Encoding,
    /// Other I/O failures
    Other,
}

impl ErrorCategory {
    /// Short lowercase label, used as a structured log field
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Argument => "argument",
            Self::Storage => "storage",
            Self::Source => "source",
            Self::Command => "command",
            Self::Encoding => "encoding",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the logcollect crate
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid CLI arguments
    #[error("{0}")]
    Argument(#[from] ArgumentError),

    /// Status file could not be read, parsed or written
    #[error("Status file error ({}): {reason}", .path.display())]
    Storage { path: PathBuf, reason: String },

    /// Source could not be reached (e.g. shell missing)
    #[error("Source unavailable ({target}): {reason}")]
    SourceUnavailable { target: String, reason: String },

    /// Command exited with a non-zero status
    #[error("Command `{command}` exited with {}", describe_exit(.exit_code))]
    CommandFailure {
        command: String,
        exit_code: Option<i32>,
    },

    /// Command did not finish within the configured timeout
    #[error("Command `{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// File content is not valid in the declared encoding
    #[error("Failed to decode {} as {encoding}", .path.display())]
    Encoding {
        path: PathBuf,
        encoding: &'static str,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a storage error for the given status file
    pub fn storage(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Storage {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a source-unavailable error
    pub fn source_unavailable(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Whether the next scheduled invocation is likely to succeed without
    /// operator intervention
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SourceUnavailable { .. } => true,
            Self::CommandFailure { .. } => true,
            Self::Timeout { .. } => true,
            Self::Io(_) => true,
            Self::Argument(_) => false,
            Self::Storage { .. } => false,
            Self::Encoding { .. } => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Argument(_) => ErrorCategory::Argument,
            Self::Storage { .. } => ErrorCategory::Storage,
            Self::SourceUnavailable { .. } => ErrorCategory::Source,
            Self::CommandFailure { .. } | Self::Timeout { .. } => ErrorCategory::Command,
            Self::Encoding { .. } => ErrorCategory::Encoding,
            Self::Io(_) => ErrorCategory::Other,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
