//! Configuration management for logcollect
//!
//! Two layers live here:
//!
//! - [`Config`]: process-wide settings (logging, per-host defaults) loaded from
//!   an optional TOML file and environment variables.
//! - [`CollectionRequest`]: a fully validated description of one collection,
//!   assembled from command-line values. The core only ever sees requests that
//!   passed [`CollectionRequest::for_file`] or [`CollectionRequest::for_command`].

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::utils::resolve_encoding;

/// Encoding assumed for source files when none is given
pub const DEFAULT_ENCODING: &str = "shift_jis";

/// Environment variable selecting the log level
pub const ENV_LOG_LEVEL: &str = "LOGCOLLECT_LOG_LEVEL";

/// Environment variable selecting the log format
pub const ENV_LOG_FORMAT: &str = "LOGCOLLECT_LOG_FORMAT";

// ============================================================================
// Argument Validation
// ============================================================================

/// Invalid command-line input, detected before any collection is attempted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    /// No file path given to the file variant
    #[error("Need the filepath to collect.")]
    MissingPath,

    /// No command line given to the command variant
    #[error("Need the command to execute.")]
    MissingCommand,

    /// More than one positional argument
    #[error("Invalid arguments: {0:?}")]
    UnexpectedArguments(Vec<String>),

    /// `--hour` outside 0..=23
    #[error("--hour {0} must be an integer from 0 to 23.")]
    HourOutOfRange(i64),

    /// Encoding label not known
    #[error("unknown encoding name - {0}")]
    UnknownEncoding(String),

    /// `--timeout 0`
    #[error("--timeout must be a positive number of seconds.")]
    InvalidTimeout,
}

/// Check an hour-of-day restriction
pub fn validate_hour(hour: i64) -> std::result::Result<u8, ArgumentError> {
    if (0..=23).contains(&hour) {
        Ok(hour as u8)
    } else {
        Err(ArgumentError::HourOutOfRange(hour))
    }
}

/// Resolve an encoding label or report it as unknown
pub fn validate_encoding(label: &str) -> std::result::Result<&'static Encoding, ArgumentError> {
    resolve_encoding(label).ok_or_else(|| ArgumentError::UnknownEncoding(label.to_string()))
}

/// Check a command timeout given in seconds
pub fn validate_timeout(secs: u64) -> std::result::Result<Duration, ArgumentError> {
    if secs == 0 {
        return Err(ArgumentError::InvalidTimeout);
    }
    Ok(Duration::from_secs(secs))
}

fn single_positional(
    mut positionals: Vec<String>,
    missing: ArgumentError,
) -> std::result::Result<String, ArgumentError> {
    match positionals.len() {
        0 => Err(missing),
        1 => Ok(positionals.remove(0)),
        _ => Err(ArgumentError::UnexpectedArguments(positionals.split_off(1))),
    }
}

// ============================================================================
// Collection Request
// ============================================================================

/// How content is obtained
#[derive(Debug, Clone)]
pub enum SourceSpec {
    /// Read a file in the given encoding, optionally renaming it afterwards
    File {
        path: PathBuf,
        encoding: &'static Encoding,
        move_after: bool,
    },

    /// Run a trusted, externally configured command line through the shell
    Command {
        command_line: String,
        timeout: Option<Duration>,
    },
}

/// Options shared by both source variants, as given on the command line
#[derive(Debug, Clone, Default)]
pub struct CommonArgs {
    /// Positional arguments (exactly one is accepted)
    pub positionals: Vec<String>,

    /// Hour-of-day restriction, unchecked
    pub hour: Option<i64>,

    /// Status file for daily deduplication
    pub status_file: Option<PathBuf>,

    /// Suppress persistent side effects
    pub dry_run: bool,
}

/// A validated request for one collection
#[derive(Debug, Clone)]
pub struct CollectionRequest {
    /// Where the content comes from
    pub source: SourceSpec,

    /// Only collect during this hour of the day (0-23)
    pub hour: Option<u8>,

    /// Status file recording the last collection time
    pub status_file: Option<PathBuf>,

    /// Preview mode: no move, no status update
    pub dry_run: bool,
}

impl CollectionRequest {
    /// Build a file-variant request, falling back to `defaults` for unset options
    pub fn for_file(
        args: CommonArgs,
        encoding: Option<&str>,
        move_after: bool,
        defaults: &DefaultsConfig,
    ) -> std::result::Result<Self, ArgumentError> {
        let label = encoding
            .or(defaults.encoding.as_deref())
            .unwrap_or(DEFAULT_ENCODING);
        let encoding = validate_encoding(label)?;
        let hour = args.hour.or(defaults.hour).map(validate_hour).transpose()?;
        let path = single_positional(args.positionals, ArgumentError::MissingPath)?;

        Ok(Self {
            source: SourceSpec::File {
                path: PathBuf::from(path),
                encoding,
                move_after,
            },
            hour,
            status_file: args.status_file.or_else(|| defaults.status_file.clone()),
            dry_run: args.dry_run,
        })
    }

    /// Build a command-variant request, falling back to `defaults` for unset options
    pub fn for_command(
        args: CommonArgs,
        timeout_secs: Option<u64>,
        defaults: &DefaultsConfig,
    ) -> std::result::Result<Self, ArgumentError> {
        let hour = args.hour.or(defaults.hour).map(validate_hour).transpose()?;
        let timeout = timeout_secs
            .or(defaults.timeout_secs)
            .map(validate_timeout)
            .transpose()?;
        let command_line = single_positional(args.positionals, ArgumentError::MissingCommand)?;

        Ok(Self {
            source: SourceSpec::Command {
                command_line,
                timeout,
            },
            hour,
            status_file: args.status_file.or_else(|| defaults.status_file.clone()),
            dry_run: args.dry_run,
        })
    }

    /// Human-readable description of the source, for logging
    pub fn source_label(&self) -> String {
        match &self.source {
            SourceSpec::File { path, .. } => path.display().to_string(),
            SourceSpec::Command { command_line, .. } => command_line.clone(),
        }
    }
}

// ============================================================================
// Process Configuration
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Defaults applied when the command line leaves an option unset
    pub defaults: DefaultsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("warn"),
            format: String::from("text"),
        }
    }
}

/// Per-host defaults for collection options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Encoding label for file sources
    pub encoding: Option<String>,

    /// Status file path
    pub status_file: Option<PathBuf>,

    /// Hour-of-day restriction
    pub hour: Option<i64>,

    /// Command timeout in seconds
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load the optional config file, then let the environment override logging
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var(ENV_LOG_FORMAT) {
            self.logging.format = format;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), ArgumentError> {
        if let Some(label) = &self.defaults.encoding {
            validate_encoding(label)?;
        }
        if let Some(hour) = self.defaults.hour {
            validate_hour(hour)?;
        }
        if let Some(secs) = self.defaults.timeout_secs {
            validate_timeout(secs)?;
        }
        Ok(())
    }
}
