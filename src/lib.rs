//! logcollect - scheduled, idempotent log collection
//!
//! Meant to be invoked repeatedly by an external scheduler (cron, systemd
//! timers, a monitoring agent). Each invocation decides whether a collection
//! is due, retrieves the content of one source exactly once per allowed
//! window and hands it back as a single payload.
//!
//! # Architecture
//!
//! - [`status`] - status file holding the last collection time
//! - [`gate`] - hour restriction and daily deduplication
//! - [`source`] - file and command sources
//! - [`runner`] - orchestration and error isolation
//! - [`config`] - request validation and process configuration
//! - [`error`] - error taxonomy
//!
//! # Example
//!
//! ```no_run
//! use logcollect::config::{CollectionRequest, CommonArgs, DefaultsConfig};
//! use logcollect::runner::Runner;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let args = CommonArgs {
//!     positionals: vec!["/var/log/app/batch.log".to_string()],
//!     hour: Some(20),
//!     status_file: Some("/var/lib/logcollect/batch.status".into()),
//!     dry_run: false,
//! };
//! let request = CollectionRequest::for_file(args, Some("utf-8"), true, &DefaultsConfig::default())?;
//!
//! if let Some(payload) = Runner::new(request).run().await.into_payload() {
//!     print!("{}", payload.to_text());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod runner;
pub mod source;
pub mod status;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CollectionRequest, CommonArgs, Config, SourceSpec};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::gate::{should_collect, GateDecision};
    pub use crate::runner::{Outcome, Runner};
    pub use crate::source::Payload;
    pub use crate::status::{CollectionStatus, StatusStore};
}
