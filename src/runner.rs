//! Collection runner
//!
//! Orchestrates one invocation: gate check, retrieval, marking the source as
//! consumed and recording the collection time.
//!
//! ```text
//! Idle ──gate──► GatedOut
//!   │
//!   └──► Collecting ──► NothingToCollect | Failed | Partial | Collected
//! ```
//!
//! Every core error is caught here and logged; callers only ever receive an
//! [`Outcome`]. A collection time that cannot be recorded fails the attempt,
//! unless the source file was already renamed and would otherwise be lost.
//! Dry-run still checks the gate and retrieves the content, but
//! never moves the source file nor writes the status file.

use chrono::{DateTime, Local, TimeZone};
use std::io::{self, Write};

use crate::config::{CollectionRequest, SourceSpec};
use crate::error::{Error, Result};
use crate::gate::{self, GateDecision};
use crate::source::{command, file, Payload};
use crate::status::StatusStore;

/// Result of one invocation
#[derive(Debug)]
pub enum Outcome {
    /// The gate refused to collect
    GatedOut(GateDecision),

    /// The source had nothing to offer (missing file, shell not startable)
    NothingToCollect,

    /// The attempt was aborted by an error
    Failed(Error),

    /// The command failed; its output is returned but the collection is not recorded
    Partial {
        payload: Payload,
        exit_code: Option<i32>,
    },

    /// Content was collected
    Collected {
        payload: Payload,
        /// Whether the collection time was written to the status file
        recorded: bool,
    },
}

impl Outcome {
    /// The collected content, if any
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Partial { payload, .. } | Self::Collected { payload, .. } => Some(payload),
            Self::GatedOut(_) | Self::NothingToCollect | Self::Failed(_) => None,
        }
    }

    /// Consume the outcome, keeping only the collected content
    pub fn into_payload(self) -> Option<Payload> {
        match self {
            Self::Partial { payload, .. } | Self::Collected { payload, .. } => Some(payload),
            Self::GatedOut(_) | Self::NothingToCollect | Self::Failed(_) => None,
        }
    }

    /// Short state name, used as a structured log field
    pub fn state(&self) -> &'static str {
        match self {
            Self::GatedOut(_) => "gated_out",
            Self::NothingToCollect => "nothing_to_collect",
            Self::Failed(_) => "failed",
            Self::Partial { .. } => "partial",
            Self::Collected { .. } => "collected",
        }
    }
}

/// Runs a single validated collection request
pub struct Runner {
    request: CollectionRequest,
    error_sink: Box<dyn Write + Send>,
}

impl Runner {
    /// Create a runner that forwards command stderr to the process stderr
    pub fn new(request: CollectionRequest) -> Self {
        Self::with_error_sink(request, Box::new(io::stderr()))
    }

    /// Create a runner that forwards command stderr to `sink`
    pub fn with_error_sink(request: CollectionRequest, sink: Box<dyn Write + Send>) -> Self {
        Self {
            request,
            error_sink: sink,
        }
    }

    /// The request this runner executes
    pub fn request(&self) -> &CollectionRequest {
        &self.request
    }

    /// Run the collection as of the current local time
    pub async fn run(&mut self) -> Outcome {
        let now = Local::now();
        self.run_at(&now).await
    }

    /// Run the collection as of `now`
    pub async fn run_at<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Outcome {
        let outcome = match self.try_run(now).await {
            Ok(outcome) => outcome,
            Err(Error::SourceUnavailable { target, reason }) => {
                tracing::warn!(
                    source = %target,
                    reason = %reason,
                    "Source unavailable, nothing to collect"
                );
                Outcome::NothingToCollect
            }
            Err(err) => {
                tracing::error!(
                    source = %self.request.source_label(),
                    category = %err.category(),
                    recoverable = err.is_recoverable(),
                    "Collection failed: {err}"
                );
                Outcome::Failed(err)
            }
        };

        tracing::debug!(state = outcome.state(), "Collection finished");
        outcome
    }

    async fn try_run<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Outcome> {
        let store = self
            .request
            .status_file
            .as_deref()
            .map(StatusStore::open)
            .transpose()?;

        let decision = gate::evaluate(now, self.request.hour, store.as_ref())?;
        if !decision.is_go() {
            tracing::debug!(reason = %decision, "Collection skipped");
            return Ok(Outcome::GatedOut(decision));
        }

        let dry_run = self.request.dry_run;
        let mut moved = false;
        let payload = match &self.request.source {
            SourceSpec::File {
                path,
                encoding,
                move_after,
            } => {
                let Some(payload) = file::read_source(path, *encoding)? else {
                    return Ok(Outcome::NothingToCollect);
                };

                if *move_after {
                    if dry_run {
                        tracing::info!(path = %path.display(), "Dry run: source file not moved");
                    } else {
                        match file::mark_consumed(path) {
                            Ok(_) => moved = true,
                            Err(err) => tracing::error!(
                                path = %path.display(),
                                "Failed to mark source file as collected: {err}"
                            ),
                        }
                    }
                }
                payload
            }
            SourceSpec::Command {
                command_line,
                timeout,
            } => {
                let output = command::run_source(command_line, *timeout).await?;
                if let Err(e) = command::report(&output, command_line, self.error_sink.as_mut()) {
                    tracing::warn!(error = %e, "Failed to forward command stderr");
                }

                if !output.success() {
                    return Ok(Outcome::Partial {
                        payload: Payload::Bytes(output.stdout),
                        exit_code: output.exit_code,
                    });
                }
                Payload::Bytes(output.stdout)
            }
        };

        tracing::debug!(
            source = %self.request.source_label(),
            bytes = payload.len(),
            "Content collected"
        );

        let recorded = match &store {
            Some(_) if dry_run => {
                tracing::info!("Dry run: status file not updated");
                false
            }
            Some(store) => match store.record_collection_time(now.fixed_offset()) {
                Ok(()) => true,
                Err(err) if moved => {
                    tracing::error!(
                        path = %store.path().display(),
                        "Failed to record collection time, emitting renamed source anyway: {err}"
                    );
                    false
                }
                Err(err) => return Err(err),
            },
            None => false,
        };

        Ok(Outcome::Collected { payload, recorded })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommonArgs, DefaultsConfig};
    use chrono::FixedOffset;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const CONTENT: &str = "sample log\n日本語のログ\n";

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn at(d: u32, h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 7, d, h, m, s)
            .unwrap()
    }

    fn file_request(
        path: &Path,
        hour: Option<i64>,
        status_file: Option<PathBuf>,
        move_after: bool,
        dry_run: bool,
    ) -> CollectionRequest {
        let common = CommonArgs {
            positionals: vec![path.display().to_string()],
            hour,
            status_file,
            dry_run,
        };
        CollectionRequest::for_file(common, Some("utf-8"), move_after, &DefaultsConfig::default())
            .unwrap()
    }

    fn command_request(command_line: &str, status_file: Option<PathBuf>) -> CollectionRequest {
        let common = CommonArgs {
            positionals: vec![command_line.to_string()],
            status_file,
            ..Default::default()
        };
        CollectionRequest::for_command(common, None, &DefaultsConfig::default()).unwrap()
    }

    fn text(outcome: &Outcome) -> Option<String> {
        outcome.payload().map(|p| p.to_text().into_owned())
    }

    #[tokio::test]
    async fn test_reads_file_without_options() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test");
        fs::write(&path, "a\nb\n").unwrap();

        let mut runner = Runner::new(file_request(&path, None, None, false, false));
        let outcome = runner.run().await;

        assert_eq!(text(&outcome).as_deref(), Some("a\nb\n"));
        assert!(matches!(outcome, Outcome::Collected { recorded: false, .. }));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_hour_gate() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test");
        fs::write(&path, CONTENT).unwrap();
        let mut runner = Runner::new(file_request(&path, Some(20), None, false, false));

        let outcome = runner.run_at(&at(9, 0, 0, 0)).await;
        assert!(matches!(outcome, Outcome::GatedOut(GateDecision::WrongHour { .. })));
        assert!(outcome.into_payload().is_none());

        let outcome = runner.run_at(&at(9, 20, 0, 0)).await;
        assert_eq!(text(&outcome).as_deref(), Some(CONTENT));
    }

    #[tokio::test]
    async fn test_status_dedup_sequence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test");
        let status = temp_dir.path().join("status");
        fs::write(&path, CONTENT).unwrap();
        let mut runner = Runner::new(file_request(&path, Some(20), Some(status.clone()), false, false));

        let outcome = runner.run_at(&at(9, 20, 0, 0)).await;
        assert_eq!(text(&outcome).as_deref(), Some(CONTENT));
        assert!(matches!(outcome, Outcome::Collected { recorded: true, .. }));

        // same hour, same day
        let outcome = runner.run_at(&at(9, 20, 59, 59)).await;
        assert!(matches!(
            outcome,
            Outcome::GatedOut(GateDecision::AlreadyCollected { .. })
        ));

        // next day, wrong hour
        let outcome = runner.run_at(&at(10, 0, 0, 0)).await;
        assert!(matches!(outcome, Outcome::GatedOut(GateDecision::WrongHour { .. })));

        // next day, collection hour
        let outcome = runner.run_at(&at(10, 20, 0, 0)).await;
        assert_eq!(text(&outcome).as_deref(), Some(CONTENT));
    }

    #[tokio::test]
    async fn test_gated_out_run_does_not_touch_status_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test");
        let status = temp_dir.path().join("status");
        fs::write(&path, CONTENT).unwrap();
        let mut runner = Runner::new(file_request(&path, None, Some(status.clone()), false, false));

        runner.run_at(&at(9, 8, 0, 0)).await;
        let before = fs::read(&status).unwrap();

        let outcome = runner.run_at(&at(9, 8, 5, 0)).await;
        assert!(outcome.payload().is_none());
        assert_eq!(fs::read(&status).unwrap(), before);
    }

    #[tokio::test]
    async fn test_dry_run_has_no_side_effects() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test");
        let status = temp_dir.path().join("state/status");
        fs::write(&path, CONTENT).unwrap();
        let mut runner = Runner::new(file_request(&path, None, Some(status.clone()), true, true));

        let outcome = runner.run_at(&at(9, 20, 0, 0)).await;
        assert_eq!(text(&outcome).as_deref(), Some(CONTENT));
        assert!(matches!(outcome, Outcome::Collected { recorded: false, .. }));
        assert!(path.exists());
        assert!(!file::consumed_path(&path).exists());
        assert!(!status.exists());

        // still collectable afterwards
        let outcome = runner.run_at(&at(9, 20, 30, 0)).await;
        assert!(outcome.payload().is_some());
    }

    #[tokio::test]
    async fn test_move_after_collect() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        fs::write(&path, CONTENT).unwrap();
        let mut runner = Runner::new(file_request(&path, None, None, true, false));

        let outcome = runner.run().await;
        assert_eq!(text(&outcome).as_deref(), Some(CONTENT));
        assert!(!path.exists());
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("app.log.collected")).unwrap(),
            CONTENT
        );

        // moved file is not collected again
        let outcome = runner.run().await;
        assert!(matches!(outcome, Outcome::NothingToCollect));
    }

    #[tokio::test]
    async fn test_missing_file_records_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("not-yet");
        let status = temp_dir.path().join("status");
        let mut runner = Runner::new(file_request(&path, None, Some(status.clone()), false, false));

        let outcome = runner.run_at(&at(9, 20, 0, 0)).await;
        assert!(matches!(outcome, Outcome::NothingToCollect));
        assert!(!status.exists());

        // the file appears later the same day and is collected
        fs::write(&path, CONTENT).unwrap();
        let outcome = runner.run_at(&at(9, 21, 0, 0)).await;
        assert!(matches!(outcome, Outcome::Collected { recorded: true, .. }));
    }

    #[tokio::test]
    async fn test_encoding_error_is_caught() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test");
        let status = temp_dir.path().join("status");
        let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode(CONTENT);
        fs::write(&path, &encoded).unwrap();
        let mut runner = Runner::new(file_request(&path, None, Some(status.clone()), true, false));

        let outcome = runner.run_at(&at(9, 20, 0, 0)).await;
        assert!(matches!(outcome, Outcome::Failed(Error::Encoding { .. })));
        assert!(path.exists());
        assert!(!status.exists());
    }

    #[tokio::test]
    async fn test_corrupt_status_aborts_attempt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let status = temp_dir.path().join("status");
        fs::write(&path, CONTENT).unwrap();
        fs::write(&status, b"\x04\x08{\x06").unwrap();
        let mut runner = Runner::new(file_request(&path, None, Some(status.clone()), true, false));

        let outcome = runner.run_at(&at(9, 20, 0, 0)).await;
        assert!(matches!(outcome, Outcome::Failed(Error::Storage { .. })));
        assert!(path.exists());
        assert_eq!(fs::read(&status).unwrap(), b"\x04\x08{\x06");
    }

    #[tokio::test]
    async fn test_unrecordable_collection_is_not_emitted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let status = temp_dir.path().join("status");
        let blocker = temp_dir.path().join("status.tmp");
        fs::write(&path, CONTENT).unwrap();
        // the temp file cannot be created over a directory
        fs::create_dir(&blocker).unwrap();
        let mut runner = Runner::new(file_request(&path, Some(20), Some(status.clone()), false, false));

        for minute in [0, 5] {
            let outcome = runner.run_at(&at(9, 20, minute, 0)).await;
            assert!(matches!(outcome, Outcome::Failed(Error::Storage { .. })));
            assert!(outcome.payload().is_none());
            assert!(!status.exists());
            assert!(path.exists());
        }

        // once the status file is writable the next tick collects exactly once
        fs::remove_dir(&blocker).unwrap();
        let outcome = runner.run_at(&at(9, 20, 10, 0)).await;
        assert!(matches!(outcome, Outcome::Collected { recorded: true, .. }));
        assert!(!blocker.exists());

        let outcome = runner.run_at(&at(9, 20, 15, 0)).await;
        assert!(matches!(
            outcome,
            Outcome::GatedOut(GateDecision::AlreadyCollected { .. })
        ));
    }

    #[tokio::test]
    async fn test_renamed_source_is_emitted_when_status_write_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let status = temp_dir.path().join("status");
        fs::write(&path, CONTENT).unwrap();
        fs::create_dir(temp_dir.path().join("status.tmp")).unwrap();
        let mut runner = Runner::new(file_request(&path, None, Some(status.clone()), true, false));

        let outcome = runner.run_at(&at(9, 20, 0, 0)).await;
        assert!(matches!(outcome, Outcome::Collected { recorded: false, .. }));
        assert_eq!(text(&outcome).as_deref(), Some(CONTENT));
        assert!(!path.exists());
        assert!(file::consumed_path(&path).exists());
        assert!(!status.exists());
    }

    #[tokio::test]
    async fn test_rename_failure_still_collects_and_records() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let status = temp_dir.path().join("status");
        fs::write(&path, CONTENT).unwrap();
        // a non-empty directory where the renamed file would go
        let target = file::consumed_path(&path);
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"x").unwrap();
        let mut runner = Runner::new(file_request(&path, None, Some(status.clone()), true, false));

        let outcome = runner.run_at(&at(9, 20, 0, 0)).await;
        assert!(matches!(outcome, Outcome::Collected { recorded: true, .. }));
        assert_eq!(text(&outcome).as_deref(), Some(CONTENT));
        assert!(path.exists());
        assert!(target.is_dir());
        assert!(status.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_output_withheld_when_status_write_fails() {
        let temp_dir = TempDir::new().unwrap();
        let status = temp_dir.path().join("status");
        fs::create_dir(temp_dir.path().join("status.tmp")).unwrap();
        let mut runner = Runner::with_error_sink(
            command_request("echo hello", Some(status.clone())),
            Box::new(SharedBuffer::default()),
        );

        let outcome = runner.run_at(&at(9, 20, 0, 0)).await;
        assert!(matches!(outcome, Outcome::Failed(Error::Storage { .. })));
        assert!(outcome.payload().is_none());
        assert!(!status.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_echo() {
        let sink = SharedBuffer::default();
        let mut runner = Runner::with_error_sink(
            command_request("echo hello", None),
            Box::new(sink.clone()),
        );

        let outcome = runner.run().await;
        assert_eq!(outcome.payload().map(|p| p.as_bytes().to_vec()), Some(b"hello\n".to_vec()));
        assert!(sink.contents().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_failure_then_retry() {
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("app.log");
        let status = temp_dir.path().join("status");
        let command_line = format!("cat {}", log.display());

        let sink = SharedBuffer::default();
        let mut runner = Runner::with_error_sink(
            command_request(&command_line, Some(status.clone())),
            Box::new(sink.clone()),
        );

        let outcome = runner.run_at(&at(9, 20, 0, 0)).await;
        match &outcome {
            Outcome::Partial { payload, exit_code } => {
                assert!(payload.is_empty());
                assert_eq!(*exit_code, Some(1));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!sink.contents().is_empty());
        assert!(!status.exists());

        // next scheduled tick, the source now exists
        fs::write(&log, "testlog1\ntestlog2\n").unwrap();
        let retry_sink = SharedBuffer::default();
        let mut runner = Runner::with_error_sink(
            command_request(&command_line, Some(status.clone())),
            Box::new(retry_sink.clone()),
        );

        let outcome = runner.run_at(&at(9, 20, 5, 0)).await;
        assert!(matches!(outcome, Outcome::Collected { recorded: true, .. }));
        assert_eq!(text(&outcome).as_deref(), Some("testlog1\ntestlog2\n"));
        assert!(retry_sink.contents().is_empty());
        assert!(status.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout_fails_without_recording() {
        let temp_dir = TempDir::new().unwrap();
        let status = temp_dir.path().join("status");
        let common = CommonArgs {
            positionals: vec!["sleep 30".to_string()],
            status_file: Some(status.clone()),
            ..Default::default()
        };
        let mut request =
            CollectionRequest::for_command(common, None, &DefaultsConfig::default()).unwrap();
        if let SourceSpec::Command { timeout, .. } = &mut request.source {
            *timeout = Some(std::time::Duration::from_millis(200));
        }

        let mut runner = Runner::new(request);
        let outcome = runner.run_at(&at(9, 20, 0, 0)).await;
        assert!(matches!(outcome, Outcome::Failed(Error::Timeout { .. })));
        assert!(!status.exists());
    }
}
