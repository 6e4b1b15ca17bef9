//! Command source
//!
//! Runs an externally configured command line through the host shell
//! (`sh -c` on Unix, `cmd /C` on Windows) and captures its output. The
//! command line comes from trusted configuration, never from end-user input;
//! pipes and redirections are passed to the shell as-is.
//!
//! A non-zero exit status is not an error at this level. The caller decides
//! what a failed run means and uses [`report`] to make it visible.

use std::io::{self, Write};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Everything a finished command produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output
    pub stdout: Vec<u8>,

    /// Captured standard error
    pub stderr: Vec<u8>,

    /// Exit code, `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The failure this output represents, if any
    pub fn failure(&self, command_line: &str) -> Option<Error> {
        if self.success() {
            return None;
        }
        Some(Error::CommandFailure {
            command: command_line.to_string(),
            exit_code: self.exit_code,
        })
    }
}

#[cfg(not(windows))]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(command_line);
    command
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(command_line);
    command
}

/// Run `command_line` and wait for it to finish
///
/// Without a timeout this waits for as long as the command runs. With one,
/// the child is killed once the limit passes and [`Error::Timeout`] is
/// returned. Failing to start the shell at all yields
/// [`Error::SourceUnavailable`].
pub async fn run_source(command_line: &str, timeout: Option<Duration>) -> Result<CommandOutput> {
    let mut command = shell_command(command_line);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| Error::source_unavailable(command_line, e.to_string()))?;

    tracing::debug!(command = command_line, pid = ?child.id(), "Command started");

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout {
                command: command_line.to_string(),
                secs: limit.as_secs(),
            })??,
        None => child.wait_with_output().await?,
    };

    let output = CommandOutput {
        stdout: output.stdout,
        stderr: output.stderr,
        exit_code: output.status.code(),
    };

    tracing::debug!(
        command = command_line,
        exit_code = ?output.exit_code,
        stdout_bytes = output.stdout.len(),
        stderr_bytes = output.stderr.len(),
        "Command finished"
    );
    Ok(output)
}

/// Make a command's failure visible without failing the collection
///
/// A non-zero exit is logged with the command and its exit code; any stderr
/// text is forwarded verbatim to `sink`, whatever the exit status.
pub fn report(output: &CommandOutput, command_line: &str, sink: &mut dyn Write) -> io::Result<()> {
    if let Some(failure) = output.failure(command_line) {
        tracing::error!(
            command = command_line,
            exit_code = ?output.exit_code,
            "{failure}"
        );
    }

    if !output.stderr.is_empty() {
        sink.write_all(&output.stderr)?;
        if !output.stderr.ends_with(b"\n") {
            sink.write_all(b"\n")?;
        }
        sink.flush()?;
    }

    Ok(())
}
