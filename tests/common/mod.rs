//! Common test utilities

use std::process::Command;

/// Log content with both ASCII and Japanese lines
pub const SAMPLE_CONTENT: &str = "sample log\n日本語のログ\n";

/// Command for the built binary, isolated from the caller's logging environment
pub fn logcollect() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_logcollect"));
    command
        .env_remove("RUST_LOG")
        .env_remove("LOGCOLLECT_LOG_LEVEL")
        .env_remove("LOGCOLLECT_LOG_FORMAT");
    command
}
