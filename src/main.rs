use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logcollect::config::{ArgumentError, CollectionRequest, CommonArgs, Config, DefaultsConfig};
use logcollect::runner::Runner;

#[derive(Parser)]
#[command(
    name = "logcollect",
    version,
    about = "Collect a log file or command output at most once per scheduled window",
    long_about = None,
    after_help = "Examples:\n  \
        logcollect file /path/to/file.log --hour 20 --status-file /path/to/status\n  \
        logcollect file /path/to/file.log --hour 20 --move\n  \
        logcollect command 'journalctl -u batch --since yesterday' --status-file /path/to/status"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML file with logging settings and option defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a file and print its content
    File {
        #[command(flatten)]
        common: CommonOpts,

        /// Encoding of the file to collect, such as utf-8, shift_jis [default: shift_jis]
        #[arg(long)]
        encoding: Option<String>,

        /// Rename the file with a `.collected` suffix after collecting it
        #[arg(long = "move")]
        move_after: bool,
    },

    /// Run a shell command and print its standard output
    Command {
        #[command(flatten)]
        common: CommonOpts,

        /// Kill the command if it runs longer than this many seconds [default: wait forever]
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Args)]
struct CommonOpts {
    /// File path or command line to collect from
    #[arg(value_name = "SOURCE")]
    sources: Vec<String>,

    /// Collect only during this hour of the day (0-23)
    #[arg(long, allow_negative_numbers = true)]
    hour: Option<i64>,

    /// Keep the last collection time here to collect at most once a day
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Collect and print, but neither move the file nor update the status file
    #[arg(long)]
    dry_run: bool,
}

impl From<CommonOpts> for CommonArgs {
    fn from(opts: CommonOpts) -> Self {
        Self {
            positionals: opts.sources,
            hour: opts.hour,
            status_file: opts.status_file,
            dry_run: opts.dry_run,
        }
    }
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Command { .. } => "command",
        }
    }

    fn into_request(
        self,
        defaults: &DefaultsConfig,
    ) -> std::result::Result<CollectionRequest, ArgumentError> {
        match self {
            Self::File {
                common,
                encoding,
                move_after,
            } => CollectionRequest::for_file(common.into(), encoding.as_deref(), move_after, defaults),
            Self::Command { common, timeout } => {
                CollectionRequest::for_command(common.into(), timeout, defaults)
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    if let Err(e) = setup_tracing(&log_format, &config.logging.level, cli.verbose) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    let subcommand = cli.command.name();
    let request = match cli.command.into_request(&config.defaults) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("{}", usage(subcommand));
            return ExitCode::FAILURE;
        }
    };

    tracing::debug!(
        source = %request.source_label(),
        hour = ?request.hour,
        status_file = ?request.status_file,
        dry_run = request.dry_run,
        "Starting collection"
    );

    let outcome = Runner::new(request).run().await;

    if let Some(payload) = outcome.payload() {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout
            .write_all(payload.as_bytes())
            .and_then(|()| stdout.flush())
        {
            tracing::error!(error = %e, "Failed to write collected content to stdout");
        }
    }

    ExitCode::SUCCESS
}

fn usage(subcommand: &str) -> String {
    let mut command = Cli::command();
    match command.find_subcommand_mut(subcommand) {
        Some(sub) => sub.render_help().to_string(),
        None => command.render_help().to_string(),
    }
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("logcollect=debug,warn")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(format!("logcollect={level},warn")))?
    };

    // stdout carries the collected content
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        "text" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        other => anyhow::bail!("Unknown log format '{other}', expected text or json"),
    }

    Ok(())
}
