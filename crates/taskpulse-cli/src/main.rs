//! Taskpulse CLI
//!
//! Runs the live fan-out server, watches the event stream, and publishes
//! events by hand.

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

use commands::{Cli, Commands};

const DEFAULT_FILTER: &str = "taskpulse=info,taskpulse_web=debug,taskpulse_client=info";
const VERBOSE_FILTER: &str =
    "taskpulse=debug,taskpulse_web=debug,taskpulse_client=debug,taskpulse_core=debug";

/// Initialize tracing with optional file logging.
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for the life of the process.
fn init_tracing(log_file: Option<&Path>, verbose: bool) -> Option<WorkerGuard> {
    let default_filter = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return None;
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let _ = std::fs::create_dir_all(dir);
    let file_name = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("taskpulse.log"));

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    // Log to both stdout and file when --log is used
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Serve(args) if args.log => Some(
            args.log_file
                .clone()
                .unwrap_or_else(|| Path::new("logs").join("taskpulse-serve.log")),
        ),
        _ => None,
    };

    let _guard = init_tracing(log_file.as_deref(), cli.verbose);

    cli.execute().await
}
