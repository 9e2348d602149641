//! Web server command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use taskpulse_core::config::ServerConfig;

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on (default 3030)
    #[arg(long, env = "TASKPULSE_PORT")]
    pub port: Option<u16>,

    /// Host to bind to (default 127.0.0.1)
    #[arg(long, env = "TASKPULSE_HOST")]
    pub host: Option<String>,

    /// Outbound frames buffered per client (default 64)
    #[arg(long, env = "TASKPULSE_CHANNEL_CAPACITY")]
    pub capacity: Option<usize>,

    /// Also write logs to a file
    #[arg(long)]
    pub log: bool,

    /// Log file path (with --log)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(capacity) = args.capacity {
        anyhow::ensure!(capacity > 0, "--capacity must be at least 1");
        config.channel_capacity = capacity;
    }

    println!();
    println!("  {} {}", "Taskpulse".cyan().bold(), "Live Server".bold());
    println!();
    println!("  {}  ws://{}/ws", "WebSocket".green(), config.bind_addr());
    println!(
        "  {}    http://{}/internal/publish",
        "Publish".green(),
        config.bind_addr()
    );
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();

    taskpulse_web::run_server(config).await?;

    Ok(())
}
