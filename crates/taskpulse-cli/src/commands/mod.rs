//! CLI command definitions and handlers.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod publish;
pub mod serve;
pub mod watch;

/// Taskpulse - live task feed fan-out
#[derive(Parser)]
#[command(name = "taskpulse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the live fan-out server
    Serve(serve::ServeArgs),

    /// Connect to a server and print live events
    Watch(watch::WatchArgs),

    /// Publish an event through a running server
    Publish(publish::PublishArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve(args) => serve::execute(args).await,
            Commands::Watch(args) => watch::execute(args).await,
            Commands::Publish(args) => publish::execute(args).await,
        }
    }
}
