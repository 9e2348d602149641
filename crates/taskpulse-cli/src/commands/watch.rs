//! Live event watcher.

use anyhow::Result;
use clap::Args;
use std::time::Duration;
use taskpulse_client::ConnectionManager;
use taskpulse_core::config::ClientConfig;
use taskpulse_core::{FeedRouter, UserId};
use tracing::debug;

use crate::output;

#[derive(Args)]
pub struct WatchArgs {
    /// WebSocket URL (default ws://127.0.0.1:3030/ws)
    #[arg(long, env = "TASKPULSE_WS_URL")]
    pub url: Option<String>,

    /// Announce this user id after connecting
    #[arg(long, env = "TASKPULSE_USER_ID")]
    pub user_id: Option<UserId>,

    /// Delay between reconnect attempts, in milliseconds (default 3000)
    #[arg(long, env = "TASKPULSE_RECONNECT_MS")]
    pub reconnect_ms: Option<u64>,
}

pub async fn execute(args: WatchArgs) -> Result<()> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = args.url {
        config.url = url;
    }
    if let Some(user_id) = args.user_id {
        config.user_id = Some(user_id);
    }
    if let Some(ms) = args.reconnect_ms {
        anyhow::ensure!(ms > 0, "--reconnect-ms must be at least 1");
        config.reconnect_delay = Duration::from_millis(ms);
    }

    let me = config.user_id;
    let router = FeedRouter::new();
    let subscriptions = vec![
        router.on_new_task(move |task| {
            if me.is_some() && task.owner_id() == me {
                debug!(task_id = task.id, "Skipping notification for own task");
                return;
            }
            output::print_new_task(task);
        }),
        router.on_status_update(output::print_status_update),
        router.on_like(output::print_like),
    ];

    let manager = ConnectionManager::from_config(&config, router);
    output::print_watch_banner(&config.url, me);

    let mut states = manager.watch_state();
    let state_printer = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            output::print_session_state(state);
        }
    });

    manager.connect().await;
    tokio::signal::ctrl_c().await?;

    manager.disconnect().await;
    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    state_printer.abort();
    Ok(())
}
