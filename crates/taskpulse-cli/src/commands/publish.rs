//! Manual event publishing.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use taskpulse_core::notifier::WebNotifier;
use taskpulse_core::{Event, EventKind, LikeAction, LikePayload, TaskPayload, UserId, UserSummary};

#[derive(Args)]
pub struct PublishArgs {
    /// Event kind (new-task, status, like)
    pub kind: EventKind,

    /// Task ID
    #[arg(long)]
    pub id: i64,

    /// Task title
    #[arg(long)]
    pub title: Option<String>,

    /// Task description
    #[arg(long)]
    pub description: Option<String>,

    /// Task status
    #[arg(long)]
    pub status: Option<String>,

    /// Likes count
    #[arg(long)]
    pub likes: Option<u64>,

    /// Comments count
    #[arg(long)]
    pub comments: Option<u64>,

    /// Liked flag for the acting user
    #[arg(long)]
    pub liked: Option<bool>,

    /// Like action (like, unlike)
    #[arg(long, default_value = "like")]
    pub action: LikeAction,

    /// Owning user's ID
    #[arg(long)]
    pub owner_id: Option<UserId>,

    /// Owning user's name (with --owner-id)
    #[arg(long)]
    pub owner_name: Option<String>,

    /// Server base URL (default http://127.0.0.1:3030)
    #[arg(long, env = "TASKPULSE_WEB_URL")]
    pub url: Option<String>,
}

/// Build the event described by the command line.
fn build_event(args: &PublishArgs) -> Event {
    let user = args.owner_id.map(|id| UserSummary {
        id,
        username: args
            .owner_name
            .clone()
            .unwrap_or_else(|| format!("user{}", id)),
        avatar_url: None,
    });

    let task = TaskPayload {
        id: args.id,
        title: args.title.clone(),
        description: args.description.clone(),
        status: args.status.clone(),
        user,
        likes: args.likes,
        comments: args.comments,
        liked: args.liked,
        ..Default::default()
    };

    match args.kind {
        EventKind::NewTask => Event::NewTask(task),
        EventKind::TaskStatusUpdate => Event::TaskStatusUpdate(task),
        EventKind::Like => Event::Like(LikePayload {
            task,
            action: args.action,
        }),
    }
}

pub async fn execute(args: PublishArgs) -> Result<()> {
    let notifier = match &args.url {
        Some(url) => WebNotifier::with_url(url),
        None => WebNotifier::new(),
    };
    let event = build_event(&args);
    let delivered = notifier.publish(&event).await?;

    println!(
        "{} Published {} for task {} to {} connection(s)",
        "✓".green().bold(),
        event.kind().to_string().cyan(),
        event.task().id,
        delivered
    );
    Ok(())
}
