//! Terminal output formatting.

use colored::{ColoredString, Colorize};
use taskpulse_client::SessionState;
use taskpulse_core::{LikeAction, LikePayload, TaskPayload, UserId};

fn timestamp() -> ColoredString {
    chrono::Local::now().format("%H:%M:%S").to_string().dimmed()
}

fn title(task: &TaskPayload) -> String {
    task.title
        .clone()
        .unwrap_or_else(|| format!("task #{}", task.id))
}

fn owner(task: &TaskPayload) -> String {
    match &task.user {
        Some(user) => format!(" by {}", user.username),
        None => String::new(),
    }
}

/// Print the watcher header.
pub fn print_watch_banner(url: &str, user_id: Option<UserId>) {
    println!();
    println!("  {} {}", "Taskpulse".cyan().bold(), "Live Feed".bold());
    println!();
    println!("  {}  {}", "Server".green(), url);
    match user_id {
        Some(id) => println!("  {}    {}", "User".green(), id),
        None => println!("  {}    {}", "User".green(), "anonymous".dimmed()),
    }
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();
}

pub fn print_new_task(task: &TaskPayload) {
    println!(
        "{} {} {}{}",
        timestamp(),
        "NEW".green().bold(),
        title(task).cyan(),
        owner(task).dimmed()
    );
}

pub fn print_status_update(task: &TaskPayload) {
    let status = task.status.as_deref().unwrap_or("unknown");
    println!(
        "{} {} {} → {}",
        timestamp(),
        "STATUS".yellow().bold(),
        title(task).cyan(),
        status.yellow()
    );
}

pub fn print_like(like: &LikePayload) {
    let verb = match like.action {
        LikeAction::Like => "♥ liked".red(),
        LikeAction::Unlike => "♡ unliked".dimmed(),
    };
    let count = like
        .task
        .likes
        .map(|n| format!(" ({} likes)", n))
        .unwrap_or_default();
    println!(
        "{} {} {}{}",
        timestamp(),
        verb,
        title(&like.task).cyan(),
        count.dimmed()
    );
}

pub fn print_session_state(state: SessionState) {
    let label = match state {
        SessionState::Open => "connected".green(),
        SessionState::Connecting => "connecting…".dimmed(),
        SessionState::Reconnecting => "connection lost, retrying".yellow(),
        SessionState::Disconnected => "disconnected".red(),
    };
    println!("{} {} {}", timestamp(), "●".bold(), label);
}
