//! Live event model and wire envelopes.
//!
//! Server → client frames are `{"event": <KIND>, "data": <payload>}`;
//! client → server frames are `{"type": "auth", "userId": <id>}`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::router::{EventRouter, Subscription};

/// User identifier as issued by the CRUD layer.
pub type UserId = i64;

/// Event tag, as it appears in the `event` field of the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "NEW_TASK")]
    NewTask,
    #[serde(rename = "TASK_STATUS_UPDATE")]
    TaskStatusUpdate,
    #[serde(rename = "LIKE")]
    Like,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [EventKind; 3] = [Self::NewTask, Self::TaskStatusUpdate, Self::Like];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewTask => "NEW_TASK",
            Self::TaskStatusUpdate => "TASK_STATUS_UPDATE",
            Self::Like => "LIKE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "NEW_TASK" => Ok(Self::NewTask),
            "TASK_STATUS_UPDATE" | "STATUS" => Ok(Self::TaskStatusUpdate),
            "LIKE" => Ok(Self::Like),
            other => Err(format!("unknown event kind '{}'", other)),
        }
    }
}

/// Public profile of a task's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Externally visible task representation.
///
/// Only `id` is mandatory; partial updates leave the rest out and absent
/// fields are omitted again on serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Status name owned by the CRUD layer (e.g. `pending`, `completed`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<u64>,
    /// Whether the acting user likes the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked: Option<bool>,
}

impl TaskPayload {
    /// Payload carrying only the task id.
    pub fn with_id(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Id of the owning user, if the payload carries one.
    pub fn owner_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }
}

/// Direction of a like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Like,
    Unlike,
}

impl FromStr for LikeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "like" => Ok(Self::Like),
            "unlike" => Ok(Self::Unlike),
            other => Err(format!("unknown like action '{}'", other)),
        }
    }
}

/// Payload of a `LIKE` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikePayload {
    #[serde(flatten)]
    pub task: TaskPayload,
    pub action: LikeAction,
}

/// A live event, serialized as its own envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Event {
    /// A task was created.
    #[serde(rename = "NEW_TASK")]
    NewTask(TaskPayload),
    /// A task's status changed.
    #[serde(rename = "TASK_STATUS_UPDATE")]
    TaskStatusUpdate(TaskPayload),
    /// A task was liked or unliked.
    #[serde(rename = "LIKE")]
    Like(LikePayload),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NewTask(_) => EventKind::NewTask,
            Self::TaskStatusUpdate(_) => EventKind::TaskStatusUpdate,
            Self::Like(_) => EventKind::Like,
        }
    }

    /// The task the event is about.
    pub fn task(&self) -> &TaskPayload {
        match self {
            Self::NewTask(task) | Self::TaskStatusUpdate(task) => task,
            Self::Like(like) => &like.task,
        }
    }
}

/// Messages a client may send to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Best-effort identity handshake sent after the connection opens.
    Auth {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
}

/// Router specialised for live events.
pub type FeedRouter = EventRouter<EventKind, Event>;

impl FeedRouter {
    /// Subscribe to `NEW_TASK` events with a callback over the task payload.
    pub fn on_new_task<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TaskPayload) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::NewTask, move |event: &Event| {
            if let Event::NewTask(task) = event {
                callback(task);
            }
        })
    }

    /// Subscribe to `TASK_STATUS_UPDATE` events.
    pub fn on_status_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TaskPayload) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::TaskStatusUpdate, move |event: &Event| {
            if let Event::TaskStatusUpdate(task) = event {
                callback(task);
            }
        })
    }

    /// Subscribe to `LIKE` events.
    pub fn on_like<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&LikePayload) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Like, move |event: &Event| {
            if let Event::Like(like) = event {
                callback(like);
            }
        })
    }

    /// Dispatch an event under its own kind.
    pub fn dispatch_event(&self, event: &Event) -> usize {
        self.dispatch(&event.kind(), event)
    }
}
