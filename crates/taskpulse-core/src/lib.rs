//! Taskpulse Core Library
//!
//! Event model, configuration and the client-side event router shared by
//! the fan-out server and its clients.

pub mod config;
pub mod error;
pub mod event;
pub mod notifier;
pub mod router;

pub use error::{FeedError, FeedResult};
pub use event::{ClientMessage, Event, EventKind, FeedRouter, LikeAction, LikePayload, TaskPayload, UserId, UserSummary};
pub use router::{EventRouter, Subscription};
