//! Taskpulse Client
//!
//! Keeps one live connection to the fan-out server per process and feeds
//! incoming events into a [`FeedRouter`](taskpulse_core::FeedRouter).

pub mod manager;
pub mod transport;

pub use manager::{ConnectionManager, SessionState};
pub use transport::{Connector, Transport, WsConnector};
