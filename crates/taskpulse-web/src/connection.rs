//! Server-side connection handle.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::Utf8Bytes;
use parking_lot::Mutex;
use taskpulse_core::UserId;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", &self.0.simple().to_string()[..8])
    }
}

/// Liveness of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Per-connection send failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    #[error("send queue full for connection {0}")]
    Full(ConnectionId),
}

/// One live WebSocket client.
///
/// Frames are queued on a bounded channel drained by the socket's send
/// task; the handle itself never touches the socket.
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<Utf8Bytes>,
    state: AtomicU8,
    user_id: Mutex<Option<UserId>>,
    connected_at: Instant,
    dropped_frames: AtomicU64,
}

impl Connection {
    /// Create an open connection with a fresh id.
    pub fn new(tx: mpsc::Sender<Utf8Bytes>) -> Self {
        Self {
            id: ConnectionId::new(),
            tx,
            state: AtomicU8::new(ConnectionState::Open as u8),
            user_id: Mutex::new(None),
            connected_at: Instant::now(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Create an open connection along with the receiving end of its queue.
    pub fn open(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(tx)), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Move OPEN → CLOSING. No effect on an already closed connection.
    pub fn begin_close(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Open as u8,
            ConnectionState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn mark_closed(&self) {
        self.state.store(ConnectionState::Closed as u8, Ordering::Release);
    }

    /// Record the identity announced by the client's handshake.
    pub fn identify(&self, user_id: UserId) {
        *self.user_id.lock() = Some(user_id);
    }

    pub fn user_id(&self) -> Option<UserId> {
        *self.user_id.lock()
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Frames that could not be queued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Queue a text frame without waiting.
    ///
    /// Fails if the connection is not open, its queue is full, or the send
    /// task has gone away (which also marks the connection closed).
    pub fn send(&self, frame: Utf8Bytes) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed(self.id));
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Err(SendError::Full(self.id))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                self.mark_closed();
                Err(SendError::Closed(self.id))
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("user_id", &self.user_id())
            .finish()
    }
}
