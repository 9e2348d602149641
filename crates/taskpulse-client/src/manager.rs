//! Client connection manager.
//!
//! [`ConnectionManager`] owns at most one live transport. A single driver
//! task runs the session loop:
//!
//! ```text
//! DISCONNECTED -> CONNECTING -> OPEN -> (close/error) -> RECONNECTING
//!                     ^                                      |
//!                     +---------- after fixed delay ---------+
//! ```
//!
//! `disconnect()` cancels the driver from any state, which closes the live
//! transport and drops any pending reconnect timer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use taskpulse_core::config::ClientConfig;
use taskpulse_core::{ClientMessage, Event, FeedRouter, UserId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::{Connector, Transport, WsConnector};

/// Client session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// How a session on one transport ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Closed,
    Cancelled,
}

struct Shared {
    router: FeedRouter,
    state: watch::Sender<SessionState>,
    identity: Mutex<Option<UserId>>,
    reconnect_delay: Duration,
}

impl Shared {
    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "session state changed");
        }
    }

    async fn send_handshake(&self, transport: &mut dyn Transport) {
        let identity = *self.identity.lock();
        let Some(user_id) = identity else {
            debug!("No identity known, skipping auth handshake");
            return;
        };
        let text = match serde_json::to_string(&ClientMessage::Auth { user_id }) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize auth handshake");
                return;
            }
        };
        match transport.send(text).await {
            Ok(()) => debug!(user_id, "Sent auth handshake"),
            Err(e) => warn!(user_id, error = %e, "Failed to send auth handshake"),
        }
    }

    /// Feed inbound frames to the router until the transport ends or the
    /// session is cancelled.
    async fn pump(&self, transport: &mut dyn Transport, cancel: &CancellationToken) -> SessionEnd {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                next = transport.recv() => next,
            };
            match next {
                Some(Ok(text)) => self.handle_text(&text),
                Some(Err(e)) => {
                    warn!(error = %e, "Transport error");
                    return SessionEnd::Closed;
                }
                None => return SessionEnd::Closed,
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<Event>(text) {
            Ok(event) => {
                let invoked = self.router.dispatch_event(&event);
                debug!(event = %event.kind(), task_id = event.task().id, invoked, "Dispatched event");
            }
            Err(e) => {
                warn!(error = %e, len = text.len(), "Dropping malformed message");
            }
        }
    }
}

/// Session loop run by the driver task.
async fn drive(shared: Arc<Shared>, connector: Arc<dyn Connector>, cancel: CancellationToken) {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        shared.set_state(SessionState::Connecting);

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connector.connect() => result,
        };

        match connected {
            Ok(mut transport) => {
                shared.set_state(SessionState::Open);
                info!(attempt, "Live connection open");
                attempt = 0;

                shared.send_handshake(transport.as_mut()).await;
                let end = shared.pump(transport.as_mut(), &cancel).await;
                transport.close().await;

                if end == SessionEnd::Cancelled {
                    break;
                }
                warn!("Live connection lost");
            }
            Err(e) => {
                warn!(attempt, error = %e, "Connection attempt failed");
            }
        }

        shared.set_state(SessionState::Reconnecting);
        info!(
            delay_ms = shared.reconnect_delay.as_millis() as u64,
            "Reconnecting after delay"
        );
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(shared.reconnect_delay) => {}
        }
    }

    shared.set_state(SessionState::Disconnected);
    debug!("Session driver stopped");
}

struct Driver {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Driver {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Session driver ended abnormally");
        }
    }
}

/// Maintains one live connection per process, reconnecting forever.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    driver: tokio::sync::Mutex<Option<Driver>>,
}

impl ConnectionManager {
    /// Create a manager. Nothing happens until [`connect`](Self::connect).
    pub fn new(connector: Arc<dyn Connector>, router: FeedRouter, reconnect_delay: Duration) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                router,
                state,
                identity: Mutex::new(None),
                reconnect_delay,
            }),
            connector,
            driver: tokio::sync::Mutex::new(None),
        }
    }

    /// Create a WebSocket-backed manager from client config.
    pub fn from_config(config: &ClientConfig, router: FeedRouter) -> Self {
        let manager = Self::new(
            Arc::new(WsConnector::new(config.url.clone())),
            router,
            config.reconnect_delay,
        );
        manager.set_identity(config.user_id);
        manager
    }

    /// Router that inbound events are dispatched to.
    pub fn router(&self) -> &FeedRouter {
        &self.shared.router
    }

    /// Identity announced after each successful connect.
    ///
    /// Applies from the next connect; call [`connect`](Self::connect) again
    /// to re-handshake on a live session.
    pub fn set_identity(&self, user_id: Option<UserId>) {
        *self.shared.identity.lock() = user_id;
    }

    pub fn identity(&self) -> Option<UserId> {
        *self.shared.identity.lock()
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// `true` while the session is OPEN.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Start a session, replacing any existing one.
    ///
    /// An existing driver is stopped and its transport closed before the new
    /// attempt begins, so at most one transport is ever live.
    pub async fn connect(&self) {
        let mut slot = self.driver.lock().await;
        if let Some(old) = slot.take() {
            debug!("Replacing existing session");
            old.stop().await;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(drive(
            self.shared.clone(),
            self.connector.clone(),
            cancel.clone(),
        ));
        *slot = Some(Driver { cancel, handle });
    }

    /// Tear the session down from any state.
    ///
    /// Closes the live transport, cancels a pending reconnect and returns
    /// once the driver has exited. No events are dispatched afterwards.
    pub async fn disconnect(&self) {
        let mut slot = self.driver.lock().await;
        if let Some(driver) = slot.take() {
            driver.stop().await;
            info!("Live connection torn down");
        }
        self.shared.set_state(SessionState::Disconnected);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use taskpulse_core::{EventKind, FeedError, FeedResult, LikeAction, LikePayload, TaskPayload};
    use tokio::sync::{mpsc, Notify};
    use tokio::time::Instant;

    const DELAY: Duration = Duration::from_secs(3);

    /// Server side of a mock transport.
    struct MockRemote {
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    struct MockTransport {
        index: usize,
        incoming: mpsc::UnboundedReceiver<String>,
        outgoing: mpsc::UnboundedSender<String>,
        log: Arc<Mutex<Vec<String>>>,
        close_gate: Option<Arc<Notify>>,
        closed: bool,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, text: String) -> FeedResult<()> {
            self.outgoing
                .send(text)
                .map_err(|_| FeedError::transport("peer gone"))
        }

        async fn recv(&mut self) -> Option<FeedResult<String>> {
            self.incoming.recv().await.map(Ok)
        }

        async fn close(&mut self) {
            if let Some(gate) = self.close_gate.take() {
                gate.notified().await;
            }
            if !self.closed {
                self.closed = true;
                self.log.lock().push(format!("close {}", self.index));
            }
        }
    }

    struct MockConnector {
        attempts: AtomicUsize,
        refuse: AtomicBool,
        remotes: mpsc::UnboundedSender<MockRemote>,
        log: Arc<Mutex<Vec<String>>>,
        /// Held by the next transport's `close()` until notified.
        close_gate: Mutex<Option<Arc<Notify>>>,
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self) -> FeedResult<Box<dyn Transport>> {
            let index = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.refuse.load(Ordering::SeqCst) {
                self.log.lock().push(format!("refused {}", index));
                return Err(FeedError::Connect("connection refused".to_string()));
            }
            let (to_client, incoming) = mpsc::unbounded_channel();
            let (outgoing, from_client) = mpsc::unbounded_channel();
            self.log.lock().push(format!("open {}", index));
            let _ = self.remotes.send(MockRemote { to_client, from_client });
            Ok(Box::new(MockTransport {
                index,
                incoming,
                outgoing,
                log: self.log.clone(),
                close_gate: self.close_gate.lock().take(),
                closed: false,
            }))
        }
    }

    struct Harness {
        manager: ConnectionManager,
        connector: Arc<MockConnector>,
        remotes: mpsc::UnboundedReceiver<MockRemote>,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, remotes) = mpsc::unbounded_channel();
            let connector = Arc::new(MockConnector {
                attempts: AtomicUsize::new(0),
                refuse: AtomicBool::new(false),
                remotes: tx,
                log: Arc::new(Mutex::new(Vec::new())),
                close_gate: Mutex::new(None),
            });
            let manager = ConnectionManager::new(connector.clone(), FeedRouter::new(), DELAY);
            Self {
                manager,
                connector,
                remotes,
            }
        }

        fn attempts(&self) -> usize {
            self.connector.attempts.load(Ordering::SeqCst)
        }

        async fn next_remote(&mut self) -> MockRemote {
            self.remotes.recv().await.expect("connector dropped")
        }

        async fn wait_for(&self, target: SessionState) {
            self.manager
                .watch_state()
                .wait_for(|s| *s == target)
                .await
                .expect("state sender dropped");
        }
    }

    fn like_json() -> Value {
        json!({"event": "LIKE", "data": {"id": 7, "likes": 3, "liked": true, "action": "like"}})
    }

    #[tokio::test]
    async fn test_open_sends_auth_handshake() {
        let mut h = Harness::new();
        h.manager.set_identity(Some(5));
        h.manager.connect().await;

        let mut remote = h.next_remote().await;
        let first = remote.from_client.recv().await.unwrap();
        assert_eq!(serde_json::from_str::<Value>(&first).unwrap(), json!({"type": "auth", "userId": 5}));

        h.wait_for(SessionState::Open).await;
        assert!(h.manager.is_connected());
        h.manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_anonymous_session_skips_handshake() {
        let mut h = Harness::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = h.manager.router().on_like(move |like| {
            let _ = tx.send(like.clone());
        });
        h.manager.connect().await;

        let mut remote = h.next_remote().await;
        remote.to_client.send(like_json().to_string()).unwrap();
        rx.recv().await.unwrap();

        assert!(remote.from_client.try_recv().is_err());
        h.manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_inbound_event_reaches_subscriber_exactly() {
        let mut h = Harness::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = h.manager.router().subscribe(EventKind::Like, move |event: &Event| {
            let _ = tx.send(event.clone());
        });
        h.manager.connect().await;

        let remote = h.next_remote().await;
        remote.to_client.send(like_json().to_string()).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(
            received,
            Event::Like(LikePayload {
                task: TaskPayload {
                    likes: Some(3),
                    liked: Some(true),
                    ..TaskPayload::with_id(7)
                },
                action: LikeAction::Like,
            })
        );
        assert_eq!(serde_json::to_value(&received).unwrap(), like_json());
        assert!(rx.try_recv().is_err());
        h.manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_malformed_message_keeps_connection() {
        let mut h = Harness::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = h.manager.router().on_new_task(move |task| {
            let _ = tx.send(task.id);
        });
        h.manager.connect().await;

        let remote = h.next_remote().await;
        remote.to_client.send("{not json".to_string()).unwrap();
        remote
            .to_client
            .send(r#"{"event":"UNKNOWN","data":{"id":1}}"#.to_string())
            .unwrap();
        remote
            .to_client
            .send(r#"{"event":"NEW_TASK","data":{"id":42,"title":"Write spec"}}"#.to_string())
            .unwrap();

        assert_eq!(rx.recv().await, Some(42));
        assert_eq!(h.manager.state(), SessionState::Open);
        assert_eq!(h.attempts(), 1);
        h.manager.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_schedules_single_reconnect_after_delay() {
        let mut h = Harness::new();
        h.manager.connect().await;
        let first = h.next_remote().await;
        h.wait_for(SessionState::Open).await;

        let closed_at = Instant::now();
        drop(first);

        let _second = h.next_remote().await;
        assert!(closed_at.elapsed() >= DELAY);
        assert_eq!(h.attempts(), 2);

        h.wait_for(SessionState::Open).await;
        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(h.attempts(), 2);
        h.manager.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_before_delay_prevents_reconnect() {
        let mut h = Harness::new();
        h.manager.connect().await;
        let first = h.next_remote().await;
        h.wait_for(SessionState::Open).await;

        drop(first);
        h.wait_for(SessionState::Reconnecting).await;
        h.manager.disconnect().await;

        tokio::time::sleep(DELAY * 5).await;
        assert_eq!(h.attempts(), 1);
        assert_eq!(h.manager.state(), SessionState::Disconnected);
        assert!(h.remotes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_closes_previous_transport_first() {
        let mut h = Harness::new();
        h.manager.connect().await;
        let _first = h.next_remote().await;
        h.wait_for(SessionState::Open).await;

        h.manager.connect().await;
        let _second = h.next_remote().await;

        assert_eq!(
            *h.connector.log.lock(),
            vec!["open 1".to_string(), "close 1".to_string(), "open 2".to_string()]
        );
        h.manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_during_disconnect_waits_for_close() {
        let mut h = Harness::new();
        let gate = Arc::new(Notify::new());
        *h.connector.close_gate.lock() = Some(gate.clone());
        h.manager.connect().await;
        let _first = h.next_remote().await;
        h.wait_for(SessionState::Open).await;

        let manager = &h.manager;
        tokio::join!(
            manager.disconnect(),
            async {
                tokio::task::yield_now().await;
                manager.connect().await;
            },
            async {
                for _ in 0..16 {
                    tokio::task::yield_now().await;
                }
                gate.notify_one();
            },
        );

        let _second = h.next_remote().await;
        h.wait_for(SessionState::Open).await;
        assert_eq!(
            *h.connector.log.lock(),
            vec!["open 1".to_string(), "close 1".to_string(), "open 2".to_string()]
        );
        assert!(h.manager.is_connected());
        h.manager.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_connections_retry_until_success() {
        let mut h = Harness::new();
        h.connector.refuse.store(true, Ordering::SeqCst);
        h.manager.connect().await;

        tokio::time::sleep(DELAY * 3 + Duration::from_millis(1)).await;
        assert!(h.attempts() >= 3);
        assert_eq!(h.manager.state(), SessionState::Reconnecting);

        h.connector.refuse.store(false, Ordering::SeqCst);
        let _remote = h.next_remote().await;
        h.wait_for(SessionState::Open).await;
        h.manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_no_dispatch_after_disconnect() {
        let mut h = Harness::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let _sub = h.manager.router().on_like(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        h.manager.connect().await;
        let remote = h.next_remote().await;
        h.wait_for(SessionState::Open).await;

        h.manager.disconnect().await;
        assert!(remote.to_client.send(like_json().to_string()).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.connector.log.lock().last().map(String::as_str), Some("close 1"));
        assert!(!h.manager.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_noop() {
        let h = Harness::new();
        h.manager.disconnect().await;
        h.manager.disconnect().await;
        assert_eq!(h.manager.state(), SessionState::Disconnected);
        assert_eq!(h.attempts(), 0);
    }
}
