//! Event fan-out to connected WebSocket clients.

use axum::extract::ws::Utf8Bytes;
use taskpulse_core::Event;
use tracing::{debug, error, warn};

use crate::connection::Connection;
use crate::registry::ConnectionRegistry;

/// Publishes events to every open connection in a registry.
///
/// Built once at startup and handed to whatever performs mutations; clones
/// share the registry.
#[derive(Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Serialize `event` once and queue the frame on every open connection.
    ///
    /// Returns immediately with the number of connections the frame was
    /// queued for. Failures on individual connections are logged and do not
    /// affect the others.
    pub fn publish(&self, event: &Event) -> usize {
        self.publish_where(event, |_| true)
    }

    /// Like [`publish`](Self::publish), restricted to open connections for
    /// which `include` returns `true`.
    ///
    /// `include` runs once per connection, just before its send, and may
    /// unregister connections; ones removed before they are reached get
    /// nothing.
    pub fn publish_where<F>(&self, event: &Event, mut include: F) -> usize
    where
        F: FnMut(&Connection) -> bool,
    {
        let kind = event.kind();
        let frame: Utf8Bytes = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                error!(event = %kind, error = %e, "failed to serialize event");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut failed = 0;
        self.registry.for_each_open(|conn| {
            if !include(conn.as_ref()) {
                return;
            }
            match conn.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!(conn_id = %conn.id(), event = %kind, error = %e, "failed to send event to client");
                }
            }
        });

        debug!(
            event = %kind,
            task_id = event.task().id,
            delivered,
            failed,
            "broadcast event to all"
        );
        delivered
    }
}
