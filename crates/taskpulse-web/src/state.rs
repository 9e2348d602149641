//! Application state.

use std::sync::Arc;

use taskpulse_core::config::ServerConfig;

use crate::broadcast::Broadcaster;
use crate::registry::ConnectionRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub broadcaster: Broadcaster,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let registry = ConnectionRegistry::new();
        let broadcaster = Broadcaster::new(registry.clone());
        Self {
            registry,
            broadcaster,
            config: Arc::new(config),
        }
    }

    /// Handle for the CRUD layer to publish mutations through.
    pub fn broadcaster(&self) -> Broadcaster {
        self.broadcaster.clone()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
