//! Registry of live connections.
//!
//! [`ConnectionRegistry`] is the set the broadcaster fans out over. It holds
//! no event content and does no I/O.

use std::sync::Arc;

use dashmap::DashMap;
use taskpulse_core::UserId;

use crate::connection::{Connection, ConnectionId};

/// Shared set of live connections.
///
/// Cloning is cheap; all clones see the same connections.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns `false` if it was already registered.
    pub fn register(&self, connection: Arc<Connection>) -> bool {
        match self.connections.entry(connection.id()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(connection);
                true
            }
        }
    }

    /// Remove a connection. Safe to call any number of times.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Call `f` for every connection that is OPEN at the moment it is reached.
    ///
    /// Walks a snapshot of ids and holds no map lock while `f` runs, so `f`
    /// may register or unregister connections. Connections removed before
    /// they are reached are skipped. Returns the number of calls made.
    pub fn for_each_open<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&Arc<Connection>),
    {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|entry| *entry.key()).collect();

        let mut visited = 0;
        for id in ids {
            let Some(connection) = self.get(id) else {
                continue;
            };
            if connection.is_open() {
                f(&connection);
                visited += 1;
            }
        }
        visited
    }

    /// Distinct user ids announced by open connections.
    pub fn identified_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .connections
            .iter()
            .filter(|entry| entry.is_open())
            .filter_map(|entry| entry.user_id())
            .collect();
        users.sort_unstable();
        users.dedup();
        users
    }
}
