//! Named connection registry.
//!
//! Maps caller-chosen names to live [`ConnectionHandle`]s so later calls can
//! address a connection without re-specifying host and port. Registration is
//! last-write-wins; a replaced connection is closed so a name never keeps
//! two live connections.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::connection::ConnectionHandle;
use crate::error::{BridgeError, BridgeResult};

/// Concurrent mapping from connection name to handle.
///
/// Cheap to clone; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<HashMap<String, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handle` under `name`, closing any different connection it
    /// replaces.
    pub async fn register(&self, name: impl Into<String>, handle: ConnectionHandle) {
        let name = name.into();
        let mut connections = self.connections.lock().await;
        let new_id = handle.id();
        if let Some(previous) = connections.insert(name.clone(), handle) {
            if previous.id() != new_id {
                log::info!(
                    "[Registry] '{}' replaced connection #{} with #{}",
                    name,
                    previous.id(),
                    new_id
                );
                previous.close();
            }
        } else {
            log::debug!("[Registry] '{}' registered as #{}", name, new_id);
        }
    }

    /// Look up the connection registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownConnection`] if nothing is registered.
    pub async fn lookup(&self, name: &str) -> BridgeResult<ConnectionHandle> {
        let connections = self.connections.lock().await;
        connections
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownConnection(name.to_string()))
    }

    /// Remove and return the connection registered under `name`.
    pub async fn remove(&self, name: &str) -> Option<ConnectionHandle> {
        self.connections.lock().await.remove(name)
    }

    /// Remove `name` only if it still maps to connection `id`.
    ///
    /// Used by a connection's own task on exit, so a newer registration under
    /// the same name survives.
    pub async fn remove_if(&self, name: &str, id: u64) -> bool {
        let mut connections = self.connections.lock().await;
        if connections.get(name).is_some_and(|h| h.id() == id) {
            connections.remove(name);
            log::debug!("[Registry] '{}' unregistered #{}", name, id);
            true
        } else {
            false
        }
    }

    /// Registered names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let connections = self.connections.lock().await;
        let mut names: Vec<String> = connections.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Remove every entry, returning the handles that were registered.
    pub async fn drain(&self) -> Vec<ConnectionHandle> {
        let mut connections = self.connections.lock().await;
        connections.drain().map(|(_, handle)| handle).collect()
    }
}
