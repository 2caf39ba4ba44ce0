// Shared connection registry

//! In-memory source of truth for known connections
//!
//! Readers get immutable [`RegistrySnapshot`]s behind an `Arc`. Every write
//! builds a new snapshot and publishes it with a single pointer swap, so no
//! reader can observe a half-applied refresh cycle. Updates address
//! connections by name, never by position. Each publish is also broadcast
//! to subscribers (status bars, the snapshot exporter).
//!
//! Every connection remembers the generation its status was last written
//! in. A status batch read against an older snapshot leaves newer entries
//! (optimistic markers, fresher discovery results) alone.

use crate::types::{Connection, Status};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Buffered publishes per subscriber before it starts lagging
const UPDATE_CHANNEL_SIZE: usize = 64;

/// Immutable view of the registry at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    connections: Vec<Connection>,
    /// Generation each connection's status was last written in, by index
    written: Vec<u64>,
    generation: u64,
}

impl RegistrySnapshot {
    /// Connections in OS priority order
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Publish counter, incremented on every write
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True iff at least one connection is Connected or Connecting
    pub fn any_active(&self) -> bool {
        self.connections.iter().any(|c| c.status.is_active())
    }

    /// True when nothing is known
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of known connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Look up a connection by name
    pub fn get(&self, name: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.name == name)
    }

    /// Generation in which `name`'s status was last written
    pub fn status_generation(&self, name: &str) -> Option<u64> {
        self.connections
            .iter()
            .position(|c| c.name == name)
            .map(|index| self.written[index])
    }

    /// Status of a connection by name
    pub fn status_of(&self, name: &str) -> Option<Status> {
        self.get(name).map(|c| c.status)
    }

    /// First connection in priority order
    pub fn first(&self) -> Option<&Connection> {
        self.connections.first()
    }
}

/// Registry of all known connections
#[derive(Debug)]
pub struct ConnectionRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    updates: broadcast::Sender<Arc<RegistrySnapshot>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_SIZE);
        Self {
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
            updates,
        }
    }

    /// Receive every snapshot published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RegistrySnapshot>> {
        self.updates.subscribe()
    }

    /// Current snapshot (cheap clone of an `Arc`)
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Build the next snapshot from the current one and publish it atomically
    ///
    /// `update` gets the connections, their written generations and the
    /// generation being published; it returns `false` to skip publishing.
    fn publish<F>(&self, update: F) -> Arc<RegistrySnapshot>
    where
        F: FnOnce(&mut Vec<Connection>, &mut Vec<u64>, u64) -> bool,
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);

        let generation = guard.generation + 1;
        let mut connections = guard.connections.clone();
        let mut written = guard.written.clone();
        if !update(&mut connections, &mut written, generation) {
            return guard.clone();
        }

        let next = Arc::new(RegistrySnapshot {
            connections,
            written,
            generation,
        });
        *guard = next.clone();
        // Sent under the lock so subscribers see publishes in order
        let _ = self.updates.send(next.clone());
        next
    }

    /// Drop-and-replace the whole connection set (discovery result)
    pub fn replace_all(&self, connections: Vec<Connection>) -> Arc<RegistrySnapshot> {
        let snapshot = self.publish(|current, written, generation| {
            *written = vec![generation; connections.len()];
            *current = connections;
            true
        });
        log::debug!(
            "Registry replaced: {} connection(s), generation {}",
            snapshot.len(),
            snapshot.generation()
        );
        snapshot
    }

    /// Apply a batch of statuses by name in one publish
    ///
    /// `read_at` is the generation of the snapshot the batch was read
    /// against. Names no longer present, and entries written after
    /// `read_at`, are left untouched.
    pub fn apply_statuses(
        &self,
        statuses: &HashMap<String, Status>,
        read_at: u64,
    ) -> Arc<RegistrySnapshot> {
        self.publish(|current, written, generation| {
            let mut changed = false;
            for (conn, written_at) in current.iter_mut().zip(written.iter_mut()) {
                let Some(status) = statuses.get(&conn.name) else {
                    continue;
                };
                if *written_at > read_at {
                    log::debug!(
                        "Keeping {} for '{}': written after the batch was read",
                        conn.status,
                        conn.name
                    );
                    continue;
                }
                if conn.status != *status {
                    conn.status = *status;
                    *written_at = generation;
                    changed = true;
                }
            }
            changed
        })
    }

    /// Set one connection's status
    ///
    /// Returns the previous status, or `None` if the name is unknown.
    pub fn set_status(&self, name: &str, status: Status) -> Option<Status> {
        let mut previous = None;
        self.publish(|current, written, generation| {
            match current.iter().position(|c| c.name == name) {
                Some(index) => {
                    previous = Some(current[index].status);
                    current[index].status = status;
                    written[index] = generation;
                    true
                }
                None => false,
            }
        });
        previous
    }

    /// Names of known connections, in order
    pub fn names(&self) -> Vec<String> {
        self.snapshot()
            .connections()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }
}
