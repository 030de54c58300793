//! Connection registry.
//!
//! Authoritative table of live connections: one entry per connection id,
//! holding the identity resolved at handshake time and the set of rooms the
//! connection has joined. The room → connections direction lives in the
//! [`RoomRouter`](crate::router::RoomRouter); the registry's per-connection
//! room set exists so a disconnect can cascade into every room membership in
//! one pass.

use std::collections::{HashMap, HashSet};

use tradepost_proto::RoomKey;

use crate::ConnectionId;

/// What the registry knows about one live connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionEntry {
    /// External user id resolved from the authenticated session at handshake
    /// time. `None` for connections whose handshake carried no identity; the
    /// relay still trusts per-message sender fields either way.
    pub user: Option<String>,
}

/// Registry of live connections and their joined rooms.
///
/// Exclusively owns connection entries; the router only ever holds connection
/// ids, and those never outlive the registry's knowledge of the connection.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    connection_rooms: HashMap<ConnectionId, HashSet<RoomKey>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Idempotent: registering an id that is already
    /// present leaves the existing entry untouched and returns `false`.
    pub fn register(&mut self, connection_id: ConnectionId, entry: ConnectionEntry) -> bool {
        if self.connections.contains_key(&connection_id) {
            return false;
        }
        self.connections.insert(connection_id, entry);
        self.connection_rooms.insert(connection_id, HashSet::new());
        true
    }

    /// Remove a connection, returning the rooms it had joined so the caller
    /// can run the router cleanup cascade. A second call for the same id is
    /// a no-op returning `None`.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<HashSet<RoomKey>> {
        self.connections.remove(&connection_id)?;
        Some(self.connection_rooms.remove(&connection_id).unwrap_or_default())
    }

    /// Whether a connection is registered.
    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Entry for a connection. `None` if not registered.
    pub fn entry(&self, connection_id: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(&connection_id)
    }

    /// Record that a connection joined a room.
    ///
    /// Returns `false` (and records nothing) if the connection is unknown,
    /// or if it had already joined the room.
    pub fn note_join(&mut self, connection_id: ConnectionId, room: RoomKey) -> bool {
        match self.connection_rooms.get_mut(&connection_id) {
            Some(rooms) => rooms.insert(room),
            None => false,
        }
    }

    /// Record that a connection left a room. No-op for non-members.
    pub fn note_leave(&mut self, connection_id: ConnectionId, room: &RoomKey) -> bool {
        self.connection_rooms.get_mut(&connection_id).is_some_and(|rooms| rooms.remove(room))
    }

    /// Rooms a connection has joined.
    pub fn rooms_of(&self, connection_id: ConnectionId) -> impl Iterator<Item = &RoomKey> + '_ {
        self.connection_rooms.get(&connection_id).into_iter().flatten()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
