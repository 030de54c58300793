//! Room router.
//!
//! Maps room keys to the set of subscribed connection ids and resolves
//! fan-out targets. Rooms are created implicitly on first join and dropped
//! when the last subscriber leaves; a room "exists" only by virtue of having
//! subscribers, so looking up an absent room yields an empty set, never an
//! error.
//!
//! The router never decides membership *rights*: any connection may join any
//! room key it knows. Authorization belongs to the HTTP collaborator that
//! handed out the conversation or goal id in the first place.

use std::collections::{HashMap, HashSet};

use tradepost_proto::RoomKey;

use crate::ConnectionId;

/// Room-keyed subscriber sets.
#[derive(Debug, Default)]
pub struct RoomRouter {
    rooms: HashMap<RoomKey, HashSet<ConnectionId>>,
}

impl RoomRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room's subscriber set, creating the room entry
    /// if absent. Idempotent: a second join returns `false` and changes
    /// nothing.
    pub fn join(&mut self, connection_id: ConnectionId, room: RoomKey) -> bool {
        self.rooms.entry(room).or_default().insert(connection_id)
    }

    /// Remove a connection from a room's subscriber set, dropping the room
    /// entry if it becomes empty. Leaving a room one is not in (or that does
    /// not exist) is a no-op returning `false`.
    pub fn leave(&mut self, connection_id: ConnectionId, room: &RoomKey) -> bool {
        let Some(subscribers) = self.rooms.get_mut(room) else {
            return false;
        };

        let removed = subscribers.remove(&connection_id);
        if subscribers.is_empty() {
            self.rooms.remove(room);
        }
        removed
    }

    /// Subscribers of a room. Empty for a room nobody has joined.
    pub fn subscribers(&self, room: &RoomKey) -> impl Iterator<Item = ConnectionId> + '_ {
        self.rooms.get(room).into_iter().flat_map(|s| s.iter().copied())
    }

    /// Whether a connection is subscribed to a room.
    pub fn is_subscribed(&self, connection_id: ConnectionId, room: &RoomKey) -> bool {
        self.rooms.get(room).is_some_and(|s| s.contains(&connection_id))
    }

    /// Number of subscribers in a room.
    pub fn subscriber_count(&self, room: &RoomKey) -> usize {
        self.rooms.get(room).map_or(0, HashSet::len)
    }

    /// Number of live room entries.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
