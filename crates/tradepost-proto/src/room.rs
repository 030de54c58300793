//! Room keys.
//!
//! A room is a routing-only construct identified by a stable string key.
//! Direct-chat rooms use the trade-conversation id as-is; forum rooms are
//! namespaced under `forum:` so a community-goal id can never collide with a
//! conversation id.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix that namespaces forum rooms away from direct-chat rooms.
pub const FORUM_PREFIX: &str = "forum:";

/// The two kinds of room the relay routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    /// Two logical participants (possibly more connections: tabs, devices).
    DirectChat,
    /// Unbounded participants, keyed by a community-goal id.
    Forum,
}

/// Stable string key identifying a room.
///
/// Rooms exist only while subscribed; the key's durable analog is the chat or
/// community-goal document in the external store. The relay never validates
/// that a key refers to a real document - authorization lives with whichever
/// HTTP collaborator handed the key to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    /// Key for a direct-chat room, from a trade-conversation id.
    pub fn chat(conversation_id: impl Into<String>) -> Self {
        Self(conversation_id.into())
    }

    /// Key for a forum room, from a community-goal id.
    pub fn forum(goal_id: &str) -> Self {
        Self(format!("{FORUM_PREFIX}{goal_id}"))
    }

    /// Which kind of room this key addresses.
    pub fn kind(&self) -> RoomKind {
        if self.0.starts_with(FORUM_PREFIX) { RoomKind::Forum } else { RoomKind::DirectChat }
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RoomKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}
