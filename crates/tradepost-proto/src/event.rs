//! Canonical relay events.
//!
//! One enum per direction. The `type` tag is part of the wire contract with
//! the web clients, so renames here are breaking changes.

use serde::{Deserialize, Serialize};

use crate::room::RoomKey;

/// True when a message body is present: non-blank text or a file reference.
pub fn has_message_body(text: Option<&str>, file: Option<&str>) -> bool {
    text.is_some_and(|t| !t.trim().is_empty()) || file.is_some_and(|f| !f.is_empty())
}

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Subscribe this connection to a direct-chat room.
    #[serde(rename = "join-chat")]
    JoinChat {
        /// Trade-conversation id, used verbatim as the room key.
        room: String,
    },

    /// Unsubscribe from a direct-chat room.
    #[serde(rename = "leave-chat")]
    LeaveChat {
        /// Trade-conversation id.
        room: String,
    },

    /// Relay a chat message to the room's other subscribers.
    #[serde(rename = "chat-message")]
    ChatMessage {
        /// Trade-conversation id.
        room: String,
        /// External user id of the author. Trusted as handed in; the relay
        /// performs no per-message re-authentication.
        sender: String,
        /// Message text, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Uploaded file reference, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },

    /// Subscribe this connection to `forum:<goal>`.
    #[serde(rename = "join-forum")]
    JoinForum {
        /// Community-goal id.
        goal: String,
    },

    /// Unsubscribe from `forum:<goal>`.
    #[serde(rename = "leave-forum")]
    LeaveForum {
        /// Community-goal id.
        goal: String,
    },

    /// Relay a forum post to every subscriber, the sender included.
    #[serde(rename = "forum-message")]
    ForumMessage {
        /// Community-goal id.
        goal: String,
        /// The post itself.
        message: ForumPost,
    },
}

/// A forum post. Unlike chat messages the display name arrives already
/// resolved, so fan-out needs no user lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumPost {
    /// External user id of the author.
    pub sender: String,
    /// Display name as resolved by the client.
    pub display_name: String,
    /// Post text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Uploaded file reference, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl ForumPost {
    /// True when the post carries any body at all.
    pub fn has_body(&self) -> bool {
        has_message_body(self.text.as_deref(), self.file.as_deref())
    }
}

/// Events the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A chat message relayed into a direct-chat room.
    #[serde(rename = "chat-message")]
    ChatMessage {
        /// Room the message belongs to.
        room: RoomKey,
        /// External user id of the author.
        sender: String,
        /// Message text, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Uploaded file reference, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        /// Server-assigned timestamp, Unix milliseconds.
        sent_at_ms: u64,
    },

    /// A forum post relayed into a forum room.
    #[serde(rename = "forum-message")]
    ForumMessage {
        /// Community-goal id.
        goal: String,
        /// The post itself.
        message: ForumPost,
        /// Server-assigned timestamp, Unix milliseconds.
        sent_at_ms: u64,
    },

    /// One event was rejected. The connection and its rooms stay intact.
    #[serde(rename = "error")]
    Error {
        /// Human-readable reason.
        reason: String,
    },
}

/// Wire encoding/decoding failures.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The inbound text frame is not a valid event.
    #[error("malformed event: {0}")]
    Malformed(#[source] serde_json::Error),

    /// An outbound event failed to serialize.
    #[error("event encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ClientEvent {
    /// Decode one inbound text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }
}

impl ServerEvent {
    /// Encode for one outbound text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}
