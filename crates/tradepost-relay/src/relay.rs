//! Message relay.
//!
//! Validates one inbound message event, stamps it with the server-assigned
//! timestamp, and decides the delivery shape. The relay never touches the
//! router or the store: it turns a payload into a [`Delivery`] and the driver
//! resolves the actual subscriber set. Nothing here persists anything -
//! durable history goes through the HTTP append path, not the fan-out path.

use tradepost_proto::{ForumPost, RoomKey, ServerEvent, has_message_body};

use crate::error::RelayError;

/// A validated, timestamped event ready for fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Room whose subscribers receive the event.
    pub room: RoomKey,
    /// The event to deliver.
    pub event: ServerEvent,
    /// Whether the sender's own connection is excluded from delivery.
    ///
    /// Direct chat excludes the sender (its client already has optimistic
    /// local state); forum rooms include it so every open tab of the sender
    /// converges on the same post list.
    pub exclude_sender: bool,
}

/// Stateless validator/shaper for message events.
///
/// Constructed once and injected into the driver; kept as a value rather
/// than free functions so the delivery rules have a single owner that tests
/// can exercise without a driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageRelay;

impl MessageRelay {
    /// Create a relay.
    pub fn new() -> Self {
        Self
    }

    /// Shape a direct-chat message for fan-out.
    ///
    /// Rejects payloads carrying neither text nor a file reference.
    pub fn prepare_chat(
        &self,
        room: &str,
        sender: String,
        text: Option<String>,
        file: Option<String>,
        sent_at_ms: u64,
    ) -> Result<Delivery, RelayError> {
        if !has_message_body(text.as_deref(), file.as_deref()) {
            return Err(RelayError::InvalidPayload(
                "chat message needs text or a file reference".to_string(),
            ));
        }

        let room = RoomKey::chat(room);
        Ok(Delivery {
            event: ServerEvent::ChatMessage { room: room.clone(), sender, text, file, sent_at_ms },
            room,
            exclude_sender: true,
        })
    }

    /// Shape a forum post for fan-out, sender included.
    ///
    /// Rejects payloads with a blank goal id or an empty message body.
    pub fn prepare_forum(
        &self,
        goal: &str,
        message: ForumPost,
        sent_at_ms: u64,
    ) -> Result<Delivery, RelayError> {
        if goal.trim().is_empty() {
            return Err(RelayError::InvalidPayload("forum message needs a goal id".to_string()));
        }
        if !message.has_body() {
            return Err(RelayError::InvalidPayload(
                "forum message needs text or a file reference".to_string(),
            ));
        }

        Ok(Delivery {
            room: RoomKey::forum(goal),
            event: ServerEvent::ForumMessage { goal: goal.to_string(), message, sent_at_ms },
            exclude_sender: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(text: Option<&str>) -> ForumPost {
        ForumPost {
            sender: "u1".to_string(),
            display_name: "Avery".to_string(),
            text: text.map(str::to_string),
            file: None,
        }
    }

    #[test]
    fn chat_excludes_sender() {
        let relay = MessageRelay::new();
        let delivery = relay
            .prepare_chat("trade-42", "u1".to_string(), Some("hi".to_string()), None, 1_000)
            .unwrap();

        assert!(delivery.exclude_sender);
        assert_eq!(delivery.room, RoomKey::chat("trade-42"));
    }

    #[test]
    fn forum_includes_sender() {
        let relay = MessageRelay::new();
        let delivery = relay.prepare_forum("goal-7", post(Some("hello")), 1_000).unwrap();

        assert!(!delivery.exclude_sender);
        assert_eq!(delivery.room, RoomKey::forum("goal-7"));
    }

    #[test]
    fn chat_without_body_is_invalid() {
        let relay = MessageRelay::new();
        let result = relay.prepare_chat("trade-42", "u1".to_string(), None, None, 1_000);
        assert!(matches!(result, Err(RelayError::InvalidPayload(_))));
    }

    #[test]
    fn chat_with_only_a_file_is_valid() {
        let relay = MessageRelay::new();
        let delivery = relay
            .prepare_chat("trade-42", "u1".to_string(), None, Some("img-9.png".to_string()), 1_000)
            .unwrap();
        assert!(matches!(delivery.event, ServerEvent::ChatMessage { .. }));
    }

    #[test]
    fn forum_without_goal_is_invalid() {
        let relay = MessageRelay::new();
        let result = relay.prepare_forum("  ", post(Some("hello")), 1_000);
        assert!(matches!(result, Err(RelayError::InvalidPayload(_))));
    }

    #[test]
    fn forum_without_body_is_invalid() {
        let relay = MessageRelay::new();
        let result = relay.prepare_forum("goal-7", post(None), 1_000);
        assert!(matches!(result, Err(RelayError::InvalidPayload(_))));
    }

    #[test]
    fn timestamp_is_attached_verbatim() {
        let relay = MessageRelay::new();
        let delivery = relay.prepare_forum("goal-7", post(Some("hello")), 777).unwrap();
        match delivery.event {
            ServerEvent::ForumMessage { sent_at_ms, .. } => assert_eq!(sent_at_ms, 777),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
