//! Wire vocabulary for the Tradepost real-time relay.
//!
//! Events are JSON text frames, internally tagged by a kebab-case `type`
//! field. JSON was chosen over a binary encoding because every peer is a web
//! client; the payloads are small and self-describing, and the history store
//! shares the same serde types.
//!
//! This crate defines one canonical event set. The legacy entry points
//! carried two slightly different spellings of the join/leave events; those
//! are consolidated here and no aliases are accepted.
//!
//! # Invariants
//!
//! Each inbound event variant maps to exactly one `type` tag, and decoding an
//! encoded event must produce an equivalent value.

pub mod event;
pub mod room;

pub use event::{ClientEvent, ForumPost, ProtocolError, ServerEvent, has_message_body};
pub use room::{RoomKey, RoomKind};
