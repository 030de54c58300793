//! Relay driver.
//!
//! Ties together the connection lifecycle machines, the connection registry,
//! the room router, and the message relay. Events come in from the runtime,
//! actions come out for the runtime to execute; the driver itself performs no
//! I/O, which is what makes the relay testable without a transport.
//!
//! All shared mutable state (registry, router, lifecycle machines) is owned
//! here and the driver is driven from a single task, so mutations never
//! interleave mid-event. If the process is scaled horizontally, each instance
//! has its own driver and a message reaches only subscribers connected to the
//! same process; that is a known limitation, not something this layer papers
//! over.

use std::collections::HashMap;

use tradepost_proto::{ClientEvent, RoomKey, ServerEvent};

use crate::{
    ConnectionId,
    connection::{Connection, ConnectionConfig, ConnectionState},
    env::Environment,
    registry::{ConnectionEntry, ConnectionRegistry},
    relay::{Delivery, MessageRelay},
    router::RoomRouter,
};

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Per-connection lifecycle configuration (timeouts).
    pub connection: ConnectionConfig,
    /// Maximum concurrent connections; connections beyond the cap are closed
    /// during accept and never registered.
    pub max_connections: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { connection: ConnectionConfig::default(), max_connections: 10_000 }
    }
}

/// Events the driver processes, produced by the runtime.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A connection started its transport handshake.
    ///
    /// The connection is tracked (so a stalled handshake can time out) but
    /// not registered; registration happens at
    /// [`RelayEvent::ConnectionEstablished`].
    ConnectionOpened {
        /// Id assigned by the runtime.
        connection_id: ConnectionId,
    },

    /// A connection finished its transport handshake.
    ConnectionEstablished {
        /// Id assigned at [`RelayEvent::ConnectionOpened`].
        connection_id: ConnectionId,
        /// Identity resolved from the authenticated session, if any.
        user: Option<String>,
    },

    /// A decoded event arrived from a connection.
    EventReceived {
        /// Originating connection.
        connection_id: ConnectionId,
        /// The event.
        event: ClientEvent,
    },

    /// A connection's transport closed (peer, error, or executed `Close`).
    ConnectionClosed {
        /// The connection that closed.
        connection_id: ConnectionId,
        /// Why.
        reason: String,
    },

    /// Periodic timeout sweep.
    Tick,
}

/// Actions the driver produces, executed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Send one event to one connection.
    Send {
        /// Target connection.
        connection_id: ConnectionId,
        /// Event to send.
        event: ServerEvent,
    },

    /// Deliver one event to a room's current subscribers.
    ///
    /// The runtime resolves the subscriber set at execution time via
    /// [`RelayDriver::subscribers`]; a connection mid-disconnect simply drops
    /// out of the set and misses the event (delivery is best-effort).
    Broadcast {
        /// Room whose subscribers receive the event.
        room: RoomKey,
        /// Event to deliver.
        event: ServerEvent,
        /// Connection excluded from delivery, if any.
        exclude: Option<ConnectionId>,
    },

    /// Close a connection's transport.
    Close {
        /// Connection to close.
        connection_id: ConnectionId,
        /// Why.
        reason: String,
    },
}

/// Event-in/actions-out orchestrator for the relay.
///
/// Explicitly constructed and owned by one runtime task; there is no global
/// instance and no lazy initialization.
pub struct RelayDriver<E: Environment> {
    /// Lifecycle machine per live connection.
    connections: HashMap<ConnectionId, Connection<E::Instant>>,
    registry: ConnectionRegistry,
    router: RoomRouter,
    relay: MessageRelay,
    env: E,
    config: DriverConfig,
}

impl<E: Environment> RelayDriver<E> {
    /// Create a driver.
    pub fn new(env: E, config: DriverConfig) -> Self {
        Self {
            connections: HashMap::new(),
            registry: ConnectionRegistry::new(),
            router: RoomRouter::new(),
            relay: MessageRelay::new(),
            env,
            config,
        }
    }

    /// Process one event. Never fails: bad inputs are rejected-and-continued,
    /// affecting at most the connection that caused them.
    pub fn process_event(&mut self, event: RelayEvent) -> Vec<RelayAction> {
        match event {
            RelayEvent::ConnectionOpened { connection_id } => self.handle_opened(connection_id),
            RelayEvent::ConnectionEstablished { connection_id, user } => {
                self.handle_established(connection_id, user)
            },
            RelayEvent::EventReceived { connection_id, event } => {
                self.handle_event(connection_id, event)
            },
            RelayEvent::ConnectionClosed { connection_id, reason } => {
                self.handle_closed(connection_id, &reason)
            },
            RelayEvent::Tick => self.handle_tick(),
        }
    }

    fn handle_opened(&mut self, connection_id: ConnectionId) -> Vec<RelayAction> {
        let now = self.env.now();

        if self.connections.len() >= self.config.max_connections {
            tracing::warn!(connection_id, "connection limit reached, refusing");
            return vec![RelayAction::Close {
                connection_id,
                reason: "max connections exceeded".to_string(),
            }];
        }

        if self.connections.contains_key(&connection_id) {
            // Id collision with a live connection; keep the existing session.
            tracing::warn!(connection_id, "duplicate connection id ignored");
            return Vec::new();
        }

        // Tracked but not registered: a handshake that stalls here is swept
        // by the tick loop and never becomes visible to the registry.
        let conn = Connection::new(now, self.config.connection.clone());
        self.connections.insert(connection_id, conn);

        tracing::debug!(connection_id, "connection opened");
        Vec::new()
    }

    fn handle_established(
        &mut self,
        connection_id: ConnectionId,
        user: Option<String>,
    ) -> Vec<RelayAction> {
        let now = self.env.now();

        let Some(conn) = self.connections.get_mut(&connection_id) else {
            // The handshake window expired before the upgrade completed.
            tracing::warn!(connection_id, "establish for unknown connection");
            return vec![RelayAction::Close {
                connection_id,
                reason: "connection not open".to_string(),
            }];
        };

        if let Err(err) = conn.establish(now) {
            tracing::warn!(connection_id, %err, "establish rejected");
            return vec![RelayAction::Close {
                connection_id,
                reason: "handshake out of order".to_string(),
            }];
        }

        self.registry.register(connection_id, ConnectionEntry { user });

        tracing::debug!(connection_id, "connection established");
        Vec::new()
    }

    fn handle_event(&mut self, connection_id: ConnectionId, event: ClientEvent) -> Vec<RelayAction> {
        let now = self.env.now();

        let Some(conn) = self.connections.get_mut(&connection_id) else {
            // Non-fatal: the connection raced its own teardown.
            tracing::warn!(connection_id, "event from unknown connection dropped");
            return Vec::new();
        };
        conn.update_activity(now);

        match event {
            ClientEvent::JoinChat { room } => {
                self.join(connection_id, RoomKey::chat(room));
                Vec::new()
            },
            ClientEvent::LeaveChat { room } => {
                self.leave(connection_id, &RoomKey::chat(room));
                Vec::new()
            },
            ClientEvent::JoinForum { goal } => {
                self.join(connection_id, RoomKey::forum(&goal));
                Vec::new()
            },
            ClientEvent::LeaveForum { goal } => {
                self.leave(connection_id, &RoomKey::forum(&goal));
                Vec::new()
            },
            ClientEvent::ChatMessage { room, sender, text, file } => {
                let prepared = self.relay.prepare_chat(
                    &room,
                    sender,
                    text,
                    file,
                    self.env.wall_clock_ms(),
                );
                self.dispatch(connection_id, prepared)
            },
            ClientEvent::ForumMessage { goal, message } => {
                let prepared = self.relay.prepare_forum(&goal, message, self.env.wall_clock_ms());
                self.dispatch(connection_id, prepared)
            },
        }
    }

    /// Turn a relay outcome into actions: fan-out on success, an error event
    /// to the sender alone on rejection.
    fn dispatch(
        &self,
        sender: ConnectionId,
        prepared: Result<Delivery, crate::error::RelayError>,
    ) -> Vec<RelayAction> {
        match prepared {
            Ok(delivery) => {
                let exclude = delivery.exclude_sender.then_some(sender);
                vec![RelayAction::Broadcast { room: delivery.room, event: delivery.event, exclude }]
            },
            Err(err) => {
                tracing::warn!(connection_id = sender, %err, "message event rejected");
                vec![RelayAction::Send {
                    connection_id: sender,
                    event: ServerEvent::Error { reason: err.to_string() },
                }]
            },
        }
    }

    fn handle_closed(&mut self, connection_id: ConnectionId, reason: &str) -> Vec<RelayAction> {
        if let Some(mut conn) = self.connections.remove(&connection_id) {
            if conn.state() == ConnectionState::Connecting {
                conn.abort();
            } else {
                conn.begin_disconnect();
                conn.close();
            }
        }

        // The cascade: every room the connection was in loses it, and rooms
        // emptied by that are dropped. All within this one call, so no
        // partial membership is ever observable.
        if let Some(rooms) = self.registry.unregister(connection_id) {
            for room in &rooms {
                self.router.leave(connection_id, room);
            }
            tracing::info!(connection_id, reason, rooms = rooms.len(), "connection closed");
        }

        Vec::new()
    }

    fn handle_tick(&mut self) -> Vec<RelayAction> {
        let now = self.env.now();
        let mut actions = Vec::new();

        for (&connection_id, conn) in &mut self.connections {
            if let Some(reason) = conn.tick(now) {
                tracing::debug!(connection_id, reason, "connection timed out");
                actions.push(RelayAction::Close { connection_id, reason });
            }
        }

        actions
    }

    fn join(&mut self, connection_id: ConnectionId, room: RoomKey) {
        if !self.registry.note_join(connection_id, room.clone()) {
            // Already joined, or unknown connection; either way idempotent.
            return;
        }
        self.router.join(connection_id, room.clone());
        tracing::debug!(connection_id, room = %room, "joined room");
    }

    fn leave(&mut self, connection_id: ConnectionId, room: &RoomKey) {
        if self.registry.note_leave(connection_id, room) {
            self.router.leave(connection_id, room);
            tracing::debug!(connection_id, room = %room, "left room");
        }
    }

    /// Current subscribers of a room, for broadcast execution.
    pub fn subscribers(&self, room: &RoomKey) -> impl Iterator<Item = ConnectionId> + '_ {
        self.router.subscribers(room)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of rooms with at least one subscriber.
    pub fn room_count(&self) -> usize {
        self.router.room_count()
    }

    /// Whether a connection is subscribed to a room.
    pub fn is_subscribed(&self, connection_id: ConnectionId, room: &RoomKey) -> bool {
        self.router.is_subscribed(connection_id, room)
    }
}

impl<E: Environment> std::fmt::Debug for RelayDriver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayDriver")
            .field("connection_count", &self.connections.len())
            .field("room_count", &self.router.room_count())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };

    use super::*;

    /// Deterministic environment with a manually advanced clock.
    #[derive(Clone)]
    struct TestEnv {
        base: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self { base: Instant::now(), offset: Arc::new(Mutex::new(Duration::ZERO)) }
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }

        fn wall_clock_ms(&self) -> u64 {
            1_700_000_000_000 + self.offset.lock().unwrap().as_millis() as u64
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = i as u8;
            }
        }
    }

    fn driver() -> RelayDriver<TestEnv> {
        RelayDriver::new(TestEnv::new(), DriverConfig::default())
    }

    fn open(driver: &mut RelayDriver<TestEnv>, id: ConnectionId) {
        let actions = driver.process_event(RelayEvent::ConnectionOpened { connection_id: id });
        assert!(actions.is_empty());
        let actions = driver
            .process_event(RelayEvent::ConnectionEstablished { connection_id: id, user: None });
        assert!(actions.is_empty());
    }

    fn join_chat(driver: &mut RelayDriver<TestEnv>, id: ConnectionId, room: &str) {
        driver.process_event(RelayEvent::EventReceived {
            connection_id: id,
            event: ClientEvent::JoinChat { room: room.to_string() },
        });
    }

    fn send_chat(driver: &mut RelayDriver<TestEnv>, id: ConnectionId, room: &str, text: &str) -> Vec<RelayAction> {
        driver.process_event(RelayEvent::EventReceived {
            connection_id: id,
            event: ClientEvent::ChatMessage {
                room: room.to_string(),
                sender: format!("user-{id}"),
                text: Some(text.to_string()),
                file: None,
            },
        })
    }

    #[test]
    fn chat_broadcast_excludes_sender() {
        let mut d = driver();
        open(&mut d, 1);
        open(&mut d, 2);
        join_chat(&mut d, 1, "trade-42");
        join_chat(&mut d, 2, "trade-42");

        let actions = send_chat(&mut d, 1, "trade-42", "hi");
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            RelayAction::Broadcast { room, exclude, .. } => {
                assert_eq!(*room, RoomKey::chat("trade-42"));
                assert_eq!(*exclude, Some(1));
            },
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn forum_broadcast_includes_sender() {
        let mut d = driver();
        open(&mut d, 1);
        d.process_event(RelayEvent::EventReceived {
            connection_id: 1,
            event: ClientEvent::JoinForum { goal: "goal-7".to_string() },
        });

        let actions = d.process_event(RelayEvent::EventReceived {
            connection_id: 1,
            event: ClientEvent::ForumMessage {
                goal: "goal-7".to_string(),
                message: tradepost_proto::ForumPost {
                    sender: "user-1".to_string(),
                    display_name: "Avery".to_string(),
                    text: Some("hello".to_string()),
                    file: None,
                },
            },
        });

        assert_eq!(actions.len(), 1);
        match &actions[0] {
            RelayAction::Broadcast { room, exclude, .. } => {
                assert_eq!(*room, RoomKey::forum("goal-7"));
                assert_eq!(*exclude, None);
            },
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn invalid_payload_gets_error_event_and_no_broadcast() {
        let mut d = driver();
        open(&mut d, 1);
        open(&mut d, 2);
        join_chat(&mut d, 1, "trade-42");
        join_chat(&mut d, 2, "trade-42");

        let actions = d.process_event(RelayEvent::EventReceived {
            connection_id: 1,
            event: ClientEvent::ChatMessage {
                room: "trade-42".to_string(),
                sender: "user-1".to_string(),
                text: None,
                file: None,
            },
        });

        assert_eq!(actions.len(), 1);
        match &actions[0] {
            RelayAction::Send { connection_id, event } => {
                assert_eq!(*connection_id, 1);
                assert!(matches!(event, ServerEvent::Error { .. }));
            },
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn disconnect_cascades_into_every_room() {
        let mut d = driver();
        open(&mut d, 1);
        open(&mut d, 2);
        join_chat(&mut d, 1, "trade-a");
        join_chat(&mut d, 1, "trade-b");
        join_chat(&mut d, 2, "trade-a");

        d.process_event(RelayEvent::ConnectionClosed {
            connection_id: 1,
            reason: "peer closed".to_string(),
        });

        assert!(!d.is_subscribed(1, &RoomKey::chat("trade-a")));
        assert!(!d.is_subscribed(1, &RoomKey::chat("trade-b")));
        // trade-b emptied out entirely; trade-a still has connection 2.
        assert_eq!(d.room_count(), 1);
        assert_eq!(d.connection_count(), 1);
    }

    #[test]
    fn message_to_empty_room_is_a_noop_broadcast() {
        let mut d = driver();
        open(&mut d, 1);

        // Sending into a room nobody joined is not an error.
        let actions = send_chat(&mut d, 1, "trade-nowhere", "anyone?");
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            RelayAction::Broadcast { room, .. } => {
                assert_eq!(d.subscribers(room).count(), 0);
            },
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn event_from_unknown_connection_is_dropped() {
        let mut d = driver();
        let actions = send_chat(&mut d, 99, "trade-42", "ghost");
        assert!(actions.is_empty());
    }

    #[test]
    fn max_connections_refuses_with_close() {
        let mut d = RelayDriver::new(
            TestEnv::new(),
            DriverConfig { max_connections: 1, ..DriverConfig::default() },
        );
        open(&mut d, 1);

        let actions = d.process_event(RelayEvent::ConnectionOpened { connection_id: 2 });
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], RelayAction::Close { connection_id: 2, .. }));
        assert_eq!(d.connection_count(), 1);
    }

    #[test]
    fn stalled_handshake_times_out_on_tick() {
        let env = TestEnv::new();
        let mut d = RelayDriver::new(env.clone(), DriverConfig::default());
        d.process_event(RelayEvent::ConnectionOpened { connection_id: 1 });

        env.advance(Duration::from_secs(11));
        let actions = d.process_event(RelayEvent::Tick);

        assert_eq!(actions.len(), 1);
        match &actions[0] {
            RelayAction::Close { connection_id, reason } => {
                assert_eq!(*connection_id, 1);
                assert!(reason.contains("handshake timeout"), "reason: {reason}");
            },
            other => panic!("unexpected action: {other:?}"),
        }

        d.process_event(RelayEvent::ConnectionClosed {
            connection_id: 1,
            reason: "handshake timeout".to_string(),
        });
        assert_eq!(d.connection_count(), 0);
    }

    #[test]
    fn establish_without_open_is_refused() {
        let mut d = driver();
        let actions =
            d.process_event(RelayEvent::ConnectionEstablished { connection_id: 7, user: None });
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], RelayAction::Close { connection_id: 7, .. }));
    }

    #[test]
    fn join_before_establish_does_not_subscribe() {
        let mut d = driver();
        d.process_event(RelayEvent::ConnectionOpened { connection_id: 1 });
        join_chat(&mut d, 1, "trade-42");

        assert!(!d.is_subscribed(1, &RoomKey::chat("trade-42")));
        assert_eq!(d.room_count(), 0);
    }

    #[test]
    fn idle_connection_times_out_on_tick() {
        let env = TestEnv::new();
        let mut d = RelayDriver::new(env.clone(), DriverConfig::default());
        open(&mut d, 1);
        open(&mut d, 2);

        // Keep connection 2 chatty.
        env.advance(Duration::from_secs(45));
        join_chat(&mut d, 2, "trade-42");

        env.advance(Duration::from_secs(30));
        let actions = d.process_event(RelayEvent::Tick);

        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], RelayAction::Close { connection_id: 1, .. }));
    }

    #[test]
    fn join_is_idempotent_through_the_driver() {
        let mut d = driver();
        open(&mut d, 1);
        join_chat(&mut d, 1, "trade-42");
        join_chat(&mut d, 1, "trade-42");

        let subscribers: Vec<_> = d.subscribers(&RoomKey::chat("trade-42")).collect();
        assert_eq!(subscribers, vec![1]);
    }
}
