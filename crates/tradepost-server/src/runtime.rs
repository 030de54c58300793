//! Relay task runtime.
//!
//! One task owns the [`RelayDriver`] and the map of outbound channels, so
//! every registry and router mutation happens on a single task in event
//! order. Transport handlers talk to it through a cloneable [`RelayHandle`];
//! per-connection ordering is preserved because each handler sends its
//! commands over the same queue and deliveries go out over a per-connection
//! channel drained by that connection's writer task.
//!
//! The relay task is the only holder of a connection's outbound sender.
//! Dropping it ends the writer task, which closes the socket; that is how a
//! server-side close (idle timeout, connection cap) is executed.

use std::{collections::HashMap, time::Duration};

use tokio::sync::mpsc;
use tradepost_proto::{ClientEvent, ServerEvent};
use tradepost_relay::{
    ConnectionId, DriverConfig, Environment, RelayAction, RelayDriver, RelayEvent,
};

/// Interval between timeout sweeps.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Commands from transport handlers to the relay task.
#[derive(Debug)]
pub enum RelayCommand {
    /// A WebSocket upgrade was accepted and is in flight.
    Open {
        /// Id the transport assigned to the connection.
        connection_id: ConnectionId,
    },
    /// A WebSocket finished its upgrade.
    Established {
        /// Id announced at [`RelayCommand::Open`].
        connection_id: ConnectionId,
        /// Authenticated user, if the client identified itself.
        user: Option<String>,
        /// Channel draining into the connection's socket writer.
        outbound: mpsc::UnboundedSender<ServerEvent>,
    },
    /// A decoded client event arrived.
    Event {
        /// Originating connection.
        connection_id: ConnectionId,
        /// The event.
        event: ClientEvent,
    },
    /// Report a transport-level rejection back to one client.
    SendError {
        /// Target connection.
        connection_id: ConnectionId,
        /// Human-readable reason.
        reason: String,
    },
    /// The socket closed.
    Closed {
        /// The connection that closed.
        connection_id: ConnectionId,
        /// Why.
        reason: String,
    },
}

/// Cloneable handle to the relay task.
///
/// Sends are fire-and-forget: if the relay task is gone the process is
/// shutting down and there is nobody left to report to.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    commands: mpsc::UnboundedSender<RelayCommand>,
}

impl RelayHandle {
    /// Announce an accepted upgrade before it completes, so a stalled
    /// handshake is swept by the driver's timeout.
    pub fn open(&self, connection_id: ConnectionId) {
        let _ = self.commands.send(RelayCommand::Open { connection_id });
    }

    /// Announce a completed upgrade.
    pub fn established(
        &self,
        connection_id: ConnectionId,
        user: Option<String>,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let _ = self.commands.send(RelayCommand::Established { connection_id, user, outbound });
    }

    /// Forward a decoded client event.
    pub fn event(&self, connection_id: ConnectionId, event: ClientEvent) {
        let _ = self.commands.send(RelayCommand::Event { connection_id, event });
    }

    /// Send an error event to one connection, bypassing the driver.
    ///
    /// Used for frames the transport could not even decode; the driver only
    /// sees well-formed events.
    pub fn send_error(&self, connection_id: ConnectionId, reason: impl Into<String>) {
        let _ =
            self.commands.send(RelayCommand::SendError { connection_id, reason: reason.into() });
    }

    /// Report a closed socket.
    pub fn closed(&self, connection_id: ConnectionId, reason: impl Into<String>) {
        let _ = self.commands.send(RelayCommand::Closed { connection_id, reason: reason.into() });
    }
}

/// Spawn the relay task and return its handle.
pub fn spawn_relay<E: Environment>(env: E, config: DriverConfig) -> RelayHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(relay_task(RelayDriver::new(env, config), rx));
    RelayHandle { commands: tx }
}

async fn relay_task<E: Environment>(
    mut driver: RelayDriver<E>,
    mut commands: mpsc::UnboundedReceiver<RelayCommand>,
) {
    let mut outbounds: HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>> = HashMap::new();
    let mut tick = tokio::time::interval(TICK_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    // All handles dropped; the server is shutting down.
                    break;
                };
                let event = match command {
                    RelayCommand::Open { connection_id } => {
                        RelayEvent::ConnectionOpened { connection_id }
                    },
                    RelayCommand::Established { connection_id, user, outbound } => {
                        // Insert first: if the driver refuses, the resulting
                        // Close action drops this sender and the socket ends.
                        outbounds.insert(connection_id, outbound);
                        RelayEvent::ConnectionEstablished { connection_id, user }
                    },
                    RelayCommand::Event { connection_id, event } => {
                        RelayEvent::EventReceived { connection_id, event }
                    },
                    RelayCommand::SendError { connection_id, reason } => {
                        if let Some(outbound) = outbounds.get(&connection_id) {
                            let _ = outbound.send(ServerEvent::Error { reason });
                        }
                        continue;
                    },
                    RelayCommand::Closed { connection_id, reason } => {
                        outbounds.remove(&connection_id);
                        RelayEvent::ConnectionClosed { connection_id, reason }
                    },
                };
                dispatch(&mut driver, &mut outbounds, event);
            },
            _ = tick.tick() => dispatch(&mut driver, &mut outbounds, RelayEvent::Tick),
        }
    }

    tracing::debug!("relay task stopped");
}

fn dispatch<E: Environment>(
    driver: &mut RelayDriver<E>,
    outbounds: &mut HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
    event: RelayEvent,
) {
    for action in driver.process_event(event) {
        execute(driver, outbounds, action);
    }
}

fn execute<E: Environment>(
    driver: &mut RelayDriver<E>,
    outbounds: &mut HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
    action: RelayAction,
) {
    match action {
        RelayAction::Send { connection_id, event } => {
            if let Some(outbound) = outbounds.get(&connection_id) {
                let _ = outbound.send(event);
            }
        },
        RelayAction::Broadcast { room, event, exclude } => {
            let targets: Vec<ConnectionId> =
                driver.subscribers(&room).filter(|id| Some(*id) != exclude).collect();
            tracing::trace!(room = %room, targets = targets.len(), "broadcast");
            for connection_id in targets {
                if let Some(outbound) = outbounds.get(&connection_id) {
                    // A failed send means the writer task is gone; the
                    // socket close will arrive as its own command.
                    let _ = outbound.send(event.clone());
                }
            }
        },
        RelayAction::Close { connection_id, reason } => {
            // Dropping the outbound sender terminates the connection's
            // writer task, which closes the socket. The driver is told
            // immediately so registry state never outlives the decision;
            // the handler's own close report later is a harmless no-op.
            outbounds.remove(&connection_id);
            dispatch(driver, outbounds, RelayEvent::ConnectionClosed { connection_id, reason });
        },
    }
}
