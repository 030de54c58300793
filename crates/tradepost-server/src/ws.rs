//! WebSocket transport.
//!
//! One handler per connection: the socket is split, a writer task drains the
//! connection's outbound channel, and the read loop decodes client events
//! and forwards them to the relay task. Everything room-related happens in
//! the relay task; this module only moves frames.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tradepost_proto::{ClientEvent, ServerEvent};
use tradepost_relay::{ConnectionId, Environment, MessageStore};

use crate::{AppState, runtime::RelayHandle};

/// Query parameters of the socket endpoint.
#[derive(Debug, Deserialize)]
pub struct SocketParams {
    /// User id the client identifies as.
    ///
    /// Trusted as-is; the relay performs no room-level authorization, the
    /// surrounding platform gates who can reach this endpoint.
    pub user: Option<String>,
}

/// `GET /socket` upgrade handler.
pub async fn socket_handler<S: MessageStore>(
    State(state): State<AppState<S>>,
    Query(params): Query<SocketParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let connection_id = state.env.random_u64();
    let relay = state.relay.clone();
    // Announced before the upgrade completes; if the client never finishes
    // it, the relay's handshake timeout reclaims the slot.
    relay.open(connection_id);
    ws.on_upgrade(move |socket| serve_socket(socket, relay, connection_id, params.user))
}

async fn serve_socket(
    socket: WebSocket,
    relay: RelayHandle,
    connection_id: ConnectionId,
    user: Option<String>,
) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut inbox) = mpsc::unbounded_channel::<ServerEvent>();

    tracing::debug!(connection_id, user = user.as_deref(), "socket upgraded");
    // The relay task becomes the sole owner of the outbound sender; when it
    // drops the sender (server-side close) the writer below finishes and the
    // socket closes.
    relay.established(connection_id, user, outbound);

    let mut writer = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            match event.encode() {
                Ok(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                },
                Err(err) => {
                    tracing::error!(connection_id, %err, "outbound event failed to encode");
                },
            }
        }
        let _ = sink.close().await;
    });

    // `None` means the writer finished first: the relay closed us.
    let peer_reason = loop {
        tokio::select! {
            _ = &mut writer => break None,
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match ClientEvent::decode(text.as_str()) {
                    Ok(event) => relay.event(connection_id, event),
                    Err(err) => {
                        tracing::debug!(connection_id, %err, "undecodable frame");
                        relay.send_error(connection_id, format!("invalid payload: {err}"));
                    },
                },
                // Binary frames are not part of the protocol; control frames
                // are answered by the websocket layer.
                Some(Ok(Message::Binary(_))) => {
                    relay.send_error(connection_id, "binary frames not supported");
                },
                Some(Ok(Message::Close(_))) | None => break Some("peer closed"),
                Some(Ok(_)) => {},
                Some(Err(err)) => {
                    tracing::debug!(connection_id, %err, "socket read error");
                    break Some("transport error");
                },
            },
        }
    };

    match peer_reason {
        Some(reason) => {
            relay.closed(connection_id, reason);
            // The close report makes the relay drop our sender, finishing
            // the writer.
            let _ = writer.await;
            tracing::debug!(connection_id, reason, "socket finished");
        },
        None => {
            relay.closed(connection_id, "closed by server");
            tracing::debug!(connection_id, "socket closed by server");
        },
    }
}
