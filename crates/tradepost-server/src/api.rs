//! History HTTP surface.
//!
//! Durable history is written and read here, never on the relay fan-out
//! path. The platform's message send flow posts to this API after (not
//! before) handing the message to the socket, so a slow disk delays nobody's
//! delivery.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tradepost_proto::RoomKey;
use tradepost_relay::{Environment, HistoryError, MessageStore, StoredMessage};

use crate::{AppState, error::ServerError};

/// Body of `POST /rooms/{room}/messages`.
#[derive(Debug, Deserialize)]
pub struct NewMessage {
    /// External user id of the author.
    pub sender: String,
    /// Display name, for forum posts.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Message text, if any.
    #[serde(default)]
    pub text: Option<String>,
    /// Attached file reference, if any.
    #[serde(default)]
    pub file: Option<String>,
}

/// Response of `POST /rooms/{room}/messages`.
#[derive(Debug, Serialize)]
pub struct Appended {
    /// Position of the message within the room's history.
    pub position: u64,
    /// Server-assigned send time, milliseconds since the Unix epoch.
    pub sent_at_ms: u64,
}

/// Query parameters of `GET /rooms/{room}/messages`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// 1-based page number.
    #[serde(default)]
    pub page: Option<u64>,
    /// Page size, clamped server-side.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Body of `POST /rooms/{room}/read`.
#[derive(Debug, Deserialize)]
pub struct MarkRead {
    /// User whose counterparty messages become read.
    pub reader: String,
}

/// Response of `POST /rooms/{room}/read`.
#[derive(Debug, Serialize)]
pub struct MarkedRead {
    /// How many messages flipped from unread to read.
    pub updated: usize,
}

/// `POST /rooms/{room}/messages`
pub async fn append_message<S: MessageStore>(
    State(state): State<AppState<S>>,
    Path(room): Path<String>,
    Json(body): Json<NewMessage>,
) -> Result<(StatusCode, Json<Appended>), ApiError> {
    let room = RoomKey::from(room);
    let sent_at_ms = state.env.wall_clock_ms();

    let message = StoredMessage {
        sender: body.sender,
        display_name: body.display_name,
        text: body.text,
        file: body.file,
        sent_at_ms,
        read: false,
    };

    let position = state.history.append(&room, message).map_err(ServerError::from)?;
    Ok((StatusCode::CREATED, Json(Appended { position, sent_at_ms })))
}

/// `GET /rooms/{room}/messages`
pub async fn list_messages<S: MessageStore>(
    State(state): State<AppState<S>>,
    Path(room): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
    let room = RoomKey::from(room);
    let messages =
        state.history.list(&room, query.page, query.limit).map_err(ServerError::from)?;
    Ok(Json(messages))
}

/// `POST /rooms/{room}/read`
pub async fn mark_read<S: MessageStore>(
    State(state): State<AppState<S>>,
    Path(room): Path<String>,
    Json(body): Json<MarkRead>,
) -> Result<Json<MarkedRead>, ApiError> {
    let room = RoomKey::from(room);
    let updated = state.history.mark_read(&room, &body.reader).map_err(ServerError::from)?;
    Ok(Json(MarkedRead { updated }))
}

/// HTTP projection of a [`ServerError`].
#[derive(Debug)]
pub struct ApiError(ServerError);

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServerError::History(HistoryError::InvalidMessage(_)) => StatusCode::BAD_REQUEST,
            ServerError::History(HistoryError::Persistence(_)) | ServerError::Store(_) => {
                tracing::error!(err = %self.0, "history request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            },
            ServerError::Config(_) | ServerError::Transport(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        };

        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
