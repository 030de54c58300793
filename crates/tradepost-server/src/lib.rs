//! Tradepost chat relay server.
//!
//! Production glue that wraps [`tradepost_relay`]'s action-based logic with
//! real I/O: axum serves the WebSocket endpoint and the history API, Tokio
//! runs the relay task, and [`SystemEnv`] supplies real time and
//! cryptographic RNG.
//!
//! # Components
//!
//! - [`RelayHandle`] / [`spawn_relay`]: the single task that owns the
//!   `RelayDriver` and executes its actions
//! - [`Server`]: binds the listener and serves the routes
//! - [`AppState`]: shared handler state (relay handle, history bridge, env)
//! - [`SystemEnv`]: production environment (real time, crypto RNG)
//!
//! # Routes
//!
//! - `GET  /socket` - WebSocket upgrade, `?user=` identifies the client
//! - `POST /rooms/{room}/messages` - persist a message
//! - `GET  /rooms/{room}/messages` - paginated history, oldest first
//! - `POST /rooms/{room}/read` - mark counterparty messages read

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod error;
mod runtime;
mod system_env;
mod ws;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
pub use error::ServerError;
pub use runtime::{RelayCommand, RelayHandle, spawn_relay};
pub use system_env::SystemEnv;
use tokio::net::TcpListener;
use tradepost_relay::{DriverConfig, HistoryBridge, MessageStore};

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState<S: MessageStore> {
    /// Handle to the relay task.
    pub relay: RelayHandle,
    /// Durable history over the configured store.
    pub history: HistoryBridge<S>,
    /// Production environment (ids, timestamps).
    pub env: SystemEnv,
}

/// Build the axum router over the given state.
pub fn app<S: MessageStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/socket", get(ws::socket_handler::<S>))
        .route(
            "/rooms/{room}/messages",
            post(api::append_message::<S>).get(api::list_messages::<S>),
        )
        .route("/rooms/{room}/read", post(api::mark_read::<S>))
        .with_state(state)
}

/// Runtime configuration for [`Server::bind`].
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind, e.g. `0.0.0.0:8080`.
    pub bind_address: String,
    /// Relay driver configuration.
    pub driver: DriverConfig,
}

/// A bound, ready-to-run server.
pub struct Server {
    listener: TcpListener,
    router: Router,
}

impl Server {
    /// Spawn the relay task and bind the listener.
    pub async fn bind<S: MessageStore>(
        config: ServerRuntimeConfig,
        store: S,
    ) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let relay = spawn_relay(env.clone(), config.driver);
        let state = AppState { relay, history: HistoryBridge::new(store), env };

        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            ServerError::Config(format!("cannot bind {}: {e}", config.bind_address))
        })?;

        Ok(Self { listener, router: app(state) })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process is stopped.
    pub async fn run(self) -> Result<(), ServerError> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
