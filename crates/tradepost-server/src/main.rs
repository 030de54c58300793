//! Tradepost server binary.
//!
//! # Usage
//!
//! ```bash
//! # In-memory history (development)
//! tradepost-server --bind 0.0.0.0:8080
//!
//! # Durable history
//! tradepost-server --bind 0.0.0.0:8080 --data /var/lib/tradepost/history.redb
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use tradepost_relay::{ConnectionConfig, DriverConfig, MemoryStore, MessageStore, RedbStore};
use tradepost_server::{Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tradepost chat relay server
#[derive(Parser, Debug)]
#[command(name = "tradepost-server")]
#[command(about = "Real-time chat relay for the Tradepost marketplace")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Path to the redb history database; in-memory history when omitted
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Seconds of silence before an idle connection is closed
    #[arg(long, default_value = "60")]
    idle_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Tradepost relay starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        driver: DriverConfig {
            max_connections: args.max_connections,
            connection: ConnectionConfig {
                idle_timeout: Duration::from_secs(args.idle_timeout_secs),
                ..ConnectionConfig::default()
            },
        },
    };

    match args.data {
        Some(path) => {
            tracing::info!("History persisted at {}", path.display());
            serve(config, RedbStore::open(path)?).await
        },
        None => {
            tracing::warn!("No --data path given - history is lost on restart");
            serve(config, MemoryStore::new()).await
        },
    }
}

async fn serve<S: MessageStore>(
    config: ServerRuntimeConfig,
    store: S,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::bind(config, store).await?;
    tracing::info!("Server listening on {}", server.local_addr()?);
    server.run().await?;
    Ok(())
}
