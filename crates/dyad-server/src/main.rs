//! # dyad-server
//!
//! One-on-one realtime chat server.
//!
//! This binary provides:
//! - **Realtime core** over WebSocket: per-user connection registry,
//!   per-conversation event rooms, and an event router that persists
//!   messages before fanning them out (typing indicators, presence, and
//!   read receipts included)
//! - **REST API** (axum) for registration, login, conversation/message
//!   fetches, and user search
//! - **SQLite persistence** via `dyad-store` as the system of record

mod api;
mod auth;
mod config;
mod error;
mod realtime;
mod registry;
mod rooms;
mod views;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dyad_store::Database;

use crate::api::AppState;
use crate::auth::TokenService;
use crate::config::ServerConfig;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomMultiplexer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dyad_server=debug")),
        )
        .init();

    info!("Starting Dyad chat server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        addr = %config.http_addr,
        database = %config.database_path.display(),
        token_ttl_secs = config.token_ttl_secs,
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    let tokens = TokenService::new(&config.jwt_secret, config.token_ttl_secs);

    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        tokens,
        registry: Arc::new(ConnectionRegistry::new()),
        rooms: Arc::new(RoomMultiplexer::new()),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Run the server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
