//! # anonimku-server
//!
//! Backend for AnonimKu, an anonymous one-to-one chat.
//!
//! This binary provides:
//! - **Matchmaking** that pairs online users into private matches without
//!   ever putting anyone in two matches at once
//! - **Conversation storage** with a per-match, ordered message log
//! - **Reveal consent** so both identities are shown only after the partner
//!   agrees
//! - **Change notifications** pushed over WebSocket subscriptions
//! - **Presence leases** that quietly take vanished clients out of the pool

mod api;
mod bus;
mod config;
mod error;
mod presence;
mod service;
mod ws;

use std::sync::Arc;

use anonimku_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::service::Matchmaker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,anonimku_server=debug")),
        )
        .init();

    info!("Starting AnonimKu server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the store and build the service
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    let matchmaker = Matchmaker::new(db, &config)?;

    let app_state = AppState {
        matchmaker: matchmaker.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------
    let _sweeper = presence::spawn_sweeper(matchmaker, config.presence_sweep_interval);

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
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
