//! Galaxy Explorer relay server -- in-memory presence and position relay.
//!
//! An axum WebSocket server that keeps one room per solar system. Clients
//! connect to `/party/<system_id>`, identify with a username and stream
//! their position; the relay fans the updates out to everyone else in the
//! room. Room state is never persisted.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:1999
//! cargo run --bin galaxy-relay
//!
//! # Run on custom address
//! cargo run --bin galaxy-relay -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! RELAY_ADDR=127.0.0.1:8080 cargo run --bin galaxy-relay
//! ```

use std::sync::Arc;

use clap::Parser;
use galaxy_relay::config::{RelayCliArgs, RelayConfig};
use galaxy_relay::relay::{self, RelayState};

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level when set.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        max_rooms = config.max_rooms,
        max_message_size = config.max_message_size,
        "starting galaxy relay server"
    );

    let state = Arc::new(RelayState::with_config(
        config.max_rooms,
        config.max_message_size,
    ));

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}
