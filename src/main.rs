//! # OmniRace
//!
//! Race one chat prompt concurrently across multiple LLM backends and stream
//! the first successful backend's output to the client.
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration
//! OPENAI_API_KEYS=sk-... omnirace
//!
//! # Start with environment overrides
//! OMNIRACE_PORT=9000 omnirace
//! ```
//!
//! Providers whose credential variable (`OPENAI_API_KEYS`, `GROQ_API_KEYS`,
//! `GEMINI_API_KEYS`) is unset are simply left out of the race.

use std::env;
use std::time::Duration;

use omnirace_providers::{build_adapters, default_providers};
use omnirace_scheduler::{RaceConfig, RaceScheduler};
use omnirace_server::{AppState, Server, ServerConfig};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application entry point
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting OmniRace");

    if let Err(e) = run().await {
        error!(error = %e, "Application failed");
        std::process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let adapters = build_adapters(default_providers())?;
    info!(providers = adapters.len(), "Provider table initialized");

    let mut race_config = RaceConfig::default();
    if let Some(secs) = env_parse::<u64>("OMNIRACE_TIMEOUT_SECS") {
        race_config = race_config.with_global_timeout(Duration::from_secs(secs));
    }

    let scheduler = RaceScheduler::new(adapters, race_config);
    if !scheduler.any_provider_available() {
        // The server still starts; /ready reports unavailable and races
        // return the configuration error until a key appears.
        warn!("No provider has a configured credential");
    }

    let state = AppState::new(scheduler);

    let mut server_config = ServerConfig::new();
    if let Ok(host) = env::var("OMNIRACE_HOST") {
        server_config = server_config.with_host(host);
    }
    if let Some(port) = env_parse::<u16>("OMNIRACE_PORT") {
        server_config = server_config.with_port(port);
    }

    let server = Server::new(server_config, state);
    server.run().await?;

    Ok(())
}

/// Parse an env var, treating unset or unparsable values as absent.
fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    env::var(var).ok().and_then(|v| v.parse().ok())
}
