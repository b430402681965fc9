//! Radio Relay Server
//!
//! Plays the library around the clock and serves the stream over HTTP.
//!
//! Usage: `radio [port] [library folder]`. Set `RADIO_CONFIG` to load a
//! TOML config instead of the per-user default.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use radio_relay::{
    config::AppConfig,
    library::{DirectoryLibrary, TrackSelector},
    pipeline::Radio,
    process::SystemLauncher,
    server::RadioServer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Radio Relay");

    let config_path = std::env::var_os("RADIO_CONFIG").map(PathBuf::from);
    let mut config =
        AppConfig::load_or_default(config_path.as_deref()).context("Failed to load config")?;

    let mut args = std::env::args().skip(1);
    if let Some(port) = args.next() {
        config.server.http_port = port
            .parse()
            .with_context(|| format!("Invalid port: {}", port))?;
    }
    if let Some(folder) = args.next() {
        config.library.folder = PathBuf::from(folder);
    }

    let library = DirectoryLibrary::new(&config.library);
    match library.tracks() {
        Ok(tracks) => tracing::info!(
            "Found {} tracks in {}",
            tracks.len(),
            library.folder().display()
        ),
        Err(e) => tracing::warn!("{}", e),
    }

    let radio = Radio::start(&config, Arc::new(SystemLauncher::new()), Arc::new(library));
    let server = RadioServer::new(config.server.clone(), radio.clone());

    tokio::select! {
        result = server.serve() => {
            result.context("HTTP server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down...");
        }
    }

    radio.shutdown().await;
    tracing::info!("Goodbye");
    Ok(())
}
