mod commands;
mod config;
mod connection;
mod console;
mod engine;
mod error;
mod filter;
mod log_store;
mod protocol;
mod session;
mod settings;
mod types;

use anyhow::Result;
use clap::Parser;
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    // Quiet by default so diagnostics don't scroll the rendered view away
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .env()
        .init()?;

    info!("Starting logstream-viewer");

    // Parse command-line arguments
    let cli = config::Cli::parse();

    // Load configuration
    let config = config::load_config(&cli)?;
    info!("Configuration loaded successfully");

    let endpoint = session::endpoint_from_origin(&config.server_url)?;
    let settings = settings::SettingsClient::new(&config.server_url)?;

    match settings.fetch().await {
        Ok(current) => info!(
            "Server keeps up to {} logs per client",
            current.max_logs_per_client
        ),
        Err(e) => warn!("Could not load server settings: {}", e),
    }

    let sink = console::ConsoleSink::new(config.display.rows, config.display.color);
    let mut engine =
        engine::Engine::new(sink, config.retry_policy()).with_criteria(config.criteria());

    // Not connected yet: the history request goes out once the socket opens
    if config.client.is_some() {
        engine.set_client_scope(config.client.clone());
    }

    let (command_tx, command_rx) = mpsc::channel(64);
    let handle = session::SessionHandle::new(command_tx);

    tokio::spawn(commands::read_commands(handle, settings));

    let engine = session::Session::new(endpoint, engine, command_rx).run().await;

    if engine.store().is_empty() {
        info!("Stopped while {}, nothing buffered", engine.state());
    } else {
        info!(
            "Stopped while {} with {} buffered logs from {} known clients",
            engine.state(),
            engine.store().len(),
            engine.roster().clients().len()
        );
    }
    Ok(())
}
