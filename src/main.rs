//! pagestitch server
//!
//! Entry point for the composition service: loads configuration, sets up
//! logging and starts the HTTP server.

use pagestitch::{StitchConfig, StitchServer};
use std::env;
use std::path::Path;
use tracing::{error, info};

/// # Usage
/// ```bash
/// # Start with default config (pagestitch.yaml, falling back to defaults)
/// cargo run
///
/// # Start with custom config
/// cargo run -- /path/to/config.yaml
/// ```
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    info!("Starting pagestitch composition server");

    let config_path = env::args().nth(1).unwrap_or_else(|| "pagestitch.yaml".to_string());
    let explicit = env::args().nth(1).is_some();

    let config = if explicit || Path::new(&config_path).exists() {
        info!("Loading configuration from: {}", config_path);
        match StitchConfig::from_file(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        info!("No configuration file found, using defaults");
        StitchConfig::default()
    };

    info!("  Listen address: {}", config.listen_address);
    info!("  Template directory: {}", config.template_dir);
    info!("  Pipe instance name: {}", config.pipe_instance_name);
    info!("  Forwarded vendor prefix: {}", config.forward_header_prefix);
    info!(
        "  Fragment timeouts: {} ms inline, {} ms async",
        config.inline_timeout_ms, config.async_timeout_ms
    );

    let server = match StitchServer::from_config(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to initialize server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.start().await {
        error!("Server terminated: {}", e);
        std::process::exit(1);
    }
}
