//! # relayd
//!
//! Relay chat server binary: loads settings, starts logging and metrics,
//! then serves the RPC socket and chat stream until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::config::ServerConfig;
use relay_server::rpc::handlers::register_all;
use relay_server::rpc::registry::MethodRegistry;
use relay_server::server::RelayServer;
use relay_settings::RelaySettings;

/// How long in-flight connections get to drain after ctrl-c.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Relay chat server.
#[derive(Parser, Debug)]
#[command(name = "relayd", about = "Real-time chat relay server")]
struct Cli {
    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    fn load_settings(&self) -> Result<RelaySettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(relay_settings::settings_path);
        relay_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))
    }

    fn server_config(&self, settings: &RelaySettings) -> ServerConfig {
        let mut config = ServerConfig::from(settings);
        if let Some(ref host) = self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = args.load_settings()?;
    relay_logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics_handle =
        relay_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let config = args.server_config(&settings);
    let mut registry = MethodRegistry::with_timeout(config.request_timeout());
    register_all(&mut registry);
    let method_count = registry.methods().len();

    let server = RelayServer::new(config, registry, metrics_handle);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(
        max_sessions = server.config().max_sessions,
        max_connections = server.config().max_connections,
        "relay listening on http://{addr} ({method_count} RPC methods registered)"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(SHUTDOWN_GRACE))
        .await;

    tracing::info!("shutdown complete");
    Ok(())
}
