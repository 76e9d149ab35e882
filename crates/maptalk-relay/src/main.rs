//! # maptalk-relay
//!
//! Relay server binary. Loads settings, applies command-line overrides,
//! starts the HTTP/WebSocket server and waits for ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use maptalk_server::{RelayServer, ServerConfig};
use maptalk_settings::{RelaySettings, load_settings_from_path, settings_path};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Real-time presence and messaging relay.
#[derive(Parser, Debug)]
#[command(name = "maptalk-relay", about = "Real-time presence and messaging relay")]
struct Cli {
    /// Settings file (defaults to `~/.maptalk/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Allowed browser origin; repeat for several, `*` for any.
    #[arg(long = "allowed-origin")]
    allowed_origins: Vec<String>,

    /// Maximum concurrent connections (overrides settings).
    #[arg(long)]
    max_connections: Option<usize>,

    /// Log level filter when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Layer command-line flags over loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if !self.allowed_origins.is_empty() {
            settings.server.allowed_origins.clone_from(&self.allowed_origins);
        }
        if let Some(max) = self.max_connections {
            settings.server.max_connections = max;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

/// Run `f` with a temporary subscriber, for work done before the configured
/// one can be installed. Shows warnings unless `RUST_LOG` says otherwise.
fn with_bootstrap_logging<W, T>(writer: W, f: impl FnOnce() -> T) -> T
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(writer)
        .compact()
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = with_bootstrap_logging(std::io::stderr, || load_settings_from_path(&path))
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings
        .validate()
        .context("Invalid configuration after command-line overrides")?;

    init_tracing(&settings.logging.level, settings.logging.json);
    tracing::info!(settings = %path.display(), "configuration loaded");

    let server = Arc::new(RelayServer::new(ServerConfig::from_settings(
        &settings.server,
    )));
    let handle = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        addr = %handle.addr(),
        origins = ?settings.server.allowed_origins,
        "maptalk relay listening"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().drain(handle.into_tasks(), None).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
