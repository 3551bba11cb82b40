//! # parley
//!
//! Chat server binary: loads configuration and the credential store, then
//! serves `/chat` until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parley_auth::{CredentialStore, JsonFileBackend};
use parley_server::config::{MAX_CONNECTIONS_LIMIT, ServerConfig, load_config_from_path};
use parley_server::metrics::install_recorder;
use parley_server::server::ParleyServer;
use tracing_subscriber::EnvFilter;

/// Parley WebSocket chat server.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Parley WebSocket chat server")]
struct Cli {
    /// JSON config file (missing file means defaults).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Credential storage file.
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Maximum concurrent chat connections (1 to 1000000).
    #[arg(long, value_parser = connection_limit)]
    max_connections: Option<usize>,

    /// Do not deliver chat lines back to their sender.
    #[arg(long)]
    no_echo: bool,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Do not install the Prometheus recorder (`/metrics` returns 404).
    #[arg(long)]
    no_metrics: bool,
}

impl Cli {
    /// Apply command-line overrides on top of file + env configuration.
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(storage) = &self.storage {
            config.storage_path.clone_from(storage);
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
        if self.no_echo {
            config.echo_to_sender = false;
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
    }
}

fn connection_limit(raw: &str) -> std::result::Result<usize, String> {
    let max = raw.parse::<usize>().map_err(|e| e.to_string())?;
    if (1..=MAX_CONNECTIONS_LIMIT).contains(&max) {
        Ok(max)
    } else {
        Err(format!("must be between 1 and {MAX_CONNECTIONS_LIMIT}"))
    }
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log filter: {level}"))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!(e).context("Failed to install tracing subscriber"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config =
        load_config_from_path(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.log_level, args.json_logs)?;

    let store = CredentialStore::load(JsonFileBackend::new(&config.storage_path))
        .with_context(|| {
            format!(
                "Failed to load credential store from {}",
                config.storage_path.display()
            )
        })?;

    let mut server = ParleyServer::new(config, Arc::new(store));
    if !args.no_metrics {
        let handle = install_recorder().context("Failed to install metrics recorder")?;
        server = server.with_metrics(handle);
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("Parley listening on ws://{addr}/chat");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let _ = server.shutdown().drain(vec![handle], None).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
