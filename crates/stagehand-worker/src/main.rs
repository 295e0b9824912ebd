//! # stagehand-worker
//!
//! Worker binary: loads settings, builds the rule table and serves backend
//! connections over WebSocket until SIGINT/SIGTERM.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use stagehand_core::logging::{LogFormat, init_subscriber};
use stagehand_rules::RuleTable;
use stagehand_server::{DrainOutcome, DryRunHandler, ServerConfig, WorkerServer};
use stagehand_settings::WorkerSettings;
use tracing::{info, warn};

/// stagehand worker.
#[derive(Parser, Debug)]
#[command(name = "stagehand-worker", about = "Accepts backend connections and dispatches requests")]
struct Cli {
    /// Settings file (default `~/.stagehand/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Standalone rule file (overrides settings).
    #[arg(long)]
    rules: Option<PathBuf>,
}

impl Cli {
    /// Layer CLI flags over loaded settings.
    fn apply(&self, settings: &mut WorkerSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level = level.to_lowercase();
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        if let Some(rules) = &self.rules {
            settings.rules.path = Some(rules.to_string_lossy().into_owned());
        }
    }
}

/// Build the rule table from a rule file if one is configured, otherwise
/// from the inline `rules.targets` table.
fn build_rules(settings: &WorkerSettings) -> Result<RuleTable> {
    match &settings.rules.path {
        Some(path) => RuleTable::load(Path::new(path))
            .with_context(|| format!("Failed to load rule file: {path}")),
        None => RuleTable::new(settings.rules.targets.clone())
            .context("Invalid rules in settings"),
    }
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(stagehand_settings::settings_path);
    let mut settings = stagehand_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings: {}", settings_path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);

    let rules = build_rules(&settings)?;
    info!(
        targets = ?rules.targets().collect::<Vec<_>>(),
        "rule table loaded"
    );

    let metrics_handle = stagehand_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let server = WorkerServer::new(
        ServerConfig::from_settings(&settings),
        Arc::new(rules),
        Arc::new(DryRunHandler),
    )
    .with_name(&settings.name)
    .with_metrics(metrics_handle);

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    info!(name = %settings.name, "worker listening on ws://{addr}/ws");

    shutdown_signal().await?;

    info!("Shutting down...");
    let timeout = server.config().shutdown_timeout();
    if let DrainOutcome::TimedOut { remaining } =
        server.shutdown().graceful_shutdown(Some(timeout)).await
    {
        warn!(remaining, "connections still open after shutdown timeout");
    }
    let _ = handle.await;

    info!("Shutdown complete");
    Ok(())
}
