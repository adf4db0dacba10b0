//! Package catalog updater daemon.
//!
//! Polls the market index on an interval, logs every detected change and
//! flushes authorized installs. Runs until Ctrl-C.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use updater_core::{UpdaterConfig, UpdaterEngine};

#[derive(Parser, Debug)]
#[command(name = "updaterd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Package catalog updater daemon", long_about = None)]
struct Args {
    /// JSON config file (defaults plus UPDATER_* variables when omitted)
    #[arg(short, long, env = "UPDATER_CONFIG")]
    config: Option<PathBuf>,

    /// Market index URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Directory for persisted state
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Do not read or write persisted state
    #[arg(long)]
    no_persist: bool,

    /// Install command, e.g. "npm install"; dry run when unset
    #[arg(long)]
    installer: Option<String>,

    /// Pass --strict to the installer
    #[arg(long)]
    strict: bool,

    /// Ignore per-registration policies (no automatic installs)
    #[arg(long)]
    disable_permissions: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Args {
    fn resolve_config(&self) -> Result<UpdaterConfig> {
        let mut config = match &self.config {
            Some(path) => UpdaterConfig::from_file(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?,
            None => UpdaterConfig::from_env().context("Invalid UPDATER_* environment")?,
        };

        if let Some(endpoint) = &self.endpoint {
            config.catalog_endpoint = endpoint.clone();
        }
        if let Some(interval_ms) = self.interval_ms {
            config.poll_interval_ms = interval_ms;
        }
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if self.no_persist {
            config.persist = false;
        }
        if let Some(installer) = &self.installer {
            config.installer_command = Some(installer.clone());
        }
        if self.strict {
            config.strict_install = true;
        }
        if self.disable_permissions {
            config.enable_permission_system = false;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    updater_core::init_tracing(args.json, level);

    let config = args.resolve_config()?;
    info!(
        endpoint = %config.catalog_endpoint,
        poll_interval_ms = config.poll_interval_ms,
        data_dir = %config.data_dir.display(),
        "updaterd starting"
    );

    let engine = UpdaterEngine::from_config(config).context("Failed to build updater engine")?;
    engine.start().await.context("Failed to start updater")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    engine.stop().await;
    Ok(())
}
