//! Package catalog updater CLI
//!
//! The `updater` command runs one-off operations against the market index
//! and the persisted updater state.
//!
//! ## Commands
//!
//! - `check`: fetch, diff against the persisted snapshot, persist
//! - `catalog`: print the current market snapshot
//! - `status`: print the persisted snapshot summary and policies

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, Level};

use updater_core::{
    CatalogFetcher, ChangeKind, CycleReport, PersistedState, RegistryFetcher, Snapshot,
    StateStore, UpdaterConfig, UpdaterEngine,
};
use updater_state::FsStateStore;

#[derive(Parser)]
#[command(name = "updater")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Package catalog updater", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// JSON config file (defaults plus UPDATER_* variables when omitted)
    #[arg(short, long, global = true, env = "UPDATER_CONFIG")]
    config: Option<PathBuf>,

    /// Market index URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Directory holding persisted state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the catalog, diff it against the persisted snapshot and save it
    Check {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the current market snapshot
    Catalog {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Only show short names containing this text
        #[arg(long)]
        filter: Option<String>,
    },

    /// Show the persisted snapshot summary and policies
    Status {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    updater_core::init_tracing(cli.json, level);

    let config = resolve_config(&cli)?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Check { format } => cmd_check(config, format, &mut out).await,
        Commands::Catalog { format, filter } => {
            cmd_catalog(&config, format, filter.as_deref(), &mut out).await
        }
        Commands::Status { format } => cmd_status(&config.data_dir, format, &mut out).await,
    }
}

fn resolve_config(cli: &Cli) -> Result<UpdaterConfig> {
    let mut config = match &cli.config {
        Some(path) => UpdaterConfig::from_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => UpdaterConfig::from_env().context("Invalid UPDATER_* environment")?,
    };
    if let Some(endpoint) = &cli.endpoint {
        config.catalog_endpoint = endpoint.clone();
    }
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// One fetch + diff against the persisted snapshot, then persist.
async fn cmd_check(config: UpdaterConfig, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    let config = UpdaterConfig {
        persist: true,
        ..config
    };
    let engine = UpdaterEngine::from_config(config).context("Failed to build updater engine")?;
    engine
        .load_state()
        .await
        .context("Failed to load persisted state")?;

    let report = engine
        .check_update()
        .await
        .context("Failed to check for updates")?;
    debug!(cycle_id = %report.cycle_id, "check finished");

    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?,
        OutputFormat::Text => render_report(&report, out)?,
    }
    Ok(())
}

fn render_report(report: &CycleReport, out: &mut impl Write) -> Result<()> {
    if report.baseline {
        writeln!(out, "No previous snapshot; baseline saved.")?;
        return Ok(());
    }
    if report.changes.is_empty() {
        writeln!(out, "No changes.")?;
        return Ok(());
    }

    for change in &report.changes {
        let marker = match change.kind {
            ChangeKind::New => "+",
            ChangeKind::Update => "~",
            ChangeKind::Delete => "-",
        };
        writeln!(out, "{marker} {change}  [{}]", change.full_name)?;
    }
    writeln!(out, "\n{} change(s)", report.changes.len())?;
    Ok(())
}

async fn cmd_catalog(
    config: &UpdaterConfig,
    format: OutputFormat,
    filter: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let fetcher =
        RegistryFetcher::for_endpoint(&config.catalog_endpoint, config.request_timeout_secs)?;
    let snapshot = fetcher
        .fetch()
        .await
        .with_context(|| format!("Failed to fetch {}", config.catalog_endpoint))?;

    let snapshot: Snapshot = match filter {
        Some(needle) => snapshot
            .packages()
            .filter(|package| package.short_name.contains(needle))
            .cloned()
            .collect(),
        None => snapshot,
    };
    render_snapshot(&snapshot, format, out)
}

fn render_snapshot(snapshot: &Snapshot, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = snapshot.packages().collect();
            writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?;
        }
        OutputFormat::Text => {
            let width = snapshot
                .short_names()
                .map(str::len)
                .max()
                .unwrap_or(0);
            for package in snapshot.packages() {
                writeln!(
                    out,
                    "{:<width$}  {}@{}",
                    package.short_name, package.full_name, package.version
                )?;
            }
            writeln!(out, "\n{} package(s)", snapshot.len())?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusView<'a> {
    state_file: String,
    packages: Option<usize>,
    policies: &'a std::collections::BTreeMap<String, updater_core::Policy>,
}

async fn cmd_status(data_dir: &Path, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    let store = FsStateStore::new(data_dir);
    let state = match store.load().await.context("Failed to read persisted state")? {
        Some(doc) => PersistedState::from_document(doc)?,
        None => PersistedState::default(),
    };

    let view = StatusView {
        state_file: store.path().display().to_string(),
        packages: state.snapshot.as_ref().map(Snapshot::len),
        policies: &state.policies,
    };

    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&view)?)?,
        OutputFormat::Text => {
            writeln!(out, "State file: {}", view.state_file)?;
            match view.packages {
                Some(count) => writeln!(out, "Snapshot:   {count} package(s)")?,
                None => writeln!(out, "Snapshot:   (none)")?,
            }
            if view.policies.is_empty() {
                writeln!(out, "Policies:   (none)")?;
            } else {
                writeln!(out, "Policies:")?;
                for (name, policy) in view.policies {
                    writeln!(
                        out,
                        "  {name}: install={} messages={}",
                        policy.allow_install, policy.allow_receive_message
                    )?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use updater_core::{ChangeEvent, PackageInfo, Policy};

    fn report(changes: Vec<ChangeEvent>, baseline: bool) -> CycleReport {
        CycleReport {
            cycle_id: "cycle-1".to_string(),
            trigger: "manual".to_string(),
            baseline,
            outcomes: Vec::new(),
            changes,
            install: None,
            duration_ms: 3,
        }
    }

    fn render(report: &CycleReport) -> String {
        let mut buf = Vec::new();
        render_report(report, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn report_lists_changes_with_markers() {
        let text = render(&report(
            vec![
                ChangeEvent::update("a", "koishi-plugin-a", "1.0.0", "1.1.0"),
                ChangeEvent::new("b", "koishi-plugin-b", "0.1.0"),
                ChangeEvent::delete("c", "koishi-plugin-c", "2.0.0"),
            ],
            false,
        ));
        assert!(text.contains("~ update a (1.0.0 → 1.1.0)  [koishi-plugin-a]"));
        assert!(text.contains("+ new b (0.1.0)"));
        assert!(text.contains("- delete c"));
        assert!(text.contains("3 change(s)"));
    }

    #[test]
    fn baseline_and_empty_reports() {
        assert!(render(&report(Vec::new(), true)).contains("baseline"));
        assert_eq!(render(&report(Vec::new(), false)), "No changes.\n");
    }

    #[test]
    fn snapshot_text_is_aligned() {
        let snapshot = Snapshot::from_packages([
            PackageInfo::new("a", "koishi-plugin-a", "1.0.0"),
            PackageInfo::new("market", "@koishijs/plugin-market", "2.0.0"),
        ]);
        let mut buf = Vec::new();
        render_snapshot(&snapshot, OutputFormat::Text, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("a       koishi-plugin-a@1.0.0"));
        assert!(text.contains("market  @koishijs/plugin-market@2.0.0"));
        assert!(text.contains("2 package(s)"));
    }

    #[tokio::test]
    async fn status_reads_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        let mut state = PersistedState {
            snapshot: Some(Snapshot::from_packages([PackageInfo::new(
                "a",
                "koishi-plugin-a",
                "1.0.0",
            )])),
            ..PersistedState::default()
        };
        state.policies.insert(
            "a".to_string(),
            Policy {
                allow_install: true,
                allow_receive_message: true,
            },
        );
        store.save(&state.to_document().unwrap()).await.unwrap();

        let mut buf = Vec::new();
        cmd_status(dir.path(), OutputFormat::Text, &mut buf)
            .await
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("1 package(s)"));
        assert!(text.contains("a: install=true messages=true"));
    }

    #[tokio::test]
    async fn status_without_state_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = Vec::new();
        cmd_status(dir.path(), OutputFormat::Json, &mut buf)
            .await
            .unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert!(doc["packages"].is_null());
        assert!(doc["policies"].as_object().unwrap().is_empty());
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "updater",
            "catalog",
            "--format",
            "json",
            "--endpoint",
            "http://127.0.0.1:9/index.json",
        ])
        .unwrap();
        assert_eq!(cli.endpoint.as_deref(), Some("http://127.0.0.1:9/index.json"));
        assert!(matches!(
            cli.command,
            Commands::Catalog {
                format: OutputFormat::Json,
                ..
            }
        ));
    }
}
