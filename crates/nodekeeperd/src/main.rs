//! nodekeeperd — the Nodekeeper daemon.
//!
//! Runs the resource-lifecycle control loop against the redb fleet
//! inventory:
//! - `run` performs one invocation and prints the summary as JSON
//! - `daemon` repeats the invocation on an interval until Ctrl-C
//! - `import` loads a fleet description (resources, load balancers,
//!   metric samples) into the inventory
//! - `journal` prints every call the controller has issued
//!
//! # Usage
//!
//! ```text
//! nodekeeperd --inventory fleet.redb import --fleet fleet.json
//! nodekeeperd --inventory fleet.redb run
//! nodekeeperd --config nodekeeper.toml daemon --interval 300
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nodekeeper_controller::Controller;
use nodekeeper_core::{NodekeeperConfig, Providers};
use nodekeeper_state::{Fleet, InventoryStore};

const DEFAULT_LOG_FILTER: &str = "info,nodekeeper=debug,nodekeeperd=debug";
const DEFAULT_CONFIG_FILE: &str = "nodekeeper.toml";

#[derive(Parser)]
#[command(name = "nodekeeperd", about = "Nodekeeper resource lifecycle controller")]
struct Cli {
    /// Path to nodekeeper.toml. Defaults to ./nodekeeper.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fleet inventory database.
    #[arg(long, global = true, default_value = "nodekeeper.redb")]
    inventory: PathBuf,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop once and print the summary.
    Run {
        /// Maximum concurrent resource evaluations.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Evaluate schedules at this RFC 3339 instant instead of now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Run the control loop periodically until interrupted.
    Daemon {
        /// Seconds between invocations.
        #[arg(long)]
        interval: Option<u64>,

        /// Maximum concurrent resource evaluations.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Load a fleet description (JSON) into the inventory.
    Import {
        #[arg(long)]
        fleet: PathBuf,
    },

    /// Print the action journal, oldest first.
    Journal {
        /// Only the most recent N entries.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run { concurrency, at } => {
            if let Some(c) = concurrency {
                config.controller.concurrency = c;
            }
            run_once(&cli.inventory, &config, at).await
        }
        Command::Daemon {
            interval,
            concurrency,
        } => {
            if let Some(secs) = interval {
                config.controller.interval_secs = secs;
            }
            if let Some(c) = concurrency {
                config.controller.concurrency = c;
            }
            run_daemon(&cli.inventory, &config).await
        }
        Command::Import { fleet } => import_fleet(&cli.inventory, &fleet),
        Command::Journal { limit } => print_journal(&cli.inventory, limit),
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<NodekeeperConfig> {
    let mut config = match path {
        Some(path) => NodekeeperConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            NodekeeperConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => NodekeeperConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

fn build_controller(inventory: &Path, config: &NodekeeperConfig) -> anyhow::Result<Controller> {
    let store = InventoryStore::open(inventory)
        .with_context(|| format!("failed to open inventory {}", inventory.display()))?;
    info!(path = ?inventory, "inventory opened");

    let providers = Providers::from_single(Arc::new(store));
    Ok(Controller::new(providers, config)?)
}

async fn run_once(
    inventory: &Path,
    config: &NodekeeperConfig,
    at: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    let controller = build_controller(inventory, config)?;
    let summary = controller.run_at(at.unwrap_or_else(Utc::now)).await;

    if !summary.is_clean() {
        warn!(failed = summary.failed(), "control loop finished with failures");
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_daemon(inventory: &Path, config: &NodekeeperConfig) -> anyhow::Result<()> {
    info!("Nodekeeper daemon starting");
    let controller = Arc::new(build_controller(inventory, config)?);
    let interval = Duration::from_secs(config.controller.interval_secs);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn({
        let controller = controller.clone();
        async move { controller.run_periodic(interval, shutdown_rx).await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    loop_handle.await?;

    info!("Nodekeeper daemon stopped");
    Ok(())
}

fn import_fleet(inventory: &Path, fleet_path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(fleet_path)
        .with_context(|| format!("failed to read {}", fleet_path.display()))?;
    let fleet: Fleet = serde_json::from_str(&raw)
        .with_context(|| format!("invalid fleet description {}", fleet_path.display()))?;

    let store = InventoryStore::open(inventory)?;
    let report = store.import(&fleet)?;
    info!(
        resources = report.resources,
        load_balancers = report.load_balancers,
        samples = report.samples,
        "fleet imported"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_journal(inventory: &Path, limit: Option<usize>) -> anyhow::Result<()> {
    let store = InventoryStore::open(inventory)?;
    let journal = store.list_journal()?;
    let skip = limit.map_or(0, |n| journal.len().saturating_sub(n));
    for entry in journal.iter().skip(skip) {
        println!("{}", serde_json::to_string(entry)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "nodekeeperd",
            "--inventory",
            "/tmp/fleet.redb",
            "run",
            "--concurrency",
            "8",
            "--at",
            "2024-06-11T02:00:00Z",
        ])
        .unwrap();

        assert_eq!(cli.inventory, PathBuf::from("/tmp/fleet.redb"));
        assert_eq!(cli.log_format, LogFormat::Text);
        match cli.command {
            Command::Run { concurrency, at } => {
                assert_eq!(concurrency, Some(8));
                assert_eq!(at.unwrap().to_rfc3339(), "2024-06-11T02:00:00+00:00");
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn cli_parses_daemon_and_json_logs() {
        let cli = Cli::try_parse_from([
            "nodekeeperd",
            "daemon",
            "--interval",
            "60",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(
            cli.command,
            Command::Daemon {
                interval: Some(60),
                concurrency: None
            }
        ));
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[controller]\nconcurrency = 9\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.controller.concurrency, 9);
    }

    #[test]
    fn journal_and_import_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let inventory = dir.path().join("fleet.redb");
        let fleet = dir.path().join("fleet.json");
        std::fs::write(
            &fleet,
            r#"{
                "resources": [{
                    "id": "i-1",
                    "kind": "compute_instance",
                    "arn": "arn:aws:ec2:us-east-1:123456789012:instance/i-1",
                    "state": "stopped",
                    "tags": {"to-be-started": "true"}
                }]
            }"#,
        )
        .unwrap();

        import_fleet(&inventory, &fleet).unwrap();
        print_journal(&inventory, Some(5)).unwrap();

        let store = InventoryStore::open(&inventory).unwrap();
        assert_eq!(
            store
                .list_resources_by_kind(nodekeeper_core::ResourceKind::ComputeInstance)
                .unwrap()
                .len(),
            1
        );
    }
}
