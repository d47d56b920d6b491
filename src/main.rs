//! Frigate Identity - identity registry & config generation engine
//!
//! Main entry point: one-shot generation or the watch daemon.

use clap::{Parser, Subcommand};
use frigate_identity::{
    dashboard::SnapshotSource,
    orchestrator::Orchestrator,
    state::{AppConfig, AppState},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "frigate-identity", version, about = "Identity registry and declarative config generation for Frigate person recognition")]
struct Cli {
    /// Static persons declaration file
    #[arg(long, env = "PERSONS_FILE")]
    persons_file: Option<PathBuf>,

    /// Directory the generated documents are written into
    #[arg(long, env = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Home Assistant base URL
    #[arg(long, env = "HASS_URL")]
    ha_url: Option<String>,

    /// Long-lived access token; omit to run file-sink only
    #[arg(long, env = "HASS_TOKEN")]
    ha_token: Option<String>,

    /// Snapshot entity strategy
    #[arg(long, value_enum, env = "SNAPSHOT_SOURCE")]
    snapshot_source: Option<SnapshotSource>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one generation pass and exit
    Generate,
    /// Run the daemon: ingest live events from stdin (one JSON payload per
    /// line), poll the persons file, and regenerate on change
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "frigate_identity=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::default();
    if let Some(path) = cli.persons_file {
        config.persons_file = path;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(url) = cli.ha_url {
        config.ha_url = url;
    }
    if let Some(token) = cli.ha_token {
        config.ha_token = Some(token);
    }
    if let Some(source) = cli.snapshot_source {
        config.snapshot_source = source;
    }

    tracing::info!(
        persons_file = %config.persons_file.display(),
        output_dir = %config.output_dir.display(),
        snapshot_source = %config.snapshot_source,
        rest_push = config.ha_token.is_some(),
        "frigate-identity starting"
    );

    let (state, rebuild_rx) = AppState::init(config)?;
    let orchestrator = Arc::new(Orchestrator::from_state(&state));

    match cli.command {
        Command::Generate => {
            if let Err(e) = state.registry.load_metadata(&state.config.persons_file).await {
                tracing::error!(error = %e, "persons file rejected");
                anyhow::bail!(e);
            }
            orchestrator.regenerate("manual generate").await?;
        }
        Command::Watch => {
            let runner = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                runner.run(rebuild_rx).await;
            });

            let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                state.registry.ingest(&line).await;
            }
            tracing::info!("event stream closed, shutting down");
        }
    }

    Ok(())
}
