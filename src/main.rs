//! Command-line interface for cdc-sim
//!
//! # Usage Examples
//!
//! ```bash
//! # Run until tick 1000, resuming from the instance's checkpoint if any
//! cdc-sim run --config sim.yaml --max-ticks 1000
//!
//! # Run a second, independent instance of the same workload
//! cdc-sim run --config sim.yaml --instance replica-b
//!
//! # Decode everything written for one table
//! cdc-sim inspect --sink-dir ./cdc-out --table orders
//!
//! # Show the schema timeline
//! cdc-sim schema-history --config sim.yaml
//! ```
//!
//! Logging is controlled with `RUST_LOG` (e.g. `RUST_LOG=cdc_sim=info`).

use anyhow::Context;
use cdc_sim::{inspect, Engine, EngineConfig};
use cdc_sink::LocalObjectSink;
use checkpoint::Checkpoint;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "cdc-sim")]
#[command(about = "Simulate a logical-replication CDC source writing to object storage")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation instance until max ticks or Ctrl+C
    Run {
        /// Engine and workload configuration (YAML)
        #[arg(long, env = "CDC_SIM_CONFIG")]
        config: PathBuf,

        /// Last tick to produce (overrides `max_ticks` in the config)
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Instance name (overrides `checkpoint.instance` in the config)
        #[arg(long, env = "CDC_SIM_INSTANCE")]
        instance: Option<String>,
    },

    /// Decode the change events in a local sink directory as JSON lines
    Inspect {
        /// Root directory of a local sink
        #[arg(long)]
        sink_dir: PathBuf,

        /// Only read this table's objects
        #[arg(long)]
        table: Option<String>,
    },

    /// Print the schema versions the workload publishes as JSON lines
    SchemaHistory {
        /// Engine and workload configuration (YAML)
        #[arg(long, env = "CDC_SIM_CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            max_ticks,
            instance,
        } => run_simulation(config, max_ticks, instance).await,
        Commands::Inspect { sink_dir, table } => run_inspect(sink_dir, table).await,
        Commands::SchemaHistory { config } => run_schema_history(config),
    }
}

async fn run_simulation(
    config_path: PathBuf,
    max_ticks: Option<u64>,
    instance: Option<String>,
) -> anyhow::Result<()> {
    let mut config = EngineConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {config_path:?}"))?;
    if max_ticks.is_some() {
        config.max_ticks = max_ticks;
    }
    if let Some(instance) = instance {
        config.checkpoint.instance = instance;
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, stopping after the current tick");
            on_signal.cancel();
        }
    });

    let instance = config.checkpoint.instance.clone();
    let summary = Engine::from_config(config)
        .await
        .run(cancel)
        .await
        .with_context(|| format!("Simulation instance '{instance}' failed"))?;

    match summary.checkpoint {
        Some(checkpoint) => println!("{}", checkpoint.to_cli_string()),
        None => println!("no transactions written"),
    }
    Ok(())
}

async fn run_inspect(sink_dir: PathBuf, table: Option<String>) -> anyhow::Result<()> {
    let sink = LocalObjectSink::new(&sink_dir);
    let events = inspect::read_events(&sink, table.as_deref())
        .await
        .with_context(|| format!("Failed to read events from {sink_dir:?}"))?;

    let mut out = std::io::stdout().lock();
    for event in &events {
        serde_json::to_writer(&mut out, event)?;
        writeln!(out)?;
    }
    tracing::info!("Decoded {} events", events.len());
    Ok(())
}

fn run_schema_history(config_path: PathBuf) -> anyhow::Result<()> {
    let config = EngineConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {config_path:?}"))?;
    let history = inspect::planned_schema_history(&config.workload, config.max_ticks)?;

    let mut out = std::io::stdout().lock();
    for snapshot in &history {
        serde_json::to_writer(&mut out, snapshot.as_ref())?;
        writeln!(out)?;
    }
    Ok(())
}
