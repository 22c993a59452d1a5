//! ---
//! ied_section: "01-core-functionality"
//! ied_subsection: "binary"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Binary entrypoint for the R-IED daemon."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use r_ied_common::config::AppConfig;
use r_ied_common::logging::init_tracing;
use r_ied_model::{ModelBuilder, ModelDeclaration, ModelStore, QueryPort};
use r_ied_net::{
    frame_channel, new_registry, FrameListener, IedMetrics, JsonFrameDecoder, RestApiBuilder,
};
use r_ied_sim::{relay_model, spawn_relay_simulation};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("R-IED ", env!("CARGO_PKG_VERSION")),
    about = "R-IED relay prototyping daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Model declaration overriding model.declaration")]
    model: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Override the REST listen address")]
    listen: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Build the model and serve it until ctrl-c")]
    Run {
        #[arg(long, value_name = "FILE", help = "Replay recorded frames, one JSON batch per line")]
        replay: Option<PathBuf>,
    },
    #[command(about = "Validate the model declaration and print a summary")]
    CheckModel,
    #[command(about = "Print the effective model declaration as TOML")]
    DumpModel,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/example.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(model) = cli.model {
        config.model.declaration = Some(model);
    }
    if let Some(listen) = cli.listen {
        config.api.listen = listen;
    }
    config.validate()?;
    init_tracing("r-iedd", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using defaults"),
    }

    let builder = model_builder(&config)?;
    match cli.command.unwrap_or(Commands::Run { replay: None }) {
        Commands::Run { replay } => {
            let store = builder.build().context("model declaration rejected")?;
            run_daemon(config, Arc::new(store), replay).await?
        }
        Commands::CheckModel => {
            let store = builder.build().context("model declaration rejected")?;
            for ied in store.roots() {
                println!("{}: {} leaves", ied.name(), ied.leaf_count());
            }
            println!("total: {} leaves", store.leaf_count());
        }
        Commands::DumpModel => {
            print!("{}", builder.declaration().to_toml_string()?);
        }
    }

    Ok(())
}

fn model_builder(config: &AppConfig) -> Result<ModelBuilder> {
    let builder = match &config.model.declaration {
        Some(path) => ModelBuilder::from_declaration(ModelDeclaration::load(path)?),
        None => {
            info!("no model declaration configured; using the built-in relay model");
            relay_model()
        }
    };
    Ok(builder.with_config(&config.model))
}

async fn run_daemon(config: AppConfig, store: Arc<ModelStore>, replay: Option<PathBuf>) -> Result<()> {
    info!(
        leaves = store.leaf_count(),
        name_matching = %store.name_matching(),
        "object model ready"
    );
    let metrics = IedMetrics::new(new_registry())?;

    let (frames_tx, frames_rx) = frame_channel(config.capture.channel_capacity);
    let listener = FrameListener::new(store.clone(), Arc::new(JsonFrameDecoder))
        .with_metrics(metrics.clone())
        .spawn(frames_rx);
    let replay_task = replay.map(|path| {
        let tx = frames_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = replay_frames(&path, tx).await {
                warn!(error = %err, "frame replay failed");
            }
        })
    });

    let simulator = if config.simulation.enabled {
        Some(spawn_relay_simulation(store.clone(), &config.simulation)?)
    } else {
        info!("relay simulation disabled by configuration");
        None
    };

    let api_server = if config.api.enabled {
        let server = RestApiBuilder::new(config.api.listen, QueryPort::new(store.clone()))
            .with_scope(config.api.scope_ied.clone())
            .with_metrics(metrics.clone())
            .spawn()
            .await?;
        Some(server)
    } else {
        info!("rest api disabled by configuration");
        None
    };

    info!("daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    if let Some(server) = api_server {
        server.shutdown().await?;
    }
    if let Some(simulator) = simulator {
        let ticks = simulator.shutdown().await?;
        info!(ticks, "relay simulation stopped");
    }
    if let Some(task) = replay_task {
        task.abort();
    }
    drop(frames_tx);
    let totals = listener.await.context("frame listener task failed")?;
    info!(
        applied = totals.applied,
        skipped = totals.skipped,
        "frame totals"
    );
    Ok(())
}

async fn replay_frames(path: &Path, frames: mpsc::Sender<Bytes>) -> Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("unable to read replay file {}", path.display()))?;
    let mut sent = 0usize;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if frames.send(Bytes::copy_from_slice(line.as_bytes())).await.is_err() {
            break;
        }
        sent += 1;
    }
    info!(path = %path.display(), frames = sent, "frame replay complete");
    Ok(())
}
