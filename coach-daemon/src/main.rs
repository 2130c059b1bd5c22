//! Coaching daemon.
//!
//! Ingests pose frames from an upstream source, runs the real-time
//! coaching engine against a trained reference model, and fans coaching
//! payloads out to any number of dashboard subscribers over SSE.

mod api;
mod cli;
mod config;
mod error;
mod fanout;
mod sink;
mod wire;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coach_core::engine::CoachingEngine;
use coach_core::model::ReferenceModel;
use coach_core::registry;

use config::DaemonConfig;
use sink::SessionSink;

#[derive(Parser, Debug)]
#[command(name = "coachd")]
#[command(about = "Real-time form-coaching stream daemon")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "coachd.config.json")]
    config: PathBuf,

    /// HTTP port for /subscribe, /health, /status, /shutdown
    #[arg(short, long)]
    port: Option<u16>,

    /// Verbose (debug-level) logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the daemon (default when no subcommand is given)
    Start,
    /// Check daemon status
    Status,
    /// Stop a running daemon
    Stop,
    /// Train a reference model from a corpus file, or scan a directory of
    /// corpora and train whichever models are missing
    Train {
        /// Path to a reference corpus JSON, or a directory of them (§6
        /// corpus payload); directory mode ignores `--exercise` and reads
        /// each file's own `exercise` field
        corpus: PathBuf,
        /// Exercise name, short code, or alias (ignored in directory mode)
        #[arg(short, long)]
        exercise: Option<String>,
        /// Directory to write trained models into
        #[arg(short, long, default_value = "models")]
        out: PathBuf,
        /// Skip training if a model for this exercise already exists
        #[arg(long)]
        skip_if_present: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            format!("coach_daemon={level},coach_core={level}", level = log_level)
        })))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = if args.config.exists() {
        DaemonConfig::load(&args.config)?
    } else {
        tracing::info!(path = %args.config.display(), "no config found, using defaults");
        DaemonConfig::default()
    };
    if let Some(port) = args.port {
        config.http_port = port;
    }

    match args.command {
        Some(Command::Status) => cli::show_status(config.http_port).await,
        Some(Command::Stop) => cli::stop_daemon(config.http_port).await,
        Some(Command::Train { corpus, exercise, out, skip_if_present }) => {
            if corpus.is_dir() {
                cli::train_missing_from_dir(&corpus, &out)
            } else {
                let exercise = exercise
                    .ok_or_else(|| anyhow::anyhow!("--exercise is required when training a single corpus file"))?;
                if skip_if_present {
                    cli::ensure_model_exists(&corpus, &exercise, &out)
                } else {
                    cli::train(&corpus, &exercise, &out)
                }
            }
        }
        Some(Command::Start) | None => start(config).await,
    }
}

async fn start(config: DaemonConfig) -> Result<()> {
    let spec = registry::resolve(&config.exercise)?;
    let base = config.models_dir.join(format!("{}_reference_model", spec.key.as_str()));
    let model = ReferenceModel::load(&base).map_err(|e| {
        anyhow::anyhow!(
            "no reference model for '{}' at {} ({e}); train one with `coachd train <corpus.json> --exercise {}`",
            spec.display_name,
            base.display(),
            config.exercise,
        )
    })?;

    let engine = CoachingEngine::new(Arc::new(model), config.engine.clone());

    let sink = match &config.session_db_path {
        Some(path) => Some(Arc::new(SessionSink::open(path, config.session_sink_interval)?)),
        None => None,
    };

    tracing::info!(
        exercise = spec.display_name,
        ingest_url = %config.ingest_url,
        port = config.http_port,
        "starting coaching daemon",
    );

    let (state, tasks) = fanout::spawn(config.clone(), engine, sink);

    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", config.http_port)).await?;
    tracing::info!(port = config.http_port, "coaching daemon ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in tasks {
        task.abort();
    }

    tracing::info!("coaching daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
