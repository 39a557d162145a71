//! eagle_eye - frame analysis server
//!
//! This daemon:
//! 1. Loads configuration (file + EAGLE_* environment)
//! 2. Builds the plate pipeline over the configured localizer and recognizer
//! 3. Serves `/ws/stream`, `/analyze`, and `/health` until Ctrl-C
//! 4. Shuts detectors and the worker pool down explicitly

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use eagle_eye::server::{Server, ServerConfig};
use eagle_eye::{build_orchestrator, build_registry, BackpressurePolicy, ServiceConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Eagle-Eye per-frame detection server")]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "EAGLE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config.
    #[arg(long)]
    listen: Option<String>,

    /// Detector worker threads, overriding the config.
    #[arg(long)]
    workers: Option<usize>,

    /// Backpressure policy for overlapping frames (queue_one or reject).
    #[arg(long)]
    backpressure: Option<BackpressurePolicy>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ServiceConfig::load_from(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(workers) = args.workers {
        config.worker_threads = workers;
    }
    if let Some(policy) = args.backpressure {
        config.session.backpressure = policy;
    }
    config.validate()?;

    log::info!(
        "eagle_eye {} starting: {:?} frames, {:?}, {} workers, detector timeout {:?}, frame deadline {:?}",
        env!("CARGO_PKG_VERSION"),
        config.session.inbound_format,
        config.session.backpressure,
        config.worker_threads,
        config.limits.detector_timeout,
        config.limits.frame_deadline
    );

    let registry = build_registry(&config)?;
    registry.warm_up()?;
    log::info!("detectors: {}", registry.list().join(", "));
    let orchestrator = build_orchestrator(&config, registry)?;

    let server_config = ServerConfig {
        addr: config.listen_addr.clone(),
        session: config.session,
    };
    let handle = Server::new(server_config, orchestrator.clone()).spawn()?;
    log::info!("eagle_eye listening on {}", handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("install Ctrl-C handler")?;

    log::info!("eagle_eye waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!(
        "shutdown signal received, closing {} session(s)...",
        handle.active_sessions()
    );
    handle.stop()?;

    orchestrator.pool().close();
    orchestrator.registry().shutdown();
    log::info!(
        "eagle_eye stopped ({} pool saturation events)",
        orchestrator.pool().saturation_events()
    );
    Ok(())
}
