//! SmartDash dashboard
//!
//! Usage: smartdash [--config <path>] [--port <dev> | --demo] [--data-dir <dir>]
//!        smartdash --list-ports
//!
//! Runs the acquisition side and the UI frame loop. Touch input is read from
//! stdin when no display is attached. Exits non-zero on a fatal acquisition
//! error so the process supervisor restarts it.

mod headless;
mod input;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use smartdash_core::config::{DashConfig, LinkConfig};
use smartdash_core::dashboard::Dashboard;
use smartdash_core::link::{list_ports, PortInfo, DEFAULT_BAUD_RATE};
use smartdash_core::performance::PerformanceTracker;
use smartdash_core::runtime::{Runtime, RuntimeConfig};
use smartdash_core::scheduler::CadenceConfig;
use smartdash_core::telemetry::SharedTelemetryState;

use headless::HeadlessRenderer;

#[derive(Parser, Debug)]
#[command(name = "smartdash")]
#[command(about = "OBD-II touchscreen dashboard", version)]
struct Args {
    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port of the adapter, overrides the configured link
    #[arg(short, long, conflicts_with = "demo")]
    port: Option<String>,

    /// Use the simulated vehicle
    #[arg(long)]
    demo: bool,

    /// Print candidate adapter ports and exit
    #[arg(long, conflicts_with_all = ["port", "demo"])]
    list_ports: bool,

    /// Directory for settings and the capability cache
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Adapt batch cadence to measured link latency
    #[arg(long)]
    adaptive: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn port_line(port: &PortInfo) -> String {
    match &port.product {
        Some(product) => format!("{}\t{}", port.name, product),
        None => port.name.clone(),
    }
}

fn load_config(args: &Args) -> Result<DashConfig> {
    let mut config = match args.config.as_ref().cloned().or_else(DashConfig::default_path) {
        Some(path) => DashConfig::load(&path).with_context(|| format!("loading {}", path.display()))?,
        None => DashConfig::default(),
    };

    if let Some(port) = &args.port {
        config.link = LinkConfig::Serial {
            port: port.clone(),
            baud_rate: DEFAULT_BAUD_RATE,
        };
    }
    if args.demo {
        config.link = LinkConfig::Demo { engine_running: true };
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if args.adaptive {
        config.cadence = CadenceConfig::Adaptive;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list_ports {
        let ports = list_ports();
        if ports.is_empty() {
            warn!("no serial ports found");
        }
        for port in &ports {
            println!("{}", port_line(port));
        }
        return Ok(());
    }

    let config = load_config(&args)?;
    let data_dir = config.data_dir().context("resolving data directory")?;
    info!(
        version = smartdash_core::VERSION,
        link = ?config.link,
        data_dir = %data_dir.display(),
        "SmartDash starting"
    );

    let state = Arc::new(SharedTelemetryState::default());
    let mut dashboard = Dashboard::open(
        &data_dir,
        state.clone(),
        config.navigation(),
        PerformanceTracker::new(config.performance_stop_after),
        HeadlessRenderer::new(),
    );

    let runtime_config = RuntimeConfig::from_dash_config(&config)?;
    let mut runtime = Runtime::start(runtime_config, config.link.connector(), state).await;

    let (tx, mut events) = mpsc::unbounded_channel();
    tokio::spawn(input::read_stdin(tx));

    let mut frames = tokio::time::interval(config.frame_interval());
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let outcome = loop {
        tokio::select! {
            result = runtime.wait() => break result.map(|()| None),
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break Ok(None);
            }
            Some(event) = events.recv() => {
                if let Some(reason) = dashboard.handle(event, Instant::now()) {
                    break Ok(Some(reason));
                }
            }
            _ = frames.tick() => {
                if let Some(reason) = dashboard.frame(Instant::now()) {
                    break Ok(Some(reason));
                }
            }
        }
    };

    if let Err(e) = dashboard.persist() {
        warn!(error = %e, "failed to save settings on exit");
    }
    runtime.shutdown().await;

    if let Some(reason) = outcome.context("telemetry acquisition failed")? {
        info!(%reason, "dashboard exiting");
    }
    Ok(())
}
