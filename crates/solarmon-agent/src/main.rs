//! Solarmon Agent
//!
//! Samples solar shunt sensors and host metrics on a fixed period and
//! uploads them to InfluxDB, signalling faults on a status indicator.

mod config;
mod delta;
mod driver;
mod error;
mod fault;
mod sensors;
mod startup;
mod upload;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, IndicatorConfig};
use driver::{LoopDriver, LoopSettings, RunMode};
use error::AgentError;
use fault::{Fault, FaultHandler, FaultLog};
use sensors::{ChannelAverager, HardwareSampler, Sampler, SyntheticSampler};
use solarmon_hw::{GpioIndicator, Indicator, NullIndicator, SysfsIndicator};
use upload::Backend;

#[derive(Parser)]
#[command(name = "solarmond")]
#[command(about = "Solar generation telemetry agent")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(default_value = "config/default.toml")]
    config: String,

    /// Use the synthetic sampler instead of the sensors
    #[arg(long)]
    synthetic: bool,

    /// Run until stopped
    #[arg(long, conflicts_with = "iterations")]
    endless: bool,

    /// Stop after this many iterations
    #[arg(long)]
    iterations: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config).context("Failed to load configuration")?;
    info!("Loaded configuration from: {}", args.config);
    config.method.synthetic |= args.synthetic;
    config.time.endless |= args.endless;

    // The log has to exist before anything else can fail
    let log = FaultLog::open(&config.log.path, config.log.max_bytes)
        .with_context(|| format!("Failed to open fault log {}", config.log.path))?;
    info!("Fault log: {}", log.path().display());

    let faults = FaultHandler::new(log, open_indicator(&config.indicator));

    match run(config, args.iterations, faults).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!("Agent stopped: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Opens the configured status light, or a no-op one if it is unavailable.
fn open_indicator(config: &IndicatorConfig) -> Box<dyn Indicator> {
    if let Some(pin) = config.gpio_pin {
        match GpioIndicator::new(pin) {
            Ok(indicator) => return Box::new(indicator),
            Err(e) => warn!("Status light on GPIO {} unavailable: {}", pin, e),
        }
    } else if !config.path.is_empty() {
        return Box::new(SysfsIndicator::new(&config.path));
    }
    info!("Running without a status light");
    Box::new(NullIndicator)
}

/// Records a Critical fault and returns the matching error.
async fn abort(faults: &mut FaultHandler, message: String) -> Result<(), AgentError> {
    faults.raise(Fault::critical(message.clone())).await;
    Err(AgentError::Critical(message))
}

/// Builds the backend and sampler, then drives the loop until it ends.
async fn run(
    config: Config,
    iterations: Option<u64>,
    mut faults: FaultHandler,
) -> Result<(), AgentError> {
    let backend = match Backend::from_config(&config) {
        Ok(backend) => backend,
        Err(e) => return abort(&mut faults, format!("Backend is not configured: {}", e)).await,
    };
    info!(
        "Uploading to {} InfluxDB",
        if config.method.cloud { "cloud" } else { "local" }
    );

    startup::run_checks(&mut faults, backend.endpoint()).await;

    let sampler: Box<dyn Sampler> = if config.method.synthetic {
        info!("Using synthetic sampler");
        Box::new(SyntheticSampler::new())
    } else {
        match HardwareSampler::open(&config.sensors) {
            Ok(sampler) => Box::new(sampler),
            Err(e) => {
                return abort(
                    &mut faults,
                    format!("Sensors could not be initialised: {}", e),
                )
                .await
            }
        }
    };

    let mode = if config.time.endless {
        RunMode::Endless
    } else {
        RunMode::Bounded(iterations.unwrap_or_else(|| config.time.iterations()))
    };
    let settings = LoopSettings {
        period: config.time.period_secs,
        stall_limit: config.time.stall_limit_secs,
        mode,
    };

    let mut driver = LoopDriver::new(
        sampler,
        backend,
        faults,
        ChannelAverager::from_config(&config.sensors),
        settings,
    );

    let finished = tokio::select! {
        result = driver.run() => result.map(Some)?,
        signal = shutdown_signal() => {
            info!("Received {}, shutting down", signal);
            None
        }
    };

    let summary = finished.unwrap_or_else(|| driver.summary());
    info!(
        "Run complete: {} iterations, {} snapshots, faults: {}",
        summary.iterations, summary.snapshots, summary.faults
    );
    Ok(())
}

/// Resolves on SIGINT or SIGTERM with the signal name.
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        _ => {
            error!("Failed to install signal handlers");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}
