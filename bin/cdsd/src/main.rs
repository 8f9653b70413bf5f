//! ---
//! cds_section: "05-daemon"
//! cds_subsection: "binary"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Binary entrypoint for the driver services daemon."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use cds_common::logging::init_tracing;
use cds_common::ServicesConfig;
use cds_core::{LifecycleMetrics, RecoveryRequest};
use cds_logging::{cds_info, LogContext};
use cds_metrics::{new_registry, spawn_http_server, DaemonMetrics, MetricsServer, SharedRegistry};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::task;
use tracing::{info, warn};

mod driver;

use driver::DriverInstance;

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("cdsd ", env!("CARGO_PKG_VERSION")),
    about = "Connectivity driver services daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Load the driver and keep it enabled until ctrl-c")]
    Run,
    #[command(about = "Run repeated load/unload cycles")]
    Cycle {
        #[arg(long, default_value_t = 1, help = "Number of cycles to run")]
        count: u32,
    },
    #[command(about = "Load the driver, request self-recovery and unload")]
    Recover {
        #[arg(long, help = "Schedule recovery without asking the firmware to crash")]
        skip_crash_inject: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/example.toml"));

    let load_started = Instant::now();
    let loaded = ServicesConfig::load_with_source(&candidates)?;
    let load_duration = load_started.elapsed();
    let config = loaded.config;

    let registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(registry.clone())?;
    daemon_metrics.observe_config_load(load_duration.as_secs_f64());
    daemon_metrics.inc_start();
    let profile = if cfg!(debug_assertions) { "debug" } else { "release" };
    daemon_metrics.set_build_info(env!("CARGO_PKG_VERSION"), profile);

    init_tracing("cdsd", &config.logging)?;
    info!(
        source = %loaded.source.display(),
        mode = ?config.driver.mode,
        "configuration loaded"
    );

    let metrics_server = start_metrics(&config, registry.clone())?;
    let lifecycle = match &metrics_server {
        Some(_) => Some(LifecycleMetrics::new(registry.clone())?),
        None => None,
    };

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, lifecycle, daemon_metrics).await,
        Commands::Cycle { count } => cycle(config, count, lifecycle, daemon_metrics).await,
        Commands::Recover { skip_crash_inject } => {
            recover(config, skip_crash_inject, lifecycle, daemon_metrics).await
        }
    };

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    result
}

fn start_metrics(config: &ServicesConfig, registry: SharedRegistry) -> Result<Option<MetricsServer>> {
    if !config.metrics.enabled {
        info!("metrics exporter disabled by configuration");
        return Ok(None);
    }
    let server = spawn_http_server(registry, config.metrics.listen)?;
    info!(address = %server.addr(), "metrics exporter enabled");
    Ok(Some(server))
}

async fn run(
    config: ServicesConfig,
    lifecycle: Option<LifecycleMetrics>,
    metrics: DaemonMetrics,
) -> Result<()> {
    let instance = task::spawn_blocking(move || DriverInstance::load(&config, lifecycle, Some(metrics)))
        .await
        .context("driver load task failed")??;
    info!(state = %instance.state(), "daemon running; waiting for termination signal");

    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    task::spawn_blocking(move || instance.unload())
        .await
        .context("driver unload task failed")?;
    Ok(())
}

async fn cycle(
    config: ServicesConfig,
    count: u32,
    lifecycle: Option<LifecycleMetrics>,
    metrics: DaemonMetrics,
) -> Result<()> {
    let failures = task::spawn_blocking(move || {
        let mut failures = 0u32;
        for iteration in 1..=count {
            match DriverInstance::load(&config, lifecycle.clone(), Some(metrics.clone())) {
                Ok(instance) => {
                    instance.unload();
                    metrics.record_cycle(true);
                    let ctx = LogContext::new()
                        .with_module("cdsd")
                        .with_cycle(u64::from(iteration));
                    cds_info!(context = ctx, "cycle completed");
                }
                Err(err) => {
                    metrics.record_cycle(false);
                    failures += 1;
                    warn!(iteration, error = %err, "cycle failed");
                }
            }
        }
        failures
    })
    .await
    .context("cycle task failed")?;

    if failures > 0 {
        anyhow::bail!("{} of {} cycles failed", failures, count);
    }
    Ok(())
}

async fn recover(
    config: ServicesConfig,
    skip_crash_inject: bool,
    lifecycle: Option<LifecycleMetrics>,
    metrics: DaemonMetrics,
) -> Result<()> {
    task::spawn_blocking(move || -> Result<()> {
        let mut instance = DriverInstance::load(&config, lifecycle, Some(metrics))?;
        let outcome = instance.recover(RecoveryRequest {
            skip_crash_injection: skip_crash_inject,
        });
        instance.unload();
        let outcome = outcome?;
        info!(outcome = %outcome, "recovery request finished");
        Ok(())
    })
    .await
    .context("recovery task failed")?
}
