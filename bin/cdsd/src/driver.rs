//! ---
//! cds_section: "05-daemon"
//! cds_subsection: "binary"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Driver load, unload and recovery sequencing for the daemon."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use cds_common::ServicesConfig;
use cds_core::{
    DriverServices, DriverState, GlobalContext, LifecycleMetrics, LifecycleState, Orchestrator,
    RecoveryOutcome, RecoveryRequest, RecoveryTrigger,
};
use cds_metrics::DaemonMetrics;
use cds_sim::SimBench;
use tracing::{error, info, warn};

/// One loaded driver instance wired to the simulated platform.
pub struct DriverInstance {
    services: DriverServices,
    global: Arc<GlobalContext>,
    bench: SimBench,
    orchestrator: Orchestrator,
    recovery: RecoveryTrigger,
    metrics: Option<DaemonMetrics>,
}

impl DriverInstance {
    /// Probe the simulated device and bring the subsystem up to `Enabled`.
    pub fn load(
        config: &ServicesConfig,
        lifecycle: Option<LifecycleMetrics>,
        metrics: Option<DaemonMetrics>,
    ) -> Result<Self> {
        let services = DriverServices::new();
        let global = services.init()?;
        global.apply_diagnostics(&config.diagnostics);

        let bench = SimBench::new();
        bench
            .probe(&global, config.driver.clone())
            .context("simulated bus probe failed")?;
        let collaborators = bench.collaborators();

        let mut orchestrator =
            Orchestrator::new(global.clone(), collaborators.clone(), config.timeouts.clone());
        let mut recovery = RecoveryTrigger::new(
            global.clone(),
            &collaborators,
            config.timeouts.crash_inject_ms,
        );
        if let Some(lifecycle) = lifecycle {
            orchestrator = orchestrator.with_metrics(lifecycle.clone());
            recovery = recovery.with_metrics(lifecycle);
        }

        let mut instance = Self {
            services,
            global,
            bench,
            orchestrator,
            recovery,
            metrics,
        };
        instance.global.set_driver_state(DriverState::LOADING);
        instance.publish_state();
        if let Err(err) = instance.bring_up() {
            error!(error = %err, "driver load failed; tearing down");
            instance.global.clear_driver_state(DriverState::LOADING);
            instance.unload_inner();
            return Err(err);
        }
        instance.global.clear_driver_state(DriverState::LOADING);
        instance.global.set_driver_state(DriverState::LOADED);
        instance.publish_state();
        info!(
            instance = instance.global.token(),
            "driver loaded and enabled"
        );
        Ok(instance)
    }

    fn bring_up(&mut self) -> Result<()> {
        self.orchestrator.open()?;
        self.orchestrator.pre_enable()?;
        self.orchestrator.enable()?;
        Ok(())
    }

    pub fn state(&self) -> LifecycleState {
        self.orchestrator.state()
    }

    /// Request recovery and, when work gets scheduled, run it in place:
    /// re-enter the lifecycle and bring it back up to `Enabled`.
    pub fn recover(&mut self, request: RecoveryRequest) -> Result<RecoveryOutcome> {
        let outcome = self.recovery.trigger(request)?;
        info!(outcome = %outcome, "recovery requested");
        self.publish_state();
        if outcome != RecoveryOutcome::Scheduled {
            return Ok(outcome);
        }

        let report = self.orchestrator.reenter_after_recovery()?;
        if !report.is_clean() {
            warn!(
                failed_steps = ?report.failed_steps(),
                "tear-down during recovery was incomplete"
            );
        }
        self.orchestrator.pre_enable()?;
        self.orchestrator.enable()?;
        self.orchestrator.finish_recovery();
        self.publish_state();
        Ok(outcome)
    }

    /// Tear everything down and release the driver services.
    pub fn unload(mut self) {
        self.global.clear_driver_state(DriverState::LOADED);
        self.unload_inner();
        info!("driver unloaded");
    }

    fn unload_inner(&mut self) {
        self.global.set_driver_state(DriverState::UNLOADING);
        self.publish_state();

        if self.orchestrator.state() == LifecycleState::Enabled {
            Self::log_report(self.orchestrator.disable());
        }
        if self.orchestrator.state().permits(cds_core::Transition::PostDisable) {
            Self::log_report(self.orchestrator.post_disable());
        }
        Self::log_report(self.orchestrator.close());

        if let Err(err) = self.bench.remove(&self.global) {
            warn!(error = %err, "simulated device removal failed");
        }
        self.global.clear_driver_state(DriverState::UNLOADING);
        self.publish_state();
        self.services.deinit();
    }

    fn log_report(report: cds_core::Result<cds_core::TeardownReport>) {
        match report {
            Ok(report) if !report.is_clean() => warn!(
                transition = %report.transition(),
                failed_steps = ?report.failed_steps(),
                "tear-down completed with failures"
            ),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "tear-down transition rejected"),
        }
    }

    fn publish_state(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_driver_state(self.global.driver_state().get().bits());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cds_sim::fast_timeouts;

    fn config() -> ServicesConfig {
        ServicesConfig {
            timeouts: fast_timeouts(),
            ..ServicesConfig::default()
        }
    }

    #[test]
    fn unload_tears_down_after_recovery() {
        cds_logging::init();
        let mut instance = DriverInstance::load(&config(), None, None).unwrap();
        assert_eq!(instance.state(), LifecycleState::Enabled);

        let outcome = instance
            .recover(RecoveryRequest {
                skip_crash_injection: true,
            })
            .unwrap();
        assert_eq!(outcome, RecoveryOutcome::Scheduled);
        assert_eq!(instance.state(), LifecycleState::Enabled);
        assert!(!instance.global.driver_state().is_recovering());

        let global = instance.global.clone();
        let journal = instance.bench.journal.clone();
        instance.unload();
        assert!(!global.is_live());
        assert_eq!(journal.count("dispatcher.psoc_close"), 2);
        assert!(
            journal.outstanding().is_empty(),
            "leaked: {:?}",
            journal.outstanding()
        );
    }
}
