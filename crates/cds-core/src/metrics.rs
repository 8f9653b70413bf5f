//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Prometheus instrumentation for lifecycle transitions and recovery."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::Result;
use cds_logging::LifecycleOutcome;
use cds_metrics::SharedRegistry;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

/// Metrics published by the orchestrator and the recovery trigger.
#[derive(Clone, Debug)]
pub struct LifecycleMetrics {
    registry: SharedRegistry,
    transitions_total: IntCounterVec,
    rollback_steps_total: IntCounterVec,
    transition_seconds: HistogramVec,
    recovery_requests_total: IntCounterVec,
}

impl LifecycleMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let transitions_total = IntCounterVec::new(
            Opts::new(
                "cds_lifecycle_transitions_total",
                "Lifecycle transitions attempted, by transition and outcome",
            ),
            &["transition", "outcome"],
        )?;
        registry.register(Box::new(transitions_total.clone()))?;

        let rollback_steps_total = IntCounterVec::new(
            Opts::new(
                "cds_lifecycle_rollback_steps_total",
                "Undo actions executed while rolling back a failed transition",
            ),
            &["transition"],
        )?;
        registry.register(Box::new(rollback_steps_total.clone()))?;

        let transition_seconds = HistogramVec::new(
            HistogramOpts::new(
                "cds_lifecycle_transition_seconds",
                "Wall-clock duration of lifecycle transitions",
            )
            .buckets(prometheus::exponential_buckets(0.0005, 2.0, 16)?),
            &["transition"],
        )?;
        registry.register(Box::new(transition_seconds.clone()))?;

        let recovery_requests_total = IntCounterVec::new(
            Opts::new(
                "cds_recovery_requests_total",
                "Recovery trigger requests by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(recovery_requests_total.clone()))?;

        Ok(Self {
            registry,
            transitions_total,
            rollback_steps_total,
            transition_seconds,
            recovery_requests_total,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_transition(&self, transition: &str, outcome: LifecycleOutcome, elapsed: Duration) {
        self.transitions_total
            .with_label_values(&[transition, outcome.as_str()])
            .inc();
        self.transition_seconds
            .with_label_values(&[transition])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_rollback(&self, transition: &str, steps: usize) {
        self.rollback_steps_total
            .with_label_values(&[transition])
            .inc_by(steps as u64);
    }

    pub fn record_recovery(&self, outcome: &str) {
        self.recovery_requests_total
            .with_label_values(&[outcome])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_labelled() {
        let registry = cds_metrics::new_registry();
        let metrics = LifecycleMetrics::new(registry.clone()).unwrap();
        metrics.record_transition("open", LifecycleOutcome::Success, Duration::from_millis(3));
        metrics.record_rollback("open", 4);
        metrics.record_recovery("scheduled");

        let families = registry.gather();
        let rollback = families
            .iter()
            .find(|f| f.get_name() == "cds_lifecycle_rollback_steps_total")
            .unwrap();
        assert_eq!(rollback.get_metric()[0].get_counter().get_value() as u64, 4);
    }
}
