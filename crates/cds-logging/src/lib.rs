//! ---
//! cds_section: "02-observability"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Structured logging context and lifecycle event helpers."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Logging helpers shared by the lifecycle orchestrator, the recovery trigger and
//! the daemon. Events carry `module`, `transition`, `state` and `cycle` fields so
//! a bring-up can be followed across threads in the JSON output.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Install a development subscriber (stdout, `RUST_LOG` filter, `info` floor).
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_test_writer())
        .try_init();
}

/// Context attached to log events by the `cds_*` macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogContext<'a> {
    /// Module or collaborator the event concerns.
    pub module: Option<&'a str>,
    /// Lifecycle transition in flight (`open`, `pre_enable`, ...).
    pub transition: Option<&'a str>,
    /// Lifecycle state observed when the event was emitted.
    pub state: Option<&'a str>,
    /// Bring-up cycle counter maintained by the daemon.
    pub cycle: Option<u64>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a module name.
    pub fn with_module(mut self, module: &'a str) -> Self {
        self.module = Some(module);
        self
    }

    /// Attach a transition name.
    pub fn with_transition(mut self, transition: &'a str) -> Self {
        self.transition = Some(transition);
        self
    }

    /// Attach the current lifecycle state.
    pub fn with_state(mut self, state: &'a str) -> Self {
        self.state = Some(state);
        self
    }

    /// Attach a cycle counter.
    pub fn with_cycle(mut self, cycle: u64) -> Self {
        self.cycle = Some(cycle);
        self
    }
}

/// Result recorded for a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The transition or operation completed.
    Success,
    /// The transition failed, rolled back or completed with faults.
    Fault,
}

impl LifecycleOutcome {
    /// Label used for log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleOutcome::Success => "success",
            LifecycleOutcome::Fault => "fault",
        }
    }
}

/// Emit a lifecycle event at `info` for success and `error` for faults.
pub fn log_lifecycle_event(
    context: Option<&LogContext<'_>>,
    event: &str,
    message: &str,
    outcome: LifecycleOutcome,
) {
    let ctx = context.copied().unwrap_or_default();
    match outcome {
        LifecycleOutcome::Success => tracing::info!(
            event,
            outcome = outcome.as_str(),
            module = ctx.module.unwrap_or(""),
            transition = ctx.transition.unwrap_or(""),
            state = ctx.state.unwrap_or(""),
            message = %message
        ),
        LifecycleOutcome::Fault => tracing::error!(
            event,
            outcome = outcome.as_str(),
            module = ctx.module.unwrap_or(""),
            transition = ctx.transition.unwrap_or(""),
            state = ctx.state.unwrap_or(""),
            message = %message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = LogContext::new()
            .with_module("mac")
            .with_transition("open");
        cds_info!(context = ctx, "module opened");
        cds_debug!("debug message");
        cds_error!(context = ctx.with_state("opened"), "status code: {}", 7);
    }

    #[test]
    fn lifecycle_helper_emits() {
        init();
        let ctx = LogContext::new().with_transition("close").with_cycle(3);
        log_lifecycle_event(
            Some(&ctx),
            "lifecycle.close",
            "close completed",
            LifecycleOutcome::Success,
        );
        log_lifecycle_event(None, "lifecycle.open", "open rolled back", LifecycleOutcome::Fault);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(LifecycleOutcome::Success.as_str(), "success");
        assert_eq!(LifecycleOutcome::Fault.as_str(), "fault");
    }
}
