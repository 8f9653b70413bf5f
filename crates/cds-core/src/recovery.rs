//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Self-recovery trigger: crash injection with escalation to recovery work."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use strum::{Display, IntoStaticStr};
use tracing::{error, info, warn};

use crate::collaborators::{Collaborators, Platform, RadioInterface, RecoveryReason};
use crate::context::ContextHandle;
use crate::driver_state::DriverState;
use crate::error::{CdsError, CollabResultExt, Component, Result};
use crate::global::GlobalContext;
use crate::metrics::LifecycleMetrics;
use crate::module::ModuleId;

/// Suspend lock held for the duration of a recovery request.
pub const RECOVERY_SUSPEND_LOCK: &str = "cds_recovery";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryRequest {
    /// Go straight to recovery work instead of asking the firmware to crash.
    pub skip_crash_injection: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Firmware acknowledged the injected crash; its own crash path recovers.
    Acknowledged,
    /// Recovery work was scheduled by this request.
    Scheduled,
    /// Another request already moved the driver into recovery.
    AlreadyInProgress,
}

/// Requests self-recovery of the subsystem.
pub struct RecoveryTrigger {
    global: Arc<GlobalContext>,
    radio: Arc<dyn RadioInterface>,
    platform: Arc<dyn Platform>,
    crash_inject_timeout: Duration,
    metrics: Option<LifecycleMetrics>,
}

impl RecoveryTrigger {
    pub fn new(
        global: Arc<GlobalContext>,
        collaborators: &Collaborators,
        crash_inject_timeout: Duration,
    ) -> Self {
        Self {
            global,
            radio: collaborators.radio.clone(),
            platform: collaborators.platform.clone(),
            crash_inject_timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: LifecycleMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Ask the firmware to crash and wait for its acknowledgement, escalating
    /// to scheduled recovery work when it does not answer in time. At most one
    /// of any number of concurrent requests schedules recovery work.
    pub fn trigger(&self, request: RecoveryRequest) -> Result<RecoveryOutcome> {
        let result = self.run(request);
        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(outcome) => {
                    let label: &'static str = (*outcome).into();
                    metrics.record_recovery(label)
                }
                Err(_) => metrics.record_recovery("error"),
            }
        }
        result
    }

    fn run(&self, request: RecoveryRequest) -> Result<RecoveryOutcome> {
        self.global
            .require_context(ModuleId::RadioInterface)
            .map_err(|err| {
                error!("radio interface context is missing; cannot trigger recovery");
                err
            })?;
        let device = self.global.require_context(ModuleId::Device)?;

        let _lock = SuspendGuard::acquire(self.platform.as_ref(), RECOVERY_SUSPEND_LOCK)?;

        if request.skip_crash_injection {
            info!("skipping crash injection; scheduling recovery directly");
            return self.escalate(&device, RecoveryReason::Default);
        }

        let ack = self.global.recovery_event();
        ack.reset();
        if let Err(err) = self.radio.crash_inject() {
            error!(error = %err, "crash injection failed");
            return self.escalate(&device, RecoveryReason::Default);
        }

        match ack.wait(self.crash_inject_timeout) {
            Ok(()) => {
                info!("firmware acknowledged crash injection");
                Ok(RecoveryOutcome::Acknowledged)
            }
            Err(err) => {
                error!(
                    error = %err,
                    timeout_ms = self.crash_inject_timeout.as_millis() as u64,
                    "no crash injection acknowledgement from firmware"
                );
                self.escalate(&device, RecoveryReason::CrashInjectTimeout)
            }
        }
    }

    fn escalate(&self, device: &ContextHandle, reason: RecoveryReason) -> Result<RecoveryOutcome> {
        if !self.global.driver_state().try_set(DriverState::RECOVERING) {
            info!("Recovery is in progress, ignore!");
            return Ok(RecoveryOutcome::AlreadyInProgress);
        }
        if let Err(source) = self.platform.schedule_recovery_work(device, reason) {
            self.global.clear_driver_state(DriverState::RECOVERING);
            return Err(CdsError::collaborator(
                Component::Platform,
                "schedule recovery work",
                source,
            ));
        }
        warn!(reason = %reason, "recovery work scheduled");
        Ok(RecoveryOutcome::Scheduled)
    }
}

impl std::fmt::Debug for RecoveryTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryTrigger")
            .field("crash_inject_timeout", &self.crash_inject_timeout)
            .finish_non_exhaustive()
    }
}

/// Holds a platform suspend lock until dropped.
struct SuspendGuard<'a> {
    platform: &'a dyn Platform,
    name: &'static str,
}

impl<'a> SuspendGuard<'a> {
    fn acquire(platform: &'a dyn Platform, name: &'static str) -> Result<Self> {
        platform
            .acquire_suspend_lock(name)
            .component(Component::Platform, "acquire suspend lock")?;
        Ok(Self { platform, name })
    }
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        self.platform.release_suspend_lock(self.name);
    }
}
