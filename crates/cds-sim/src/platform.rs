//! ---
//! cds_section: "04-simulation"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Simulated platform services."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::sync::Arc;

use cds_core::{CollabResult, ContextHandle, Platform, RecoveryReason};
use parking_lot::Mutex;
use tracing::info;

use crate::journal::Journal;

#[derive(Debug)]
pub struct SimPlatform {
    journal: Arc<Journal>,
    recoveries: Mutex<Vec<RecoveryReason>>,
}

impl SimPlatform {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            recoveries: Mutex::new(Vec::new()),
        }
    }

    /// Reasons passed to every successful recovery schedule, in order.
    pub fn scheduled_recoveries(&self) -> Vec<RecoveryReason> {
        self.recoveries.lock().clone()
    }
}

impl Platform for SimPlatform {
    fn timer_module_init(&self) {
        self.journal.record("platform.timer_init");
        self.journal.acquire("timer_module");
    }

    fn timer_module_deinit(&self) {
        self.journal.record("platform.timer_deinit");
        self.journal.release("timer_module");
    }

    fn acquire_suspend_lock(&self, _name: &'static str) -> CollabResult {
        self.journal.call("platform.acquire_suspend_lock")?;
        self.journal.acquire("suspend_lock");
        Ok(())
    }

    fn release_suspend_lock(&self, _name: &'static str) {
        self.journal.record("platform.release_suspend_lock");
        self.journal.release("suspend_lock");
    }

    fn schedule_recovery_work(&self, _device: &ContextHandle, reason: RecoveryReason) -> CollabResult {
        self.journal.call("platform.schedule_recovery")?;
        info!(reason = %reason, "simulated recovery work scheduled");
        self.recoveries.lock().push(reason);
        Ok(())
    }

    fn shutdown_notifier_purge(&self) {
        self.journal.record("platform.shutdown_notifier_purge");
    }

    fn flush_host_logs(&self) {
        self.journal.record("platform.flush_host_logs");
    }
}
