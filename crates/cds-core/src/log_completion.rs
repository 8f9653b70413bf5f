//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Bug-report log completion record."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use parking_lot::Mutex;
use strum::{Display, IntoStaticStr};

use crate::error::{CdsError, Result};

/// Reason code reported when the trigger did not supply one.
pub const REASON_CODE_UNUSED: u32 = 0;

/// Source that requested a bug report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum LogIndicator {
    #[default]
    Unused,
    Framework,
    HostDriver,
    Firmware,
    HostOnly,
}

/// Parameters of a bug report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCompletion {
    pub is_fatal: bool,
    pub indicator: LogIndicator,
    pub reason_code: u32,
    pub recovery_needed: bool,
}

impl Default for LogCompletion {
    fn default() -> Self {
        Self {
            is_fatal: false,
            indicator: LogIndicator::Unused,
            reason_code: REASON_CODE_UNUSED,
            recovery_needed: false,
        }
    }
}

#[derive(Debug, Default)]
struct RecordState {
    completion: LogCompletion,
    in_progress: bool,
}

/// Log completion record guarded by a leaf lock: nothing else is ever
/// acquired while it is held.
#[derive(Debug, Default)]
pub struct LogCompletionRecord {
    state: Mutex<RecordState>,
}

impl LogCompletionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&self) {
        *self.state.lock() = RecordState::default();
    }

    pub fn deinit(&self) {
        self.init();
    }

    /// Record a new report; rejected while another report is in progress.
    pub fn set(&self, completion: LogCompletion) -> Result<()> {
        let mut state = self.state.lock();
        if state.in_progress {
            return Err(CdsError::AlreadyInProgress("bug report"));
        }
        state.completion = completion;
        state.in_progress = true;
        Ok(())
    }

    /// Return the current record and reset it to idle.
    pub fn get_and_reset(&self) -> LogCompletion {
        let mut state = self.state.lock();
        let current = state.completion;
        *state = RecordState::default();
        current
    }

    pub fn is_in_progress(&self) -> bool {
        self.state.lock().in_progress
    }

    pub fn indicator(&self) -> LogIndicator {
        self.state.lock().completion.indicator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fatal_firmware() -> LogCompletion {
        LogCompletion {
            is_fatal: true,
            indicator: LogIndicator::Firmware,
            reason_code: 17,
            recovery_needed: true,
        }
    }

    #[test]
    fn second_set_is_rejected_until_reset() {
        let record = LogCompletionRecord::new();
        record.set(fatal_firmware()).unwrap();
        assert!(record.is_in_progress());
        assert!(matches!(
            record.set(LogCompletion::default()),
            Err(CdsError::AlreadyInProgress(_))
        ));

        let taken = record.get_and_reset();
        assert_eq!(taken, fatal_firmware());
        assert!(!record.is_in_progress());
        assert_eq!(record.indicator(), LogIndicator::Unused);
        record.set(LogCompletion::default()).unwrap();
    }

    #[test]
    fn init_returns_to_idle() {
        let record = LogCompletionRecord::new();
        record.set(fatal_firmware()).unwrap();
        record.init();
        assert!(!record.is_in_progress());
        assert_eq!(record.get_and_reset(), LogCompletion::default());
    }
}
