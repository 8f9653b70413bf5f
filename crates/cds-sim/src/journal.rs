//! ---
//! cds_section: "04-simulation"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Call journal, failure injection and resource accounting."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use cds_core::{CollabResult, CollaboratorError};
use parking_lot::Mutex;
use tracing::debug;

/// Shared record of every simulated collaborator call.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Mutex<Vec<&'static str>>,
    failures: Mutex<HashSet<&'static str>>,
    outstanding: Mutex<BTreeMap<&'static str, i64>>,
}

impl Journal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, operation: &'static str) {
        self.entries.lock().push(operation);
    }

    /// Record `operation` and fail it if a failure was injected for it.
    pub fn call(&self, operation: &'static str) -> CollabResult {
        self.record(operation);
        if self.failures.lock().contains(operation) {
            debug!(operation, "injected failure");
            return Err(CollaboratorError::new(format!(
                "injected failure in {}",
                operation
            )));
        }
        Ok(())
    }

    /// Make every later call to `operation` fail.
    pub fn fail(&self, operation: &'static str) {
        self.failures.lock().insert(operation);
    }

    pub fn heal(&self, operation: &'static str) {
        self.failures.lock().remove(operation);
    }

    pub fn heal_all(&self) {
        self.failures.lock().clear();
    }

    pub fn entries(&self) -> Vec<&'static str> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn count(&self, operation: &str) -> usize {
        self.entries.lock().iter().filter(|e| **e == operation).count()
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.count(operation) > 0
    }

    /// Index of the first call to `operation`.
    pub fn position(&self, operation: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| *e == operation)
    }

    pub fn acquire(&self, resource: &'static str) {
        *self.outstanding.lock().entry(resource).or_insert(0) += 1;
    }

    pub fn release(&self, resource: &'static str) {
        *self.outstanding.lock().entry(resource).or_insert(0) -= 1;
    }

    /// Resources whose acquire and release counts differ.
    pub fn outstanding(&self) -> Vec<(&'static str, i64)> {
        self.outstanding
            .lock()
            .iter()
            .filter(|(_, count)| **count != 0)
            .map(|(resource, count)| (*resource, *count))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_failures_and_accounting() {
        let journal = Journal::new();
        journal.fail("mac.open");
        assert!(journal.call("mac.open").is_err());
        assert!(journal.call("mac.start").is_ok());
        journal.heal("mac.open");
        assert!(journal.call("mac.open").is_ok());
        assert_eq!(journal.count("mac.open"), 2);
        assert_eq!(journal.position("mac.start"), Some(1));

        journal.acquire("mac");
        assert_eq!(journal.outstanding(), vec![("mac", 1)]);
        journal.release("mac");
        assert!(journal.outstanding().is_empty());
    }
}
