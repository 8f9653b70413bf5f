//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Scoped undo stack used by the bring-up transitions."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use tracing::{debug, warn};

use crate::metrics::LifecycleMetrics;

type UndoAction<'a> = Box<dyn FnOnce() + Send + 'a>;

/// Undo actions pushed as each bring-up step succeeds.
///
/// Dropping an armed stack runs the actions newest-first, so an early `?`
/// return unwinds exactly the steps that completed. [`UndoStack::commit`]
/// disarms it once the whole transition has succeeded.
pub struct UndoStack<'a> {
    transition: &'static str,
    actions: Vec<(&'static str, UndoAction<'a>)>,
    metrics: Option<LifecycleMetrics>,
}

impl<'a> UndoStack<'a> {
    pub fn new(transition: &'static str, metrics: Option<LifecycleMetrics>) -> Self {
        Self {
            transition,
            actions: Vec::new(),
            metrics,
        }
    }

    pub fn push(&mut self, step: &'static str, action: impl FnOnce() + Send + 'a) {
        self.actions.push((step, Box::new(action)));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Disarm the stack; nothing is undone.
    pub fn commit(mut self) {
        debug!(
            transition = self.transition,
            steps = self.actions.len(),
            "transition committed"
        );
        self.actions.clear();
    }

    /// Run every pending action newest-first and return their labels in the
    /// order they ran.
    pub fn unwind(mut self) -> Vec<&'static str> {
        self.run()
    }

    fn run(&mut self) -> Vec<&'static str> {
        let mut ran = Vec::with_capacity(self.actions.len());
        while let Some((step, action)) = self.actions.pop() {
            warn!(transition = self.transition, step, "rolling back");
            action();
            ran.push(step);
        }
        if let Some(metrics) = &self.metrics {
            if !ran.is_empty() {
                metrics.record_rollback(self.transition, ran.len());
            }
        }
        ran
    }
}

impl Drop for UndoStack<'_> {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            self.run();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn drop_unwinds_in_reverse_order() {
        let log = Mutex::new(Vec::new());
        {
            let mut undo = UndoStack::new("open", None);
            undo.push("first", || log.lock().push("first"));
            undo.push("second", || log.lock().push("second"));
            undo.push("third", || log.lock().push("third"));
        }
        assert_eq!(*log.lock(), vec!["third", "second", "first"]);
    }

    #[test]
    fn commit_disarms() {
        let log = Mutex::new(Vec::<&str>::new());
        let mut undo = UndoStack::new("enable", None);
        undo.push("step", || log.lock().push("step"));
        undo.commit();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn early_return_unwinds_completed_steps_only() {
        let log = Mutex::new(Vec::new());
        let run = |fail_at: usize| -> Result<(), usize> {
            let mut undo = UndoStack::new("open", None);
            for step in 0..4 {
                if step == fail_at {
                    return Err(step);
                }
                let log = &log;
                undo.push("step", move || log.lock().push(step));
            }
            undo.commit();
            Ok(())
        };
        assert_eq!(run(2), Err(2));
        assert_eq!(*log.lock(), vec![1, 0]);
    }

    #[test]
    fn unwind_reports_labels() {
        let mut undo = UndoStack::new("open", None);
        undo.push("destroy events", || {});
        undo.push("close scheduler", || {});
        assert_eq!(undo.unwind(), vec!["close scheduler", "destroy events"]);
    }
}
