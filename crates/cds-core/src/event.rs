//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Binary events with bounded waits for firmware completions."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::{CdsError, Result};

#[derive(Debug, Default)]
struct EventState {
    live: bool,
    signaled: bool,
    generation: u64,
}

#[derive(Debug, Default)]
struct EventInner {
    state: Mutex<EventState>,
    cond: Condvar,
}

/// Manual-reset binary event.
///
/// Clones share the same underlying object, so a completion callback holding a
/// clone can never observe freed memory; after [`Event::destroy`] its signals
/// are rejected and waiters wake with [`CdsError::EventDestroyed`]. The
/// generation advances on every create, reset and destroy.
#[derive(Debug, Clone)]
pub struct Event {
    name: &'static str,
    inner: Arc<EventInner>,
}

impl Event {
    /// A named event that is not yet created.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Bring the event to the live, unsignaled state.
    pub fn create(&self) {
        let mut state = self.inner.state.lock();
        state.live = true;
        state.signaled = false;
        state.generation += 1;
        trace!(event = self.name, generation = state.generation, "event created");
    }

    /// Retire the event and wake every waiter.
    pub fn destroy(&self) {
        let mut state = self.inner.state.lock();
        state.live = false;
        state.signaled = false;
        state.generation += 1;
        self.inner.cond.notify_all();
        trace!(event = self.name, generation = state.generation, "event destroyed");
    }

    pub fn is_live(&self) -> bool {
        self.inner.state.lock().live
    }

    pub fn is_signaled(&self) -> bool {
        self.inner.state.lock().signaled
    }

    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    pub fn signal(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if !state.live {
            return Err(CdsError::EventDestroyed(self.name));
        }
        state.signaled = true;
        self.inner.cond.notify_all();
        Ok(())
    }

    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.signaled = false;
        state.generation += 1;
    }

    /// Block until signaled, destroyed or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if !state.live {
                return Err(CdsError::EventDestroyed(self.name));
            }
            if state.signaled {
                return Ok(());
            }
            if self.inner.cond.wait_until(&mut state, deadline).timed_out() {
                if state.live && state.signaled {
                    return Ok(());
                }
                if !state.live {
                    return Err(CdsError::EventDestroyed(self.name));
                }
                return Err(CdsError::Timeout {
                    event: self.name,
                    waited: timeout,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn signal_from_another_thread_wakes_waiter() {
        let event = Event::new("firmware_ready");
        event.create();
        let signaler = event.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaler.signal().unwrap();
        });
        event.wait(Duration::from_secs(2)).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn wait_times_out_without_signal() {
        let event = Event::new("probe");
        event.create();
        let err = event.wait(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, CdsError::Timeout { event: "probe", .. }));
    }

    #[test]
    fn reset_clears_stale_signal() {
        let event = Event::new("probe");
        event.create();
        event.signal().unwrap();
        event.reset();
        assert!(!event.is_signaled());
        assert!(event.wait(Duration::from_millis(5)).is_err());
    }

    #[test]
    fn destroy_wakes_waiters_and_rejects_signals() {
        let event = Event::new("recovery");
        event.create();
        let destroyer = event.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            destroyer.destroy();
        });
        let err = event.wait(Duration::from_secs(2)).unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, CdsError::EventDestroyed("recovery")));
        assert!(matches!(event.signal(), Err(CdsError::EventDestroyed(_))));
    }

    #[test]
    fn generation_advances() {
        let event = Event::new("probe");
        let start = event.generation();
        event.create();
        event.reset();
        event.destroy();
        assert_eq!(event.generation(), start + 3);
    }
}
