//! ---
//! cds_section: "04-simulation"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Simulated radio interface with asynchronous firmware completions."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use cds_core::{
    CollabResult, CollaboratorError, CompletionSink, ContextHandle, GlobalContext, Message,
    ModuleId, RadioInterface, RadioOpenContext, StopReason, TargetConfig,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::journal::Journal;

const RADIO_CONTEXT_SIZE: usize = 512;

#[derive(Debug, Default)]
struct Attached {
    global: Option<Weak<GlobalContext>>,
    handle: Option<ContextHandle>,
    sink: Option<CompletionSink>,
}

/// Radio interface whose firmware answers from a background thread.
///
/// By default the firmware completes pre-start and stop requests but does not
/// acknowledge crash injection.
#[derive(Debug)]
pub struct SimRadio {
    journal: Arc<Journal>,
    attached: Mutex<Attached>,
    needs_shutdown: AtomicBool,
    answer_pre_start: AtomicBool,
    answer_stop: AtomicBool,
    answer_crash_inject: AtomicBool,
    completion_delay: Duration,
}

impl SimRadio {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            attached: Mutex::new(Attached::default()),
            needs_shutdown: AtomicBool::new(false),
            answer_pre_start: AtomicBool::new(true),
            answer_stop: AtomicBool::new(true),
            answer_crash_inject: AtomicBool::new(false),
            completion_delay: Duration::from_millis(5),
        }
    }

    pub fn set_answer_pre_start(&self, answer: bool) {
        self.answer_pre_start.store(answer, Ordering::SeqCst);
    }

    pub fn set_answer_stop(&self, answer: bool) {
        self.answer_stop.store(answer, Ordering::SeqCst);
    }

    pub fn set_answer_crash_inject(&self, answer: bool) {
        self.answer_crash_inject.store(answer, Ordering::SeqCst);
    }

    /// Forget a previous forced-shutdown mark, as a fresh driver load would.
    pub fn reset_shutdown_mark(&self) {
        self.needs_shutdown.store(false, Ordering::SeqCst);
    }

    fn complete_later(&self, what: &'static str, deliver: fn(&CompletionSink) -> cds_core::Result<()>) {
        let Some(sink) = self.attached.lock().sink.clone() else {
            warn!(what, "radio interface not open; no completion delivered");
            return;
        };
        let delay = self.completion_delay;
        thread::spawn(move || {
            thread::sleep(delay);
            if let Err(err) = deliver(&sink) {
                debug!(what, error = %err, "completion not delivered");
            }
        });
    }
}

impl RadioInterface for SimRadio {
    fn open(&self, ctx: RadioOpenContext<'_>) -> CollabResult {
        self.journal.call("radio.open")?;
        let handle = ctx
            .global
            .alloc_context(ModuleId::RadioInterface, RADIO_CONTEXT_SIZE)
            .map_err(|err| CollaboratorError::new(err.to_string()))?;
        {
            let mut attached = self.attached.lock();
            attached.global = Some(Arc::downgrade(ctx.global));
            attached.handle = Some(handle);
            attached.sink = Some(ctx.global.completion_sink());
        }
        self.needs_shutdown.store(false, Ordering::SeqCst);
        (ctx.callbacks.target_config_updated)(&TargetConfig {
            max_stations: ctx.config.max_stations,
            chip_family: ctx.config.chip_family,
        });
        Ok(())
    }

    fn pre_start(&self) -> CollabResult {
        self.journal.call("radio.pre_start")?;
        if self.answer_pre_start.load(Ordering::SeqCst) {
            self.complete_later("pre_start", CompletionSink::firmware_complete);
        }
        Ok(())
    }

    fn start(&self) -> CollabResult {
        self.journal.call("radio.start")
    }

    fn stop(&self, reason: StopReason) -> CollabResult {
        self.journal.call("radio.stop")?;
        debug!(reason = %reason, "simulated radio stop");
        if self.answer_stop.load(Ordering::SeqCst) {
            self.complete_later("stop", CompletionSink::firmware_complete);
        }
        Ok(())
    }

    fn close(&self) -> CollabResult {
        self.journal.call("radio.close")?;
        let mut attached = self.attached.lock();
        let global = attached.global.take().and_then(|weak| weak.upgrade());
        if let (Some(global), Some(handle)) = (global, attached.handle.take()) {
            global
                .free_context(ModuleId::RadioInterface, &handle)
                .map_err(|err| CollaboratorError::new(err.to_string()))?;
        }
        attached.sink = None;
        Ok(())
    }

    fn close_service(&self) -> CollabResult {
        self.journal.call("radio.close_service")
    }

    fn close_work_queue(&self) -> CollabResult {
        self.journal.call("radio.close_work_queue")
    }

    fn wait_for_ready_event(&self) -> CollabResult {
        self.journal.call("radio.wait_for_ready_event")
    }

    fn crash_inject(&self) -> CollabResult {
        self.journal.call("radio.crash_inject")?;
        if self.answer_crash_inject.load(Ordering::SeqCst) {
            self.complete_later("crash_inject", CompletionSink::recovery_ack);
        }
        Ok(())
    }

    fn suspend_target(&self) -> CollabResult {
        self.journal.call("radio.suspend_target")
    }

    fn set_needs_shutdown(&self) {
        self.journal.record("radio.set_needs_shutdown");
        self.needs_shutdown.store(true, Ordering::SeqCst);
    }

    fn needs_shutdown(&self) -> bool {
        self.needs_shutdown.load(Ordering::SeqCst)
    }

    fn process_message(&self, _message: Message) -> CollabResult {
        self.journal.call("radio.process_message")
    }
}
