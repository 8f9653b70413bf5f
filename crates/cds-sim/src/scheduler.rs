//! ---
//! cds_section: "04-simulation"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Threaded message scheduler."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cds_core::{
    CollabResult, CollaboratorError, Message, MessageHandler, MessageKind, MessageQueue, Scheduler,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::journal::Journal;

type Handlers = Arc<Mutex<HashMap<MessageQueue, MessageHandler>>>;

#[derive(Debug)]
struct Worker {
    sender: Sender<Message>,
    thread: JoinHandle<()>,
}

/// Scheduler with a single message-processing thread.
///
/// [`SimScheduler::stall`] makes the thread drop everything it receives, which
/// is how a wedged message thread looks from the outside.
pub struct SimScheduler {
    journal: Arc<Journal>,
    handlers: Handlers,
    registrations: Mutex<Vec<MessageQueue>>,
    worker: Mutex<Option<Worker>>,
    stalled: Arc<AtomicBool>,
    handled: Arc<AtomicUsize>,
}

impl SimScheduler {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            handlers: Arc::new(Mutex::new(HashMap::new())),
            registrations: Mutex::new(Vec::new()),
            worker: Mutex::new(None),
            stalled: Arc::new(AtomicBool::new(false)),
            handled: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn stall(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Registered queues in the order they were registered.
    pub fn registered_queues(&self) -> Vec<MessageQueue> {
        self.registrations.lock().clone()
    }

    /// Messages handed to a registered handler so far.
    pub fn handled(&self) -> usize {
        self.handled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for SimScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimScheduler")
            .field("running", &self.is_running())
            .field("queues", &self.registered_queues())
            .field("handled", &self.handled())
            .finish_non_exhaustive()
    }
}

impl Scheduler for SimScheduler {
    fn open(&self) -> CollabResult {
        self.journal.call("scheduler.open")?;
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(CollaboratorError::new("scheduler already open"));
        }
        let (sender, receiver) = mpsc::channel::<Message>();
        let handlers = self.handlers.clone();
        let stalled = self.stalled.clone();
        let handled = self.handled.clone();
        let thread = thread::Builder::new()
            .name("cds-sim-scheduler".into())
            .spawn(move || {
                for message in receiver {
                    if stalled.load(Ordering::SeqCst) {
                        debug!(queue = %message.queue, "scheduler stalled; dropping message");
                        continue;
                    }
                    let handler = handlers.lock().get(&message.queue).cloned();
                    match handler {
                        Some(handler) => {
                            handled.fetch_add(1, Ordering::SeqCst);
                            if let Err(err) = handler(message) {
                                warn!(error = %err, "message handler failed");
                            }
                        }
                        None => warn!(queue = %message.queue, "no handler registered"),
                    }
                }
            })
            .map_err(|err| CollaboratorError::new(format!("failed to spawn scheduler: {}", err)))?;
        *worker = Some(Worker { sender, thread });
        self.journal.acquire("scheduler");
        Ok(())
    }

    fn close(&self) {
        self.journal.record("scheduler.close");
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        drop(worker.sender);
        if worker.thread.join().is_err() {
            warn!("scheduler thread panicked");
        }
        self.journal.release("scheduler");
    }

    fn register_module(&self, queue: MessageQueue, handler: MessageHandler) -> CollabResult {
        self.journal.call("scheduler.register_module")?;
        self.handlers.lock().insert(queue, handler);
        let mut registrations = self.registrations.lock();
        registrations.retain(|registered| *registered != queue);
        registrations.push(queue);
        Ok(())
    }

    fn deregister_module(&self, queue: MessageQueue) -> CollabResult {
        self.journal.call("scheduler.deregister_module")?;
        self.handlers.lock().remove(&queue);
        self.registrations.lock().retain(|registered| *registered != queue);
        Ok(())
    }

    fn post(&self, message: Message) -> CollabResult {
        if matches!(message.kind, MessageKind::Probe) {
            self.journal.call("scheduler.post_probe")?;
        } else {
            self.journal.call("scheduler.post")?;
        }
        let worker = self.worker.lock();
        let Some(worker) = worker.as_ref() else {
            return Err(CollaboratorError::new("scheduler is not open"));
        };
        worker
            .sender
            .send(message)
            .map_err(|_| CollaboratorError::new("scheduler thread has exited"))
    }
}
