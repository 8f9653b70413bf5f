//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Connectivity driver services core: registry, events, lifecycle and recovery."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
//! Core services of the connectivity driver.
//!
//! A [`DriverServices`] owns the process-wide [`GlobalContext`]: the module
//! context registry, the probe, firmware-ready and recovery events, the driver
//! state flags, the bug-report record and the diagnostic knobs. The
//! [`Orchestrator`] brings the subsystem up and down through the
//! [`Collaborators`], and the [`RecoveryTrigger`] requests self-recovery.

pub mod collaborators;
pub mod context;
pub mod diagnostics;
pub mod driver_state;
pub mod error;
pub mod event;
pub mod global;
pub mod lifecycle;
pub mod log_completion;
pub mod metrics;
pub mod module;
pub mod recovery;
pub mod registry;
pub mod rollback;

pub use collaborators::{
    Collaborators, DataPlane, DataPlaneVariant, Dispatcher, FirmwareTransport, Mac, Message,
    MessageHandler, MessageKind, MessageQueue, Platform, RadarIndication, RadioCallbacks,
    RadioInterface, RadioOpenContext, RecoveryReason, Scheduler, Sme, StopReason, TargetConfig,
};
pub use context::{ContextBlock, ContextHandle};
pub use diagnostics::{DiagnosticKnobs, RingId, RingLogLevel};
pub use driver_state::{DriverState, DriverStateCell};
pub use error::{CdsError, CollabResult, CollaboratorError, Component, Result};
pub use event::Event;
pub use global::{CompletionSink, ConcurrencyEntry, ConcurrencyList, DriverServices, GlobalContext};
pub use lifecycle::{LifecycleState, Orchestrator, StepFailure, TeardownReport, Transition};
pub use log_completion::{LogCompletion, LogCompletionRecord, LogIndicator, REASON_CODE_UNUSED};
pub use metrics::LifecycleMetrics;
pub use module::ModuleId;
pub use recovery::{RecoveryOutcome, RecoveryRequest, RecoveryTrigger, RECOVERY_SUSPEND_LOCK};
pub use registry::ContextRegistry;
pub use rollback::UndoStack;
