//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Error taxonomy shared by the registry, lifecycle and recovery paths."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::time::Duration;

use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::lifecycle::{LifecycleState, Transition};
use crate::module::ModuleId;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, CdsError>;

/// Result returned by collaborator calls.
pub type CollabResult<T = ()> = std::result::Result<T, CollaboratorError>;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CollaboratorError {
    message: String,
}

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Collaborator families the core calls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Component {
    FirmwareTransport,
    RadioInterface,
    Mac,
    Sme,
    DataPlane,
    Scheduler,
    Dispatcher,
    Platform,
}

#[derive(Debug, Error)]
pub enum CdsError {
    #[error("driver services are not initialised")]
    NotInitialized,
    #[error("driver services are already initialised")]
    AlreadyInitialized,
    #[error("a context is already allocated for {0}")]
    AlreadyAllocated(ModuleId),
    #[error("{0} does not support this registry operation")]
    InvalidModule(ModuleId),
    #[error("no context is allocated for {0}")]
    NotAllocated(ModuleId),
    #[error("handle does not match the context registered for {0}")]
    PointerMismatch(ModuleId),
    #[error("unable to allocate {size} bytes for {module}")]
    OutOfMemory { module: ModuleId, size: usize },
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),
    #[error("required context for {0} is not registered")]
    MissingContext(ModuleId),
    #[error("timed out after {waited:?} waiting for {event}")]
    Timeout {
        event: &'static str,
        waited: Duration,
    },
    #[error("{component} {operation} failed: {source}")]
    Collaborator {
        component: Component,
        operation: &'static str,
        source: CollaboratorError,
    },
    #[error("{0} is already in progress")]
    AlreadyInProgress(&'static str),
    #[error("not ready: {0}")]
    NotReady(&'static str),
    #[error("{transition} is not permitted from the {state} state")]
    InvalidTransition {
        state: LifecycleState,
        transition: Transition,
    },
    #[error("event {0} was destroyed")]
    EventDestroyed(&'static str),
    #[error("completion delivered for a different driver instance")]
    ContextMismatch,
}

impl CdsError {
    pub(crate) fn collaborator(
        component: Component,
        operation: &'static str,
        source: CollaboratorError,
    ) -> Self {
        CdsError::Collaborator {
            component,
            operation,
            source,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CdsError::Timeout { .. })
    }
}

/// Attach the collaborator identity to a [`CollabResult`].
pub(crate) trait CollabResultExt<T> {
    fn component(self, component: Component, operation: &'static str) -> Result<T>;
}

impl<T> CollabResultExt<T> for CollabResult<T> {
    fn component(self, component: Component, operation: &'static str) -> Result<T> {
        self.map_err(|source| CdsError::collaborator(component, operation, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_errors_render_component_and_operation() {
        let err: Result<()> = Err(CollaboratorError::new("link down"))
            .component(Component::Mac, "open");
        let rendered = err.unwrap_err().to_string();
        assert_eq!(rendered, "mac open failed: link down");
    }

    #[test]
    fn timeout_predicate() {
        let err = CdsError::Timeout {
            event: "firmware_ready",
            waited: Duration::from_millis(5),
        };
        assert!(err.is_timeout());
        assert!(!CdsError::NotInitialized.is_timeout());
    }
}
