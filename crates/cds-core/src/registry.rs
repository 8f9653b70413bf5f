//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Fixed-cardinality module context registry."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use parking_lot::RwLock;
use strum::{EnumCount, IntoEnumIterator};
use tracing::{debug, warn};

use crate::context::{ContextBlock, ContextHandle};
use crate::error::{CdsError, Result};
use crate::module::ModuleId;

type Slots = [Option<ContextHandle>; ModuleId::COUNT];

/// One slot per [`ModuleId`]; all mutation happens under a single write lock.
#[derive(Debug)]
pub struct ContextRegistry {
    slots: RwLock<Slots>,
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(std::array::from_fn(|_| None)),
        }
    }

    /// Allocate a zeroed context of `size` bytes for `module`.
    pub fn alloc(&self, module: ModuleId, size: usize) -> Result<ContextHandle> {
        if !module.is_allocatable() {
            warn!(module = %module, "allocation requested for a module the registry does not own");
            return Err(CdsError::InvalidModule(module));
        }
        let mut slots = self.slots.write();
        let slot = &mut slots[module.index()];
        if slot.is_some() {
            warn!(module = %module, "module context already allocated");
            return Err(CdsError::AlreadyAllocated(module));
        }
        let handle = ContextHandle::new(ContextBlock::zeroed(module, size)?);
        *slot = Some(handle.clone());
        debug!(module = %module, size, handle = ?handle, "module context allocated");
        Ok(handle)
    }

    /// Store a collaborator-provided handle. Only transport and data-plane
    /// device slots accept this.
    ///
    /// An occupied slot is overwritten: the previous handle is dropped from
    /// the registry (not freed through its owner) and logged.
    pub fn set(&self, module: ModuleId, handle: ContextHandle) -> Result<()> {
        if !module.is_settable() {
            warn!(module = %module, "direct set is not supported for this module");
            return Err(CdsError::InvalidModule(module));
        }
        let replacement = handle.addr();
        if let Some(previous) = self.install(module, handle) {
            debug!(
                module = %module,
                previous = previous.addr(),
                replacement,
                "replaced module context"
            );
        }
        Ok(())
    }

    pub fn get(&self, module: ModuleId) -> Option<ContextHandle> {
        let handle = self.slots.read()[module.index()].clone();
        if handle.is_none() {
            debug!(module = %module, "module context not registered");
        }
        handle
    }

    /// Release the context registered for `module`; `handle` must be the
    /// registered one.
    pub fn free(&self, module: ModuleId, handle: &ContextHandle) -> Result<()> {
        if !module.is_freeable() {
            warn!(module = %module, "free requested for a module the registry does not own");
            return Err(CdsError::InvalidModule(module));
        }
        let mut slots = self.slots.write();
        let slot = &mut slots[module.index()];
        match slot.as_ref() {
            None => {
                warn!(module = %module, "free of a context that is not allocated");
                Err(CdsError::NotAllocated(module))
            }
            Some(current) if !current.ptr_eq(handle) => {
                warn!(
                    module = %module,
                    registered = ?current,
                    offered = ?handle,
                    "free with a handle that does not match the registered context"
                );
                Err(CdsError::PointerMismatch(module))
            }
            Some(_) => {
                *slot = None;
                debug!(module = %module, "module context freed");
                Ok(())
            }
        }
    }

    /// Unconditionally place `handle` in the slot, returning the previous value.
    pub(crate) fn install(&self, module: ModuleId, handle: ContextHandle) -> Option<ContextHandle> {
        self.slots.write()[module.index()].replace(handle)
    }

    /// Unconditionally empty the slot.
    pub(crate) fn take(&self, module: ModuleId) -> Option<ContextHandle> {
        self.slots.write()[module.index()].take()
    }

    /// Modules whose slot currently holds a context.
    pub fn occupied(&self) -> Vec<ModuleId> {
        let slots = self.slots.read();
        ModuleId::iter()
            .filter(|module| slots[module.index()].is_some())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().iter().all(Option::is_none)
    }

    pub(crate) fn clear(&self) -> Vec<ModuleId> {
        let mut slots = self.slots.write();
        ModuleId::iter()
            .filter(|module| slots[module.index()].take().is_some())
            .collect()
    }
}
