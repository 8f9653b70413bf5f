//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Opaque, reference-counted module context handles."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CdsError, Result};
use crate::module::ModuleId;

/// Opaque handle to a module context.
///
/// Identity is pointer identity: two handles are equal only when they refer to
/// the same allocation, regardless of the payload type.
#[derive(Clone)]
pub struct ContextHandle {
    inner: Arc<dyn Any + Send + Sync>,
}

impl ContextHandle {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self { inner: value }
    }

    /// Borrow the payload as `T`, if that is its concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Clone out a typed `Arc`, if the payload is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    pub fn ptr_eq(&self, other: &ContextHandle) -> bool {
        self.addr() == other.addr()
    }

    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl PartialEq for ContextHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ContextHandle {}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextHandle({:#x})", self.addr())
    }
}

/// Zero-initialised block handed out by [`crate::ContextRegistry::alloc`].
#[derive(Debug)]
pub struct ContextBlock {
    module: ModuleId,
    bytes: Mutex<Vec<u8>>,
}

impl ContextBlock {
    pub(crate) fn zeroed(module: ModuleId, size: usize) -> Result<Self> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| CdsError::OutOfMemory { module, size })?;
        bytes.resize(size, 0);
        Ok(Self {
            module,
            bytes: Mutex::new(bytes),
        })
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` with exclusive access to the block contents.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut guard = self.bytes.lock();
        f(guard.as_mut_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_payload_equality() {
        let a = ContextHandle::new(7u32);
        let b = ContextHandle::new(7u32);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn downcast_to_concrete_type() {
        let handle = ContextHandle::new(String::from("mac"));
        assert_eq!(handle.downcast_ref::<String>().map(String::as_str), Some("mac"));
        assert!(handle.downcast::<u64>().is_none());
    }

    #[test]
    fn blocks_start_zeroed() {
        let block = ContextBlock::zeroed(ModuleId::FirmwareLoader, 64).unwrap();
        assert_eq!(block.len(), 64);
        block.with_bytes(|bytes| assert!(bytes.iter().all(|b| *b == 0)));
    }

    #[test]
    fn oversized_block_reports_out_of_memory() {
        let err = ContextBlock::zeroed(ModuleId::FirmwareLoader, usize::MAX).unwrap_err();
        assert!(matches!(err, CdsError::OutOfMemory { size, .. } if size == usize::MAX));
    }
}
