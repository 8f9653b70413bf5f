//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Process-wide driver state bitmask."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Coarse driver state. Several bits may be set at once; test bits
    /// individually rather than comparing whole values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DriverState: u32 {
        const LOADED = 1 << 0;
        const LOADING = 1 << 1;
        const UNLOADING = 1 << 2;
        const RECOVERING = 1 << 3;
        const BAD = 1 << 4;
    }
}

/// Lock-free cell holding a [`DriverState`].
#[derive(Debug, Default)]
pub struct DriverStateCell {
    bits: AtomicU32,
}

impl DriverStateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> DriverState {
        DriverState::from_bits_truncate(self.bits.load(Ordering::Acquire))
    }

    /// OR `flags` into the current state.
    pub fn set(&self, flags: DriverState) {
        self.bits.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    /// Remove `flags` from the current state.
    pub fn clear(&self, flags: DriverState) {
        self.bits.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    /// Set `flags` and report whether this call was the one that set all of them.
    pub fn try_set(&self, flags: DriverState) -> bool {
        let previous = DriverState::from_bits_truncate(
            self.bits.fetch_or(flags.bits(), Ordering::AcqRel),
        );
        !previous.contains(flags)
    }

    pub fn contains(&self, flags: DriverState) -> bool {
        self.get().contains(flags)
    }

    pub fn is_uninitialized(&self) -> bool {
        self.get().is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.contains(DriverState::LOADED)
    }

    pub fn is_loading(&self) -> bool {
        self.contains(DriverState::LOADING)
    }

    pub fn is_unloading(&self) -> bool {
        self.contains(DriverState::UNLOADING)
    }

    pub fn is_recovering(&self) -> bool {
        self.contains(DriverState::RECOVERING)
    }

    pub fn is_bad(&self) -> bool {
        self.contains(DriverState::BAD)
    }

    pub fn is_load_or_unload_in_progress(&self) -> bool {
        self.get()
            .intersects(DriverState::LOADING | DriverState::UNLOADING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_additive() {
        let cell = DriverStateCell::new();
        assert!(cell.is_uninitialized());
        cell.set(DriverState::LOADING);
        cell.set(DriverState::RECOVERING);
        assert!(cell.is_loading() && cell.is_recovering());
        cell.clear(DriverState::LOADING);
        assert!(!cell.is_loading());
        assert!(cell.is_recovering(), "clear must not touch unrelated bits");
    }

    #[test]
    fn try_set_reports_first_setter_only() {
        let cell = DriverStateCell::new();
        assert!(cell.try_set(DriverState::RECOVERING));
        assert!(!cell.try_set(DriverState::RECOVERING));
        cell.clear(DriverState::RECOVERING);
        assert!(cell.try_set(DriverState::RECOVERING));
    }

    #[test]
    fn load_or_unload_predicate() {
        let cell = DriverStateCell::new();
        cell.set(DriverState::LOADED);
        assert!(!cell.is_load_or_unload_in_progress());
        cell.set(DriverState::UNLOADING);
        assert!(cell.is_load_or_unload_in_progress());
        assert_eq!(cell.get().bits(), 0b101);
    }
}
