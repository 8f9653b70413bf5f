//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Closed set of module identifiers owning registry slots."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

/// Subsystem that owns exactly one slot in the context registry.
///
/// The capability predicates below match exhaustively so that adding a variant
/// forces a decision for allocation, direct set and free.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumCount, EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ModuleId {
    /// Radio interface layer (firmware command/event plumbing).
    RadioInterface,
    /// Bus-level firmware transport.
    FirmwareTransport,
    /// Firmware download/boot loader state.
    FirmwareLoader,
    /// Host-to-target control transport created during open.
    HostTransport,
    /// MAC/SME session context.
    Mac,
    /// Data-plane platform attachment.
    DataPlaneSoc,
    /// Data-plane physical device attachment.
    DataPlanePdev,
    /// Platform device handle.
    Device,
    /// Platform configuration object handed to every collaborator.
    PlatformConfig,
}

impl ModuleId {
    /// Slots the registry allocates on behalf of a collaborator.
    pub fn is_allocatable(self) -> bool {
        match self {
            ModuleId::RadioInterface | ModuleId::FirmwareTransport | ModuleId::FirmwareLoader => {
                true
            }
            ModuleId::HostTransport
            | ModuleId::Mac
            | ModuleId::DataPlaneSoc
            | ModuleId::DataPlanePdev
            | ModuleId::Device
            | ModuleId::PlatformConfig => false,
        }
    }

    /// Slots a collaborator may populate directly.
    pub fn is_settable(self) -> bool {
        match self {
            ModuleId::FirmwareTransport | ModuleId::DataPlanePdev => true,
            ModuleId::RadioInterface
            | ModuleId::FirmwareLoader
            | ModuleId::HostTransport
            | ModuleId::Mac
            | ModuleId::DataPlaneSoc
            | ModuleId::Device
            | ModuleId::PlatformConfig => false,
        }
    }

    /// Slots a collaborator may release through the registry.
    pub fn is_freeable(self) -> bool {
        match self {
            ModuleId::RadioInterface
            | ModuleId::FirmwareTransport
            | ModuleId::FirmwareLoader
            | ModuleId::DataPlanePdev => true,
            ModuleId::HostTransport
            | ModuleId::Mac
            | ModuleId::DataPlaneSoc
            | ModuleId::Device
            | ModuleId::PlatformConfig => false,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn indices_are_dense() {
        for (expected, module) in ModuleId::iter().enumerate() {
            assert_eq!(module.index(), expected);
        }
        assert_eq!(ModuleId::iter().count(), ModuleId::COUNT);
    }

    #[test]
    fn freeable_covers_allocatable() {
        for module in ModuleId::iter().filter(|m| m.is_allocatable()) {
            assert!(module.is_freeable(), "{module} allocates but cannot be freed");
        }
    }

    #[test]
    fn names_are_snake_case() {
        assert_eq!(ModuleId::DataPlanePdev.as_str(), "data_plane_pdev");
        assert_eq!(ModuleId::RadioInterface.to_string(), "radio_interface");
    }
}
