//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Diagnostic knobs and per-ring log levels."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};

use cds_common::config::DiagnosticsConfig;
use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

/// Diagnostic log rings exported to userspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RingId {
    Wakelock,
    Connectivity,
    PerPacketStats,
    DriverDebug,
    FirmwareDebug,
}

/// Collection level applied to a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Display)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum RingLogLevel {
    #[default]
    Off = 0,
    Normal = 1,
    Repro = 2,
    Active = 3,
}

impl RingLogLevel {
    /// Map a host verbosity request: 0 no collection, 1 normal, 2 issue
    /// repro, anything else active.
    pub fn from_verbosity(verbosity: u32) -> Self {
        match verbosity {
            0 => RingLogLevel::Off,
            1 => RingLogLevel::Normal,
            2 => RingLogLevel::Repro,
            _ => RingLogLevel::Active,
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => RingLogLevel::Normal,
            2 => RingLogLevel::Repro,
            3 => RingLogLevel::Active,
            _ => RingLogLevel::Off,
        }
    }
}

/// Scalar diagnostic knobs plus ring log levels.
#[derive(Debug)]
pub struct DiagnosticKnobs {
    radio_index: AtomicI32,
    wakelock_logging: AtomicBool,
    multicast_logging: AtomicBool,
    fatal_event: AtomicBool,
    rings: [AtomicU8; RingId::COUNT],
}

impl Default for DiagnosticKnobs {
    fn default() -> Self {
        Self {
            radio_index: AtomicI32::new(-1),
            wakelock_logging: AtomicBool::new(false),
            multicast_logging: AtomicBool::new(false),
            fatal_event: AtomicBool::new(false),
            rings: std::array::from_fn(|_| AtomicU8::new(RingLogLevel::Off as u8)),
        }
    }
}

impl DiagnosticKnobs {
    pub fn apply(&self, config: &DiagnosticsConfig) {
        self.set_radio_index(config.radio_index);
        self.set_wakelock_logging(config.wakelock_logging);
        self.set_multicast_logging(config.multicast_logging);
        self.set_fatal_event(config.fatal_event_enabled);
    }

    pub fn radio_index(&self) -> i32 {
        self.radio_index.load(Ordering::Relaxed)
    }

    pub fn set_radio_index(&self, index: i32) {
        self.radio_index.store(index, Ordering::Relaxed);
    }

    pub fn is_wakelock_logging(&self) -> bool {
        self.wakelock_logging.load(Ordering::Relaxed)
    }

    pub fn set_wakelock_logging(&self, enabled: bool) {
        self.wakelock_logging.store(enabled, Ordering::Relaxed);
    }

    pub fn is_multicast_logging(&self) -> bool {
        self.multicast_logging.load(Ordering::Relaxed)
    }

    pub fn set_multicast_logging(&self, enabled: bool) {
        self.multicast_logging.store(enabled, Ordering::Relaxed);
    }

    pub fn is_fatal_event_enabled(&self) -> bool {
        self.fatal_event.load(Ordering::Relaxed)
    }

    pub fn set_fatal_event(&self, enabled: bool) {
        self.fatal_event.store(enabled, Ordering::Relaxed);
    }

    pub fn set_ring_log_level(&self, ring: RingId, verbosity: u32) -> RingLogLevel {
        let level = RingLogLevel::from_verbosity(verbosity);
        self.rings[ring as usize].store(level as u8, Ordering::Relaxed);
        level
    }

    pub fn ring_log_level(&self, ring: RingId) -> RingLogLevel {
        RingLogLevel::from_raw(self.rings[ring as usize].load(Ordering::Relaxed))
    }

    /// Per-packet statistics are only forwarded when that ring is active.
    pub fn should_forward_packet_stats(&self) -> bool {
        self.ring_log_level(RingId::PerPacketStats) == RingLogLevel::Active
    }
}
