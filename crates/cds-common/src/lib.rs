//! ---
//! cds_section: "01-core-services"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Shared primitives and utilities for the driver services."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
//! Shared primitives for the connectivity driver services workspace.
//! This crate exposes configuration loading, tracing initialisation and
//! monotonic time helpers consumed by the core, the simulator and the daemon.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    ChannelWidth, ChipFamily, DiagnosticsConfig, DriverConfig, DriverMode, LoggingConfig, MetricsConfig,
    LoadedServicesConfig, ServicesConfig, TimeoutConfig,
};
pub use logging::{init_tracing, LogFormat};
