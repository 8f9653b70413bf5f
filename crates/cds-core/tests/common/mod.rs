//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "tests"
//! cds_type: "source"
//! cds_scope: "test"
//! cds_description: "Shared rig for the core integration tests."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::sync::Arc;

use cds_common::DriverConfig;
use cds_core::{DriverServices, GlobalContext, ModuleId, Orchestrator};
use cds_sim::{fast_timeouts, SimBench};

/// Modules the simulated bus probe owns for the whole run.
pub const PLATFORM_MODULES: [ModuleId; 4] = [
    ModuleId::FirmwareTransport,
    ModuleId::FirmwareLoader,
    ModuleId::Device,
    ModuleId::PlatformConfig,
];

pub struct Rig {
    pub services: DriverServices,
    pub global: Arc<GlobalContext>,
    pub bench: SimBench,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_config(DriverConfig::default())
    }

    pub fn with_config(config: DriverConfig) -> Self {
        cds_logging::init();
        let services = DriverServices::new();
        let global = services.init().expect("init driver services");
        let bench = SimBench::new();
        bench.probe(&global, config).expect("simulated probe");
        Self {
            services,
            global,
            bench,
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.global.clone(),
            self.bench.collaborators(),
            fast_timeouts(),
        )
    }

    /// Modules occupied beyond the ones the bus probe installed.
    pub fn extra_modules(&self) -> Vec<ModuleId> {
        self.global
            .occupied_modules()
            .into_iter()
            .filter(|module| !PLATFORM_MODULES.contains(module))
            .collect()
    }

    pub fn enabled(&self) -> Orchestrator {
        let mut orchestrator = self.orchestrator();
        orchestrator.open().expect("open");
        orchestrator.pre_enable().expect("pre-enable");
        orchestrator.enable().expect("enable");
        orchestrator
    }
}
