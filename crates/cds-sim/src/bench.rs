//! ---
//! cds_section: "04-simulation"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Wires the simulated collaborators to a driver instance."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use cds_common::{DriverConfig, TimeoutConfig};
use cds_core::{Collaborators, ContextHandle, GlobalContext, ModuleId, Result};
use parking_lot::Mutex;
use tracing::debug;

use crate::firmware::SimFirmware;
use crate::journal::Journal;
use crate::platform::SimPlatform;
use crate::radio::SimRadio;
use crate::scheduler::SimScheduler;
use crate::stack::{SimDataPlane, SimDispatcher, SimMac, SimSme};

const TRANSPORT_CONTEXT_SIZE: usize = 256;
const LOADER_CONTEXT_SIZE: usize = 128;

/// Platform device discovered by the simulated bus probe.
#[derive(Debug)]
pub struct SimDevice {
    pub name: &'static str,
}

/// Short bounded waits suitable for tests.
pub fn fast_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        firmware_ready_ms: Duration::from_millis(500),
        probe_ms: Duration::from_millis(200),
        radio_stop_ms: Duration::from_millis(500),
        crash_inject_ms: Duration::from_millis(200),
    }
}

#[derive(Debug)]
struct Probed {
    transport: ContextHandle,
    loader: ContextHandle,
}

/// A full set of simulated collaborators sharing one [`Journal`].
#[derive(Debug)]
pub struct SimBench {
    pub journal: Arc<Journal>,
    pub firmware: Arc<SimFirmware>,
    pub radio: Arc<SimRadio>,
    pub mac: Arc<SimMac>,
    pub sme: Arc<SimSme>,
    pub data_plane: Arc<SimDataPlane>,
    pub scheduler: Arc<SimScheduler>,
    pub dispatcher: Arc<SimDispatcher>,
    pub platform: Arc<SimPlatform>,
    probed: Mutex<Option<Probed>>,
}

impl Default for SimBench {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBench {
    pub fn new() -> Self {
        let journal = Journal::new();
        Self {
            firmware: Arc::new(SimFirmware::new(journal.clone())),
            radio: Arc::new(SimRadio::new(journal.clone())),
            mac: Arc::new(SimMac::new(journal.clone())),
            sme: Arc::new(SimSme::new(journal.clone())),
            data_plane: Arc::new(SimDataPlane::new(journal.clone())),
            scheduler: Arc::new(SimScheduler::new(journal.clone())),
            dispatcher: Arc::new(SimDispatcher::new(journal.clone())),
            platform: Arc::new(SimPlatform::new(journal.clone())),
            journal,
            probed: Mutex::new(None),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            firmware: self.firmware.clone(),
            radio: self.radio.clone(),
            mac: self.mac.clone(),
            sme: self.sme.clone(),
            data_plane: self.data_plane.clone(),
            scheduler: self.scheduler.clone(),
            dispatcher: self.dispatcher.clone(),
            platform: self.platform.clone(),
        }
    }

    /// Do what the bus probe does before the first open: allocate the
    /// transport and loader contexts, attach the device and platform
    /// configuration, and install the driver configuration.
    pub fn probe(&self, global: &GlobalContext, config: DriverConfig) -> Result<()> {
        let transport = global.alloc_context(ModuleId::FirmwareTransport, TRANSPORT_CONTEXT_SIZE)?;
        let loader = match global.alloc_context(ModuleId::FirmwareLoader, LOADER_CONTEXT_SIZE) {
            Ok(loader) => loader,
            Err(err) => {
                global.free_context(ModuleId::FirmwareTransport, &transport)?;
                return Err(err);
            }
        };
        global.attach_platform(
            ContextHandle::new(SimDevice { name: "sim0" }),
            ContextHandle::new(config.clone()),
        )?;
        global.init_ini_config(config);
        *self.probed.lock() = Some(Probed { transport, loader });
        debug!("simulated bus probe complete");
        Ok(())
    }

    /// Undo [`SimBench::probe`].
    pub fn remove(&self, global: &GlobalContext) -> Result<()> {
        if let Some(probed) = self.probed.lock().take() {
            global.free_context(ModuleId::FirmwareLoader, &probed.loader)?;
            global.free_context(ModuleId::FirmwareTransport, &probed.transport)?;
        }
        global.detach_platform();
        global.deinit_ini_config();
        debug!("simulated device removed");
        Ok(())
    }
}
