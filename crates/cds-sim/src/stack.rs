//! ---
//! cds_section: "04-simulation"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Simulated MAC, SME, data plane and dispatcher."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::sync::Arc;

use cds_common::DriverConfig;
use cds_core::{
    CollabResult, ContextHandle, DataPlane, DataPlaneVariant, Dispatcher, Mac, Message, Sme,
    StopReason,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::journal::Journal;

/// MAC context handed back from [`SimMac::open`].
#[derive(Debug)]
pub struct SimMacContext {
    pub max_stations: u32,
}

#[derive(Debug)]
pub struct SimMac {
    journal: Arc<Journal>,
    stop_reasons: Mutex<Vec<StopReason>>,
}

impl SimMac {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            stop_reasons: Mutex::new(Vec::new()),
        }
    }

    pub fn stop_reasons(&self) -> Vec<StopReason> {
        self.stop_reasons.lock().clone()
    }
}

impl Mac for SimMac {
    fn open(
        &self,
        _platform_config: &ContextHandle,
        config: &DriverConfig,
    ) -> CollabResult<ContextHandle> {
        self.journal.call("mac.open")?;
        self.journal.acquire("mac");
        Ok(ContextHandle::new(SimMacContext {
            max_stations: config.max_stations,
        }))
    }

    fn start(&self, _mac: &ContextHandle) -> CollabResult {
        self.journal.call("mac.start")
    }

    fn stop(&self, _mac: &ContextHandle, reason: StopReason) -> CollabResult {
        self.stop_reasons.lock().push(reason);
        self.journal.call("mac.stop")
    }

    fn close(&self, _mac: &ContextHandle) -> CollabResult {
        self.journal.call("mac.close")?;
        self.journal.release("mac");
        Ok(())
    }

    fn process_message(&self, _message: Message) -> CollabResult {
        self.journal.call("mac.process_message")
    }
}

#[derive(Debug)]
pub struct SimSme {
    journal: Arc<Journal>,
}

impl SimSme {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self { journal }
    }
}

impl Sme for SimSme {
    fn open(&self, _mac: &ContextHandle) -> CollabResult {
        self.journal.call("sme.open")?;
        self.journal.acquire("sme");
        Ok(())
    }

    fn start(&self, _mac: &ContextHandle) -> CollabResult {
        self.journal.call("sme.start")
    }

    fn stop(&self, _mac: &ContextHandle, reason: StopReason) -> CollabResult {
        debug!(reason = %reason, "simulated sme stop");
        self.journal.call("sme.stop")
    }

    fn close(&self, _mac: &ContextHandle) -> CollabResult {
        self.journal.call("sme.close")?;
        self.journal.release("sme");
        Ok(())
    }

    fn send_flush_logs_command(&self, _mac: &ContextHandle) -> CollabResult {
        self.journal.call("sme.flush_logs")
    }

    fn process_message(&self, _message: Message) -> CollabResult {
        self.journal.call("sme.process_message")
    }
}

#[derive(Debug)]
pub struct SimDataPlane {
    journal: Arc<Journal>,
    variant: Mutex<Option<DataPlaneVariant>>,
}

impl SimDataPlane {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            variant: Mutex::new(None),
        }
    }

    /// Variant requested by the most recent soc attach.
    pub fn attached_variant(&self) -> Option<DataPlaneVariant> {
        *self.variant.lock()
    }
}

#[derive(Debug)]
struct SimSoc;

#[derive(Debug)]
struct SimPdev;

impl DataPlane for SimDataPlane {
    fn soc_attach(
        &self,
        variant: DataPlaneVariant,
        _transport: &ContextHandle,
        _host: &ContextHandle,
        _device: &ContextHandle,
    ) -> CollabResult<ContextHandle> {
        self.journal.call("data_plane.soc_attach")?;
        *self.variant.lock() = Some(variant);
        self.journal.acquire("soc");
        Ok(ContextHandle::new(SimSoc))
    }

    fn soc_detach(&self, _soc: &ContextHandle) {
        self.journal.record("data_plane.soc_detach");
        self.journal.release("soc");
    }

    fn pdev_attach(
        &self,
        _soc: &ContextHandle,
        _platform_config: &ContextHandle,
    ) -> CollabResult<ContextHandle> {
        self.journal.call("data_plane.pdev_attach")?;
        self.journal.acquire("pdev");
        Ok(ContextHandle::new(SimPdev))
    }

    fn pdev_detach(&self, _soc: Option<&ContextHandle>, _pdev: &ContextHandle) {
        self.journal.record("data_plane.pdev_detach");
        self.journal.release("pdev");
    }

    fn packet_log_connect(&self, _soc: &ContextHandle, _pdev: &ContextHandle) {
        self.journal.record("data_plane.packet_log_connect");
    }

    fn pdev_post_attach(&self, _soc: &ContextHandle, _pdev: &ContextHandle) -> CollabResult {
        self.journal.call("data_plane.pdev_post_attach")
    }

    fn soc_attach_target(&self, _soc: &ContextHandle) -> CollabResult {
        self.journal.call("data_plane.soc_attach_target")
    }

    fn pdev_attach_target(&self, _soc: &ContextHandle, _pdev: &ContextHandle) -> CollabResult {
        self.journal.call("data_plane.pdev_attach_target")
    }
}

#[derive(Debug)]
pub struct SimDispatcher {
    journal: Arc<Journal>,
}

impl SimDispatcher {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self { journal }
    }
}

impl Dispatcher for SimDispatcher {
    fn psoc_open(&self, _platform_config: &ContextHandle) -> CollabResult {
        self.journal.call("dispatcher.psoc_open")
    }

    fn psoc_enable(&self, _platform_config: &ContextHandle) -> CollabResult {
        self.journal.call("dispatcher.psoc_enable")
    }

    fn psoc_disable(&self, _platform_config: &ContextHandle) -> CollabResult {
        self.journal.call("dispatcher.psoc_disable")
    }

    fn psoc_close(&self, _platform_config: &ContextHandle) -> CollabResult {
        self.journal.call("dispatcher.psoc_close")
    }
}
