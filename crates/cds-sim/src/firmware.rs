//! ---
//! cds_section: "04-simulation"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Simulated firmware loader and host transport."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cds_common::DriverMode;
use cds_core::{CollabResult, ContextHandle, FirmwareTransport};
use tracing::debug;

use crate::journal::Journal;

/// Host-to-target transport created by [`SimFirmware`].
#[derive(Debug)]
pub struct SimHostTransport {
    pub mode: DriverMode,
}

#[derive(Debug)]
pub struct SimFirmware {
    journal: Arc<Journal>,
    image_loaded: AtomicBool,
}

impl SimFirmware {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            image_loaded: AtomicBool::new(false),
        }
    }

    fn drop_image(&self) {
        if self.image_loaded.swap(false, Ordering::AcqRel) {
            self.journal.release("firmware_image");
        }
    }
}

impl FirmwareTransport for SimFirmware {
    fn download_firmware(&self, _loader: &ContextHandle) -> CollabResult {
        self.journal.call("firmware.download")?;
        if !self.image_loaded.swap(true, Ordering::AcqRel) {
            self.journal.acquire("firmware_image");
        }
        Ok(())
    }

    fn loader_done(&self, _loader: &ContextHandle) -> CollabResult {
        self.journal.call("firmware.loader_done")?;
        self.drop_image();
        Ok(())
    }

    fn cleanup_loader(&self, _loader: &ContextHandle) {
        self.journal.record("firmware.cleanup_loader");
        self.drop_image();
    }

    fn create_host_transport(
        &self,
        _transport: &ContextHandle,
        _device: &ContextHandle,
        mode: DriverMode,
    ) -> CollabResult<ContextHandle> {
        self.journal.call("firmware.create_host_transport")?;
        self.journal.acquire("host_transport");
        debug!(mode = ?mode, "simulated host transport created");
        Ok(ContextHandle::new(SimHostTransport { mode }))
    }

    fn destroy_host_transport(&self, _host: &ContextHandle) {
        self.journal.record("firmware.destroy_host_transport");
        self.journal.release("host_transport");
    }

    fn wait_target_ready(&self, _host: &ContextHandle) -> CollabResult {
        self.journal.call("firmware.wait_target_ready")
    }

    fn start(&self, _host: &ContextHandle) -> CollabResult {
        self.journal.call("firmware.start")
    }

    fn stop(&self, _host: &ContextHandle) {
        self.journal.record("firmware.stop");
    }

    fn disable_interrupts(&self, _transport: &ContextHandle) {
        self.journal.record("firmware.disable_interrupts");
    }

    fn reset_soc(&self, _transport: &ContextHandle) {
        self.journal.record("firmware.reset_soc");
    }
}
