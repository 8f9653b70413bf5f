//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Boundary traits for the external collaborators driven by the orchestrator."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
//! Every collaborator is a black box with a success/failure contract. The
//! orchestrator resolves context handles from the registry and passes them in;
//! collaborators that own registry slots reach the registry through the
//! [`GlobalContext`] supplied to [`RadioInterface::open`].

use std::fmt;
use std::sync::Arc;

use cds_common::config::{ChipFamily, DriverConfig, DriverMode};
use strum::{Display, EnumCount, EnumIter, IntoStaticStr};
use tracing::info;

use crate::context::ContextHandle;
use crate::error::CollabResult;
use crate::global::GlobalContext;

/// Scheduler queues, listed in drain priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum MessageQueue {
    Timer,
    TargetInterface,
    LegacyPe,
    LegacySme,
    OsInterface,
}

impl MessageQueue {
    /// Registration order at the end of open. Consumers rely on this relative
    /// drain priority.
    pub const PRIORITY_ORDER: [MessageQueue; MessageQueue::COUNT] = [
        MessageQueue::Timer,
        MessageQueue::TargetInterface,
        MessageQueue::LegacyPe,
        MessageQueue::LegacySme,
        MessageQueue::OsInterface,
    ];
}

/// Payload carried through the scheduler.
pub enum MessageKind {
    /// Liveness probe for the message-processing thread.
    Probe,
    /// Opaque component message identified by its type code.
    Component(u32),
    /// Deferred work executed on the scheduler thread.
    Deferred(Box<dyn FnOnce() + Send>),
}

impl fmt::Debug for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Probe => f.write_str("Probe"),
            MessageKind::Component(code) => f.debug_tuple("Component").field(code).finish(),
            MessageKind::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

#[derive(Debug)]
pub struct Message {
    pub queue: MessageQueue,
    pub kind: MessageKind,
}

impl Message {
    pub fn probe() -> Self {
        Self {
            queue: MessageQueue::Timer,
            kind: MessageKind::Probe,
        }
    }
}

/// Handler registered for one scheduler queue.
pub type MessageHandler = Arc<dyn Fn(Message) -> CollabResult + Send + Sync>;

/// Why a component is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    SystemReset,
    DeepSleep,
    RfKill,
}

/// Data-plane implementation selected by the detected chip family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DataPlaneVariant {
    LegacyOffload,
    Lithium,
}

impl From<ChipFamily> for DataPlaneVariant {
    fn from(family: ChipFamily) -> Self {
        match family {
            ChipFamily::Legacy => DataPlaneVariant::LegacyOffload,
            ChipFamily::Lithium => DataPlaneVariant::Lithium,
        }
    }
}

/// Reason passed to the platform when scheduling out-of-band recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RecoveryReason {
    Default,
    CrashInjectTimeout,
}

/// Target capabilities reported once the radio interface has the firmware's
/// service map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub max_stations: u32,
    pub chip_family: ChipFamily,
}

/// Radar detection forwarded from firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadarIndication {
    pub channel: u16,
}

/// Callbacks handed to the radio interface when it is opened.
#[derive(Clone)]
pub struct RadioCallbacks {
    pub target_config_updated: Arc<dyn Fn(&TargetConfig) + Send + Sync>,
    pub radar_indicated: Arc<dyn Fn(RadarIndication) + Send + Sync>,
}

impl Default for RadioCallbacks {
    fn default() -> Self {
        Self {
            target_config_updated: Arc::new(|config: &TargetConfig| {
                info!(
                    max_stations = config.max_stations,
                    chip_family = ?config.chip_family,
                    "target configuration updated"
                );
            }),
            radar_indicated: Arc::new(|radar: RadarIndication| {
                info!(channel = radar.channel, "radar indicated");
            }),
        }
    }
}

impl fmt::Debug for RadioCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RadioCallbacks").finish_non_exhaustive()
    }
}

/// Everything the radio interface receives when it is opened.
pub struct RadioOpenContext<'a> {
    pub global: &'a Arc<GlobalContext>,
    pub platform_config: &'a ContextHandle,
    pub callbacks: &'a RadioCallbacks,
    pub config: &'a DriverConfig,
}

/// Firmware loader, bus transport and host-to-target control transport.
pub trait FirmwareTransport: Send + Sync {
    fn download_firmware(&self, loader: &ContextHandle) -> CollabResult;
    fn loader_done(&self, loader: &ContextHandle) -> CollabResult;
    fn cleanup_loader(&self, loader: &ContextHandle);
    fn create_host_transport(
        &self,
        transport: &ContextHandle,
        device: &ContextHandle,
        mode: DriverMode,
    ) -> CollabResult<ContextHandle>;
    fn destroy_host_transport(&self, host: &ContextHandle);
    fn wait_target_ready(&self, host: &ContextHandle) -> CollabResult;
    fn start(&self, host: &ContextHandle) -> CollabResult;
    fn stop(&self, host: &ContextHandle);
    fn disable_interrupts(&self, transport: &ContextHandle);
    fn reset_soc(&self, transport: &ContextHandle);
}

/// Radio interface layer.
pub trait RadioInterface: Send + Sync {
    fn open(&self, ctx: RadioOpenContext<'_>) -> CollabResult;
    fn pre_start(&self) -> CollabResult;
    fn start(&self) -> CollabResult;
    fn stop(&self, reason: StopReason) -> CollabResult;
    fn close(&self) -> CollabResult;
    fn close_service(&self) -> CollabResult;
    fn close_work_queue(&self) -> CollabResult;
    fn wait_for_ready_event(&self) -> CollabResult;
    fn crash_inject(&self) -> CollabResult;
    fn suspend_target(&self) -> CollabResult;
    fn set_needs_shutdown(&self);
    fn needs_shutdown(&self) -> bool;
    fn process_message(&self, _message: Message) -> CollabResult {
        Ok(())
    }
}

pub trait Mac: Send + Sync {
    fn open(
        &self,
        platform_config: &ContextHandle,
        config: &DriverConfig,
    ) -> CollabResult<ContextHandle>;
    fn start(&self, mac: &ContextHandle) -> CollabResult;
    fn stop(&self, mac: &ContextHandle, reason: StopReason) -> CollabResult;
    fn close(&self, mac: &ContextHandle) -> CollabResult;
    fn process_message(&self, _message: Message) -> CollabResult {
        Ok(())
    }
}

pub trait Sme: Send + Sync {
    fn open(&self, mac: &ContextHandle) -> CollabResult;
    fn start(&self, mac: &ContextHandle) -> CollabResult;
    fn stop(&self, mac: &ContextHandle, reason: StopReason) -> CollabResult;
    fn close(&self, mac: &ContextHandle) -> CollabResult;
    fn send_flush_logs_command(&self, mac: &ContextHandle) -> CollabResult;
    fn process_message(&self, _message: Message) -> CollabResult {
        Ok(())
    }
}

pub trait DataPlane: Send + Sync {
    fn soc_attach(
        &self,
        variant: DataPlaneVariant,
        transport: &ContextHandle,
        host: &ContextHandle,
        device: &ContextHandle,
    ) -> CollabResult<ContextHandle>;
    fn soc_detach(&self, soc: &ContextHandle);
    fn pdev_attach(
        &self,
        soc: &ContextHandle,
        platform_config: &ContextHandle,
    ) -> CollabResult<ContextHandle>;
    fn pdev_detach(&self, soc: Option<&ContextHandle>, pdev: &ContextHandle);
    fn packet_log_connect(&self, soc: &ContextHandle, pdev: &ContextHandle);
    fn pdev_post_attach(&self, soc: &ContextHandle, pdev: &ContextHandle) -> CollabResult;
    fn soc_attach_target(&self, soc: &ContextHandle) -> CollabResult;
    fn pdev_attach_target(&self, soc: &ContextHandle, pdev: &ContextHandle) -> CollabResult;
}

/// Message scheduler with one queue per [`MessageQueue`].
pub trait Scheduler: Send + Sync {
    fn open(&self) -> CollabResult;
    fn close(&self);
    fn register_module(&self, queue: MessageQueue, handler: MessageHandler) -> CollabResult;
    fn deregister_module(&self, queue: MessageQueue) -> CollabResult;
    fn post(&self, message: Message) -> CollabResult;
}

/// Component dispatch layer notified around each transition.
pub trait Dispatcher: Send + Sync {
    fn psoc_open(&self, platform_config: &ContextHandle) -> CollabResult;
    fn psoc_enable(&self, platform_config: &ContextHandle) -> CollabResult;
    fn psoc_disable(&self, platform_config: &ContextHandle) -> CollabResult;
    fn psoc_close(&self, platform_config: &ContextHandle) -> CollabResult;
}

/// Platform services: timers, power management, recovery scheduling.
pub trait Platform: Send + Sync {
    fn timer_module_init(&self);
    fn timer_module_deinit(&self);
    fn acquire_suspend_lock(&self, name: &'static str) -> CollabResult;
    fn release_suspend_lock(&self, name: &'static str);
    fn schedule_recovery_work(&self, device: &ContextHandle, reason: RecoveryReason)
        -> CollabResult;
    fn shutdown_notifier_purge(&self);
    fn flush_host_logs(&self);
}

/// The full set of collaborators driven by an orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub firmware: Arc<dyn FirmwareTransport>,
    pub radio: Arc<dyn RadioInterface>,
    pub mac: Arc<dyn Mac>,
    pub sme: Arc<dyn Sme>,
    pub data_plane: Arc<dyn DataPlane>,
    pub scheduler: Arc<dyn Scheduler>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub platform: Arc<dyn Platform>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
