//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Root aggregate owning the registry, events and driver-wide state."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use cds_common::config::{ChannelWidth, DiagnosticsConfig, DriverConfig};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::context::ContextHandle;
use crate::diagnostics::DiagnosticKnobs;
use crate::driver_state::{DriverState, DriverStateCell};
use crate::error::{CdsError, Result};
use crate::event::Event;
use crate::log_completion::{LogCompletionRecord, LogIndicator};
use crate::module::ModuleId;
use crate::registry::ContextRegistry;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Bookkeeping entry for an active interface in the concurrency list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyEntry {
    pub vdev_id: u8,
    pub channel: u16,
}

/// Concurrency side list with its dedicated lock. Only usable between create
/// and destroy.
#[derive(Debug, Default)]
pub struct ConcurrencyList {
    entries: Mutex<Option<Vec<ConcurrencyEntry>>>,
}

impl ConcurrencyList {
    pub fn create(&self) {
        *self.entries.lock() = Some(Vec::new());
    }

    pub fn destroy(&self) {
        *self.entries.lock() = None;
    }

    pub fn is_created(&self) -> bool {
        self.entries.lock().is_some()
    }

    pub fn with_entries<R>(&self, f: impl FnOnce(&mut Vec<ConcurrencyEntry>) -> R) -> Result<R> {
        let mut guard = self.entries.lock();
        let entries = guard
            .as_mut()
            .ok_or(CdsError::NotReady("concurrency list"))?;
        Ok(f(entries))
    }
}

/// Root aggregate for one driver instance.
///
/// Built by [`DriverServices::init`] and retired by [`DriverServices::deinit`];
/// once retired every registry operation reports [`CdsError::NotInitialized`].
#[derive(Debug)]
pub struct GlobalContext {
    token: u64,
    this: Weak<GlobalContext>,
    live: AtomicBool,
    registry: ContextRegistry,
    probe_event: Event,
    firmware_ready_event: Event,
    recovery_event: Event,
    concurrency: ConcurrencyList,
    driver_state: DriverStateCell,
    log_completion: LogCompletionRecord,
    knobs: DiagnosticKnobs,
    ini_config: RwLock<Option<Arc<DriverConfig>>>,
    modules_initialized: AtomicBool,
}

impl GlobalContext {
    fn new() -> Arc<Self> {
        let global = Arc::new_cyclic(|this| Self {
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
            this: this.clone(),
            live: AtomicBool::new(true),
            registry: ContextRegistry::new(),
            probe_event: Event::new("probe"),
            firmware_ready_event: Event::new("firmware_ready"),
            recovery_event: Event::new("recovery_ack"),
            concurrency: ConcurrencyList::default(),
            driver_state: DriverStateCell::new(),
            log_completion: LogCompletionRecord::new(),
            knobs: DiagnosticKnobs::default(),
            ini_config: RwLock::new(None),
            modules_initialized: AtomicBool::new(false),
        });
        global.recovery_event.create();
        global
    }

    /// Identity handed to collaborators as completion user data.
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(CdsError::NotInitialized)
        }
    }

    pub fn alloc_context(&self, module: ModuleId, size: usize) -> Result<ContextHandle> {
        self.ensure_live()?;
        self.registry.alloc(module, size)
    }

    pub fn set_context(&self, module: ModuleId, handle: ContextHandle) -> Result<()> {
        self.ensure_live()?;
        self.registry.set(module, handle)
    }

    pub fn get_context(&self, module: ModuleId) -> Result<Option<ContextHandle>> {
        self.ensure_live()?;
        Ok(self.registry.get(module))
    }

    pub fn free_context(&self, module: ModuleId, handle: &ContextHandle) -> Result<()> {
        self.ensure_live()?;
        self.registry.free(module, handle)
    }

    /// Like [`GlobalContext::get_context`] but an empty slot is an error.
    pub fn require_context(&self, module: ModuleId) -> Result<ContextHandle> {
        self.get_context(module)?
            .ok_or(CdsError::MissingContext(module))
    }

    /// Modules whose slot is occupied.
    pub fn occupied_modules(&self) -> Vec<ModuleId> {
        self.registry.occupied()
    }

    pub(crate) fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    /// Install the platform device and configuration objects discovered at probe.
    pub fn attach_platform(&self, device: ContextHandle, platform_config: ContextHandle) -> Result<()> {
        self.ensure_live()?;
        self.registry.install(ModuleId::Device, device);
        self.registry.install(ModuleId::PlatformConfig, platform_config);
        debug!("platform device and configuration attached");
        Ok(())
    }

    pub fn detach_platform(&self) {
        self.registry.take(ModuleId::Device);
        self.registry.take(ModuleId::PlatformConfig);
        debug!("platform device and configuration detached");
    }

    pub fn probe_event(&self) -> &Event {
        &self.probe_event
    }

    pub fn firmware_ready_event(&self) -> &Event {
        &self.firmware_ready_event
    }

    pub fn recovery_event(&self) -> &Event {
        &self.recovery_event
    }

    pub fn concurrency(&self) -> &ConcurrencyList {
        &self.concurrency
    }

    pub fn driver_state(&self) -> &DriverStateCell {
        &self.driver_state
    }

    pub fn set_driver_state(&self, flags: DriverState) {
        self.driver_state.set(flags);
    }

    pub fn clear_driver_state(&self, flags: DriverState) {
        self.driver_state.clear(flags);
    }

    pub fn log_completion(&self) -> &LogCompletionRecord {
        &self.log_completion
    }

    /// Current bug-report indicator; `Unused` while loading, unloading or recovering.
    pub fn log_indicator(&self) -> LogIndicator {
        if self.driver_state.is_load_or_unload_in_progress() || self.driver_state.is_recovering() {
            return LogIndicator::Unused;
        }
        self.log_completion.indicator()
    }

    pub fn knobs(&self) -> &DiagnosticKnobs {
        &self.knobs
    }

    pub fn apply_diagnostics(&self, config: &DiagnosticsConfig) {
        self.knobs.apply(config);
    }

    pub fn init_ini_config(&self, config: DriverConfig) {
        *self.ini_config.write() = Some(Arc::new(config));
    }

    pub fn deinit_ini_config(&self) {
        self.ini_config.write().take();
    }

    pub fn ini_config(&self) -> Option<Arc<DriverConfig>> {
        self.ini_config.read().clone()
    }

    pub fn is_5_mhz_enabled(&self) -> bool {
        self.ini_config()
            .map(|cfg| cfg.sub_20_channel_width == ChannelWidth::Five)
            .unwrap_or(false)
    }

    pub fn is_10_mhz_enabled(&self) -> bool {
        self.ini_config()
            .map(|cfg| cfg.sub_20_channel_width == ChannelWidth::Ten)
            .unwrap_or(false)
    }

    pub fn is_sub_20_mhz_enabled(&self) -> bool {
        self.ini_config()
            .map(|cfg| cfg.sub_20_channel_width != ChannelWidth::Standard)
            .unwrap_or(false)
    }

    pub fn is_self_recovery_enabled(&self) -> bool {
        self.ini_config()
            .map(|cfg| cfg.self_recovery_enabled)
            .unwrap_or(false)
    }

    pub fn is_packet_log_enabled(&self) -> bool {
        self.ini_config()
            .map(|cfg| cfg.packet_log_enabled)
            .unwrap_or(false)
    }

    pub fn modules_initialized(&self) -> bool {
        self.modules_initialized.load(Ordering::Acquire)
    }

    pub(crate) fn mark_modules_initialized(&self) {
        self.modules_initialized.store(true, Ordering::Release);
    }

    pub(crate) fn clear_modules_initialized(&self) {
        self.modules_initialized.store(false, Ordering::Release);
    }

    /// Sink through which collaborators report asynchronous completions.
    pub fn completion_sink(&self) -> CompletionSink {
        CompletionSink {
            global: self.this.clone(),
            token: self.token,
        }
    }

    fn check_user_data(&self, callback: &'static str, user_data: u64) -> Result<()> {
        if user_data != self.token {
            error!(
                callback,
                expected = self.token,
                received = user_data,
                "completion user data does not match this driver instance"
            );
            return Err(CdsError::ContextMismatch);
        }
        Ok(())
    }

    /// Probe completion from the message-processing thread.
    pub fn probe_callback(&self, user_data: u64) -> Result<()> {
        self.check_user_data("probe", user_data)?;
        self.probe_event.signal().map_err(|err| {
            error!(error = %err, "failed to signal probe event");
            err
        })
    }

    /// Firmware pre-start or stop completion from the radio interface.
    pub fn firmware_complete_callback(&self, user_data: u64) -> Result<()> {
        self.check_user_data("firmware_complete", user_data)?;
        self.firmware_ready_event.signal().map_err(|err| {
            error!(error = %err, "failed to signal firmware ready event");
            err
        })
    }

    /// Crash-injection acknowledgement from the radio interface.
    pub fn recovery_ack_callback(&self, user_data: u64) -> Result<()> {
        self.check_user_data("recovery_ack", user_data)?;
        self.recovery_event.signal()
    }

    fn retire(&self) {
        self.live.store(false, Ordering::Release);
        self.probe_event.destroy();
        self.firmware_ready_event.destroy();
        self.recovery_event.destroy();
        let leaked = self.registry.clear();
        if !leaked.is_empty() {
            warn!(modules = ?leaked, "module contexts still registered at deinit");
        }
        self.deinit_ini_config();
    }
}

/// Weak, identity-checked path from collaborators back to the events of one
/// [`GlobalContext`]. Signals delivered after deinit fail with
/// [`CdsError::NotInitialized`].
#[derive(Debug, Clone)]
pub struct CompletionSink {
    global: Weak<GlobalContext>,
    token: u64,
}

impl CompletionSink {
    fn upgrade(&self) -> Result<Arc<GlobalContext>> {
        let global = self.global.upgrade().ok_or(CdsError::NotInitialized)?;
        global.ensure_live()?;
        Ok(global)
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn firmware_complete(&self) -> Result<()> {
        self.upgrade()?.firmware_complete_callback(self.token)
    }

    pub fn probe(&self) -> Result<()> {
        self.upgrade()?.probe_callback(self.token)
    }

    pub fn recovery_ack(&self) -> Result<()> {
        self.upgrade()?.recovery_ack_callback(self.token)
    }
}

/// Single ownership point for the [`GlobalContext`] of a process.
#[derive(Debug, Default)]
pub struct DriverServices {
    global: Mutex<Option<Arc<GlobalContext>>>,
}

impl DriverServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the global context. Fails if one already exists.
    pub fn init(&self) -> Result<Arc<GlobalContext>> {
        let mut slot = self.global.lock();
        if slot.is_some() {
            return Err(CdsError::AlreadyInitialized);
        }
        let global = GlobalContext::new();
        info!(instance = global.token(), "driver services initialised");
        *slot = Some(global.clone());
        Ok(global)
    }

    /// Retire the global context. Repeated calls are no-ops.
    pub fn deinit(&self) {
        let Some(global) = self.global.lock().take() else {
            debug!("deinit without an initialised context");
            return;
        };
        global.retire();
        info!(instance = global.token(), "driver services deinitialised");
    }

    pub fn global(&self) -> Result<Arc<GlobalContext>> {
        self.global.lock().clone().ok_or(CdsError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.global.lock().is_some()
    }

    pub fn alloc_context(&self, module: ModuleId, size: usize) -> Result<ContextHandle> {
        self.global()?.alloc_context(module, size)
    }

    pub fn set_context(&self, module: ModuleId, handle: ContextHandle) -> Result<()> {
        self.global()?.set_context(module, handle)
    }

    pub fn get_context(&self, module: ModuleId) -> Result<Option<ContextHandle>> {
        self.global()?.get_context(module)
    }

    pub fn free_context(&self, module: ModuleId, handle: &ContextHandle) -> Result<()> {
        self.global()?.free_context(module, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn init_twice_fails_and_deinit_is_idempotent() {
        let services = DriverServices::new();
        services.init().unwrap();
        assert!(matches!(services.init(), Err(CdsError::AlreadyInitialized)));
        services.deinit();
        services.deinit();
        assert!(!services.is_initialized());
        services.init().unwrap();
    }

    #[test]
    fn registry_operations_require_init() {
        let services = DriverServices::new();
        assert!(matches!(
            services.alloc_context(ModuleId::RadioInterface, 4),
            Err(CdsError::NotInitialized)
        ));
        let global = services.init().unwrap();
        let handle = services.alloc_context(ModuleId::RadioInterface, 4).unwrap();
        services.deinit();
        assert!(matches!(
            services.free_context(ModuleId::RadioInterface, &handle),
            Err(CdsError::NotInitialized)
        ));
        assert!(matches!(
            global.get_context(ModuleId::RadioInterface),
            Err(CdsError::NotInitialized)
        ));
    }

    #[test]
    fn completion_sink_checks_identity_and_lifetime() {
        let services = DriverServices::new();
        let global = services.init().unwrap();
        global.firmware_ready_event().create();
        let sink = global.completion_sink();
        sink.firmware_complete().unwrap();
        global
            .firmware_ready_event()
            .wait(Duration::from_millis(10))
            .unwrap();

        assert!(matches!(
            global.firmware_complete_callback(sink.token() + 1000),
            Err(CdsError::ContextMismatch)
        ));

        services.deinit();
        assert!(matches!(sink.probe(), Err(CdsError::NotInitialized)));
    }

    #[test]
    fn ini_predicates_follow_config() {
        let services = DriverServices::new();
        let global = services.init().unwrap();
        assert!(!global.is_sub_20_mhz_enabled());
        global.init_ini_config(DriverConfig {
            sub_20_channel_width: ChannelWidth::Five,
            self_recovery_enabled: true,
            ..DriverConfig::default()
        });
        assert!(global.is_5_mhz_enabled());
        assert!(!global.is_10_mhz_enabled());
        assert!(global.is_sub_20_mhz_enabled());
        assert!(global.is_self_recovery_enabled());
        assert!(!global.is_packet_log_enabled());
        global.deinit_ini_config();
        assert!(global.ini_config().is_none());
    }

    #[test]
    fn log_indicator_hidden_during_recovery() {
        let services = DriverServices::new();
        let global = services.init().unwrap();
        global
            .log_completion()
            .set(crate::log_completion::LogCompletion {
                indicator: LogIndicator::Framework,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(global.log_indicator(), LogIndicator::Framework);
        global.set_driver_state(DriverState::RECOVERING);
        assert_eq!(global.log_indicator(), LogIndicator::Unused);
    }

    #[test]
    fn concurrency_list_requires_create() {
        let services = DriverServices::new();
        let global = services.init().unwrap();
        assert!(global.concurrency().with_entries(|e| e.len()).is_err());
        global.concurrency().create();
        global
            .concurrency()
            .with_entries(|e| e.push(ConcurrencyEntry { vdev_id: 0, channel: 36 }))
            .unwrap();
        global.concurrency().destroy();
        assert!(!global.concurrency().is_created());
    }
}
