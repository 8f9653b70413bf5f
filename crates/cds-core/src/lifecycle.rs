//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Ordered bring-up and tear-down of the wireless subsystem."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
//! The [`Orchestrator`] drives Open, PreEnable, Enable, Disable, PostDisable
//! and Close against the collaborators. Bring-up transitions are
//! all-or-nothing: each completed step pushes its undo action and a failure
//! unwinds them newest-first. Tear-down transitions are best-effort and always
//! run to completion, returning a [`TeardownReport`] of the steps that failed.
//!
//! Transitions take `&mut self`; one control thread drives an orchestrator at
//! a time.

use std::sync::Arc;
use std::time::Instant;

use cds_common::config::{DriverMode, TimeoutConfig};
use cds_logging::{cds_info, log_lifecycle_event, LifecycleOutcome, LogContext};
use strum::{Display, IntoStaticStr};
use tracing::{debug, error, info, warn};

use crate::collaborators::{
    Collaborators, DataPlaneVariant, Message, MessageHandler, MessageKind, MessageQueue,
    RadioCallbacks, RadioOpenContext, StopReason,
};
use crate::driver_state::DriverState;
use crate::error::{
    CdsError, CollabResult, CollabResultExt, CollaboratorError, Component, Result,
};
use crate::global::{CompletionSink, GlobalContext};
use crate::log_completion::{LogCompletion, LogIndicator};
use crate::metrics::LifecycleMetrics;
use crate::module::ModuleId;
use crate::rollback::UndoStack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Opened,
    PreEnabled,
    Enabled,
    Disabled,
    PostDisabled,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Transition {
    Open,
    PreEnable,
    Enable,
    Disable,
    PostDisable,
    Close,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// State reached when the transition completes.
    pub fn target(self) -> LifecycleState {
        match self {
            Transition::Open => LifecycleState::Opened,
            Transition::PreEnable => LifecycleState::PreEnabled,
            Transition::Enable => LifecycleState::Enabled,
            Transition::Disable => LifecycleState::Disabled,
            Transition::PostDisable => LifecycleState::PostDisabled,
            Transition::Close => LifecycleState::Closed,
        }
    }
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    pub fn permits(self, transition: Transition) -> bool {
        use LifecycleState as S;
        match transition {
            Transition::Open => matches!(self, S::Uninitialized | S::Closed),
            Transition::PreEnable => self == S::Opened,
            Transition::Enable => self == S::PreEnabled,
            Transition::Disable => self == S::Enabled,
            Transition::PostDisable => {
                matches!(self, S::Opened | S::PreEnabled | S::Enabled | S::Disabled)
            }
            Transition::Close => !matches!(self, S::Uninitialized | S::Closed),
        }
    }
}

/// A tear-down step that failed without stopping the transition.
#[derive(Debug)]
pub struct StepFailure {
    pub step: &'static str,
    pub error: CdsError,
}

/// Outcome of a best-effort tear-down transition.
#[derive(Debug)]
pub struct TeardownReport {
    transition: Transition,
    failures: Vec<StepFailure>,
    skipped: Vec<&'static str>,
}

impl TeardownReport {
    fn new(transition: Transition) -> Self {
        Self {
            transition,
            failures: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn record(&mut self, step: &'static str, result: Result<()>) {
        if let Err(error) = result {
            self.fail(step, error);
        }
    }

    fn fail(&mut self, step: &'static str, error: CdsError) {
        error!(
            transition = self.transition.as_str(),
            step,
            error = %error,
            "tear-down step failed; continuing"
        );
        self.failures.push(StepFailure { step, error });
    }

    fn skip(&mut self, step: &'static str) {
        self.skipped.push(step);
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    /// No step failed. Skipped steps do not count as failures.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[StepFailure] {
        &self.failures
    }

    pub fn failed_steps(&self) -> Vec<&'static str> {
        self.failures.iter().map(|f| f.step).collect()
    }

    pub fn skipped(&self) -> &[&'static str] {
        &self.skipped
    }

    /// Fold another report into this one.
    pub fn absorb(&mut self, other: TeardownReport) {
        self.failures.extend(other.failures);
        self.skipped.extend(other.skipped);
    }
}

/// Drives the lifecycle of one [`GlobalContext`].
pub struct Orchestrator {
    global: Arc<GlobalContext>,
    collaborators: Collaborators,
    timeouts: TimeoutConfig,
    callbacks: RadioCallbacks,
    metrics: Option<LifecycleMetrics>,
    state: LifecycleState,
}

impl Orchestrator {
    pub fn new(
        global: Arc<GlobalContext>,
        collaborators: Collaborators,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            global,
            collaborators,
            timeouts,
            callbacks: RadioCallbacks::default(),
            metrics: None,
            state: LifecycleState::Uninitialized,
        }
    }

    pub fn with_callbacks(mut self, callbacks: RadioCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_metrics(mut self, metrics: LifecycleMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn global(&self) -> &Arc<GlobalContext> {
        &self.global
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn open(&mut self) -> Result<()> {
        let started = self.begin(Transition::Open)?;
        let result = self.run_open();
        self.finish(Transition::Open, started, result)
    }

    pub fn pre_enable(&mut self) -> Result<()> {
        let started = self.begin(Transition::PreEnable)?;
        let result = self.run_pre_enable();
        self.finish(Transition::PreEnable, started, result)
    }

    pub fn enable(&mut self) -> Result<()> {
        let started = self.begin(Transition::Enable)?;
        let result = self.run_enable();
        self.finish(Transition::Enable, started, result)
    }

    pub fn disable(&mut self) -> Result<TeardownReport> {
        let started = self.begin(Transition::Disable)?;
        let report = self.run_disable();
        Ok(self.finish_teardown(started, report))
    }

    pub fn post_disable(&mut self) -> Result<TeardownReport> {
        let started = self.begin(Transition::PostDisable)?;
        let report = self.run_post_disable();
        Ok(self.finish_teardown(started, report))
    }

    /// Close never fails. Called with nothing open it logs and returns an
    /// empty report.
    pub fn close(&mut self) -> Result<TeardownReport> {
        if !self.state.permits(Transition::Close) {
            warn!(
                state = self.state.as_str(),
                "close requested with nothing open; ignoring"
            );
            return Ok(TeardownReport::new(Transition::Close));
        }
        let started = self.begin(Transition::Close)?;
        let report = self.run_close();
        Ok(self.finish_teardown(started, report))
    }

    /// Tear down from the current state and open again, landing in `Opened`.
    pub fn reenter_after_recovery(&mut self) -> Result<TeardownReport> {
        if self.state == LifecycleState::Uninitialized {
            return Err(CdsError::InvalidTransition {
                state: self.state,
                transition: Transition::Open,
            });
        }
        if !self.global.driver_state().is_recovering() {
            warn!("re-entering the lifecycle without the recovering flag set");
        }
        let config = self.global.ini_config();
        let mut report = TeardownReport::new(Transition::Close);
        if self.state.permits(Transition::Disable) {
            report.absorb(self.disable()?);
        }
        if self.state.permits(Transition::PostDisable) {
            report.absorb(self.post_disable()?);
        }
        if self.state.permits(Transition::Close) {
            report.absorb(self.close()?);
        }
        if let Some(config) = config {
            self.global.init_ini_config((*config).clone());
        }
        self.open()?;
        info!(
            failed_steps = report.failures().len(),
            "lifecycle re-entered after recovery"
        );
        Ok(report)
    }

    /// Clear the recovering flag once the restarted lifecycle is up.
    pub fn finish_recovery(&self) {
        self.global.clear_driver_state(DriverState::RECOVERING);
        info!(state = self.state.as_str(), "recovery finished");
    }

    /// Record a bug report and ask for the logs to be flushed.
    pub fn flush_logs(&self, completion: LogCompletion) -> Result<()> {
        let global = &self.global;
        if !global.knobs().is_fatal_event_enabled() {
            error!("fatal event reporting is not enabled");
            return Err(CdsError::NotReady("fatal event reporting disabled"));
        }
        let state = global.driver_state();
        if state.is_load_or_unload_in_progress() || state.is_recovering() {
            error!("load, unload or recovery in progress; not flushing logs");
            return Err(CdsError::NotReady("load, unload or recovery in progress"));
        }
        if global.log_completion().is_in_progress() {
            error!(
                is_fatal = completion.is_fatal,
                indicator = %completion.indicator,
                reason_code = completion.reason_code,
                "bug report already in progress; dropping request"
            );
            return Err(CdsError::AlreadyInProgress("bug report"));
        }
        global.log_completion().set(completion)?;
        error!(
            is_fatal = completion.is_fatal,
            indicator = %completion.indicator,
            reason_code = completion.reason_code,
            "triggering bug report"
        );

        if completion.indicator == LogIndicator::HostOnly {
            self.collaborators.platform.flush_host_logs();
            return Ok(());
        }

        let flushed = global.require_context(ModuleId::Mac).and_then(|mac| {
            self.collaborators
                .sme
                .send_flush_logs_command(&mac)
                .component(Component::Sme, "send flush logs command")
        });
        if let Err(err) = flushed {
            error!(error = %err, "failed to request a firmware log flush");
            global.log_completion().init();
            return Err(err);
        }
        Ok(())
    }

    fn begin(&self, transition: Transition) -> Result<Instant> {
        if !self.state.permits(transition) {
            warn!(
                state = self.state.as_str(),
                transition = transition.as_str(),
                "rejecting lifecycle transition"
            );
            return Err(CdsError::InvalidTransition {
                state: self.state,
                transition,
            });
        }
        let ctx = LogContext::new()
            .with_transition(transition.as_str())
            .with_state(self.state.as_str());
        cds_info!(context = ctx, "transition starting");
        Ok(Instant::now())
    }

    fn finish(&mut self, transition: Transition, started: Instant, result: Result<()>) -> Result<()> {
        let outcome = match &result {
            Ok(()) => {
                self.state = transition.target();
                LifecycleOutcome::Success
            }
            Err(_) => LifecycleOutcome::Fault,
        };
        let message = match &result {
            Ok(()) => String::from("transition completed"),
            Err(err) => format!("transition failed: {}", err),
        };
        self.report(transition, started, outcome, &message);
        result
    }

    fn finish_teardown(&mut self, started: Instant, report: TeardownReport) -> TeardownReport {
        let transition = report.transition();
        self.state = transition.target();
        let (outcome, message) = if report.is_clean() {
            (LifecycleOutcome::Success, String::from("transition completed"))
        } else {
            (
                LifecycleOutcome::Fault,
                format!(
                    "transition completed with failed steps: {}",
                    report.failed_steps().join(", ")
                ),
            )
        };
        self.report(transition, started, outcome, &message);
        report
    }

    fn report(
        &self,
        transition: Transition,
        started: Instant,
        outcome: LifecycleOutcome,
        message: &str,
    ) {
        let ctx = LogContext::new()
            .with_transition(transition.as_str())
            .with_state(self.state.as_str());
        log_lifecycle_event(Some(&ctx), "lifecycle.transition", message, outcome);
        if let Some(metrics) = &self.metrics {
            metrics.record_transition(transition.as_str(), outcome, started.elapsed());
        }
    }

    fn run_open(&self) -> Result<()> {
        let global = &self.global;
        let c = &self.collaborators;
        let mut undo = UndoStack::new("open", self.metrics.clone());

        c.platform.timer_module_init();
        undo.push("deinit timer module", move || c.platform.timer_module_deinit());
        global.log_completion().init();

        global.probe_event().create();
        undo.push("destroy probe event", move || global.probe_event().destroy());
        global.firmware_ready_event().create();
        undo.push("destroy firmware ready event", move || {
            global.firmware_ready_event().destroy()
        });

        let config = global
            .ini_config()
            .ok_or(CdsError::MissingConfig("driver configuration"))?;
        let platform_config = global
            .get_context(ModuleId::PlatformConfig)?
            .ok_or(CdsError::MissingConfig("platform configuration"))?;

        global.concurrency().create();
        undo.push("destroy concurrency list", move || global.concurrency().destroy());

        if !global.modules_initialized() || global.driver_state().is_recovering() {
            c.scheduler
                .open()
                .component(Component::Scheduler, "open")?;
            undo.push("close scheduler", move || c.scheduler.close());
        }

        let transport = global.require_context(ModuleId::FirmwareTransport)?;
        let loader = global.require_context(ModuleId::FirmwareLoader)?;
        let device = global.require_context(ModuleId::Device)?;

        c.firmware
            .download_firmware(&loader)
            .component(Component::FirmwareTransport, "download firmware")?;
        {
            let loader = loader.clone();
            undo.push("clean up firmware loader", move || {
                c.firmware.cleanup_loader(&loader)
            });
        }

        let host = c
            .firmware
            .create_host_transport(&transport, &device, config.mode)
            .component(Component::FirmwareTransport, "create host transport")?;
        global.registry().install(ModuleId::HostTransport, host.clone());
        {
            let host = host.clone();
            undo.push("destroy host transport", move || {
                global.registry().take(ModuleId::HostTransport);
                c.firmware.destroy_host_transport(&host);
            });
        }

        c.firmware
            .loader_done(&loader)
            .component(Component::FirmwareTransport, "complete loader phase")?;

        c.radio
            .open(RadioOpenContext {
                global,
                platform_config: &platform_config,
                callbacks: &self.callbacks,
                config: &config,
            })
            .component(Component::RadioInterface, "open")?;
        undo.push("close radio interface", move || {
            c.platform.shutdown_notifier_purge();
            log_undo_failure(c.radio.close(), Component::RadioInterface, "close");
            log_undo_failure(
                c.radio.close_service(),
                Component::RadioInterface,
                "close service",
            );
        });

        c.firmware
            .wait_target_ready(&host)
            .component(Component::FirmwareTransport, "wait for target ready")?;

        let variant = DataPlaneVariant::from(config.chip_family);
        debug!(variant = %variant, "attaching data plane");
        let soc = c
            .data_plane
            .soc_attach(variant, &transport, &host, &device)
            .component(Component::DataPlane, "attach soc")?;
        global.registry().install(ModuleId::DataPlaneSoc, soc.clone());
        {
            let soc = soc.clone();
            undo.push("detach data plane soc", move || {
                global.registry().take(ModuleId::DataPlaneSoc);
                c.data_plane.soc_detach(&soc);
            });
        }

        let mac = c
            .mac
            .open(&platform_config, &config)
            .component(Component::Mac, "open")?;
        global.registry().install(ModuleId::Mac, mac.clone());
        {
            let mac = mac.clone();
            undo.push("close mac", move || {
                log_undo_failure(c.mac.close(&mac), Component::Mac, "close");
                global.registry().take(ModuleId::Mac);
            });
        }

        c.sme.open(&mac).component(Component::Sme, "open")?;
        {
            let mac = mac.clone();
            undo.push("close sme", move || {
                log_undo_failure(c.sme.close(&mac), Component::Sme, "close")
            });
        }

        let pdev = c
            .data_plane
            .pdev_attach(&soc, &platform_config)
            .component(Component::DataPlane, "attach pdev")?;
        global.set_context(ModuleId::DataPlanePdev, pdev.clone())?;
        undo.push("detach data plane pdev", move || {
            global.registry().take(ModuleId::DataPlanePdev);
            c.data_plane.pdev_detach(Some(&soc), &pdev);
        });

        if config.mode == DriverMode::Mission {
            debug!(
                max_stations = config.max_stations,
                "peer limit taken from driver configuration"
            );
        }

        for queue in MessageQueue::PRIORITY_ORDER {
            c.scheduler
                .register_module(queue, self.handler_for(queue))
                .component(Component::Scheduler, "register module")?;
            undo.push("deregister message queue", move || {
                log_undo_failure(
                    c.scheduler.deregister_module(queue),
                    Component::Scheduler,
                    "deregister module",
                )
            });
        }

        c.dispatcher
            .psoc_open(&platform_config)
            .component(Component::Dispatcher, "psoc open")?;

        undo.commit();
        global.mark_modules_initialized();
        Ok(())
    }

    fn run_pre_enable(&self) -> Result<()> {
        let global = &self.global;
        let c = &self.collaborators;

        global.require_context(ModuleId::Mac)?;
        global.require_context(ModuleId::RadioInterface)?;
        global.require_context(ModuleId::FirmwareTransport)?;
        let host = global.require_context(ModuleId::HostTransport)?;
        let soc = global.require_context(ModuleId::DataPlaneSoc)?;
        let pdev = global.require_context(ModuleId::DataPlanePdev)?;
        let config = global
            .ini_config()
            .ok_or(CdsError::MissingConfig("driver configuration"))?;

        if config.mode.supports_packet_log() {
            c.data_plane.packet_log_connect(&soc, &pdev);
        }

        let ready = global.firmware_ready_event();
        ready.reset();
        c.radio
            .pre_start()
            .component(Component::RadioInterface, "pre-start")?;
        if let Err(err) = ready.wait(self.timeouts.firmware_ready_ms) {
            if err.is_timeout() {
                error!(
                    timeout_ms = self.timeouts.firmware_ready_ms.as_millis() as u64,
                    "timed out waiting for firmware pre-start completion"
                );
            } else {
                error!(error = %err, "firmware pre-start reported an error");
            }
            self.probe_message_thread();
            return Err(err);
        }

        c.firmware
            .start(&host)
            .component(Component::FirmwareTransport, "start")?;

        if let Err(source) = c.radio.wait_for_ready_event() {
            if global.is_self_recovery_enabled() {
                error!(error = %source, "no ready event from target firmware");
            } else {
                error!(
                    error = %source,
                    "no ready event from target firmware and self-recovery is disabled"
                );
            }
            c.firmware.stop(&host);
            return Err(CdsError::collaborator(
                Component::RadioInterface,
                "wait for ready event",
                source,
            ));
        }

        if let Err(source) = c.data_plane.pdev_post_attach(&soc, &pdev) {
            c.firmware.stop(&host);
            return Err(CdsError::collaborator(
                Component::DataPlane,
                "pdev post-attach",
                source,
            ));
        }
        Ok(())
    }

    /// Post one probe to the message-processing thread and wait for the
    /// answer. Only used to localise a firmware timeout.
    fn probe_message_thread(&self) {
        let probe = self.global.probe_event();
        probe.reset();
        warn!("posting a probe message to check the message-processing thread");
        if let Err(err) = self.collaborators.scheduler.post(Message::probe()) {
            error!(error = %err, "failed to post probe message");
            return;
        }
        match probe.wait(self.timeouts.probe_ms) {
            Ok(()) => info!("message-processing thread answered the probe"),
            Err(err) => error!(error = %err, "message-processing thread did not answer the probe"),
        }
    }

    fn run_enable(&self) -> Result<()> {
        let global = &self.global;
        let c = &self.collaborators;

        global.require_context(ModuleId::RadioInterface)?;
        let mac = global.require_context(ModuleId::Mac)?;
        let soc = global.require_context(ModuleId::DataPlaneSoc)?;
        let pdev = global.require_context(ModuleId::DataPlanePdev)?;
        let platform_config = global.require_context(ModuleId::PlatformConfig)?;

        c.radio
            .start()
            .component(Component::RadioInterface, "start")?;
        let mut undo = UndoStack::new("enable", self.metrics.clone());
        undo.push("stop radio interface", move || self.stop_radio_bounded());

        c.mac.start(&mac).component(Component::Mac, "start")?;
        {
            let mac = mac.clone();
            undo.push("stop mac", move || {
                log_undo_failure(
                    c.mac.stop(&mac, StopReason::SystemReset),
                    Component::Mac,
                    "stop",
                )
            });
        }

        c.sme.start(&mac).component(Component::Sme, "start")?;
        undo.push("stop sme", move || {
            log_undo_failure(
                c.sme.stop(&mac, StopReason::SystemReset),
                Component::Sme,
                "stop",
            )
        });

        c.data_plane
            .soc_attach_target(&soc)
            .component(Component::DataPlane, "attach soc target")?;
        c.data_plane
            .pdev_attach_target(&soc, &pdev)
            .component(Component::DataPlane, "attach pdev target")?;

        undo.commit();
        if let Err(err) = c.dispatcher.psoc_enable(&platform_config) {
            error!(error = %err, "dispatcher psoc enable failed");
        }
        Ok(())
    }

    /// Stop the radio interface and wait for its completion. Any failure marks
    /// the radio for forced shutdown instead of propagating.
    fn stop_radio_bounded(&self) {
        let radio = &self.collaborators.radio;
        let ready = self.global.firmware_ready_event();
        ready.reset();
        match radio.stop(StopReason::RfKill) {
            Err(err) => {
                error!(error = %err, "radio interface stop failed; forcing shutdown at close");
                radio.set_needs_shutdown();
            }
            Ok(()) => {
                if let Err(err) = ready.wait(self.timeouts.radio_stop_ms) {
                    error!(
                        error = %err,
                        "radio interface stop did not complete; forcing shutdown at close"
                    );
                    radio.set_needs_shutdown();
                }
            }
        }
    }

    fn run_disable(&self) -> TeardownReport {
        let global = &self.global;
        let c = &self.collaborators;
        let mut report = TeardownReport::new(Transition::Disable);

        match global.require_context(ModuleId::PlatformConfig) {
            Ok(platform_config) => report.record(
                "dispatcher psoc disable",
                c.dispatcher
                    .psoc_disable(&platform_config)
                    .component(Component::Dispatcher, "psoc disable"),
            ),
            Err(err) => report.fail("dispatcher psoc disable", err),
        }

        if let Err(source) = c.radio.stop(StopReason::RfKill) {
            c.radio.set_needs_shutdown();
            report.fail(
                "stop radio interface",
                CdsError::collaborator(Component::RadioInterface, "stop", source),
            );
        }

        match global.require_context(ModuleId::Mac) {
            Ok(mac) => {
                report.record(
                    "stop sme",
                    c.sme
                        .stop(&mac, StopReason::DeepSleep)
                        .component(Component::Sme, "stop"),
                );
                report.record(
                    "stop mac",
                    c.mac
                        .stop(&mac, StopReason::DeepSleep)
                        .component(Component::Mac, "stop"),
                );
            }
            Err(err) => {
                report.fail("resolve mac context", err);
                report.skip("stop sme");
                report.skip("stop mac");
            }
        }
        report
    }

    fn run_post_disable(&self) -> TeardownReport {
        let global = &self.global;
        let c = &self.collaborators;
        let mut report = TeardownReport::new(Transition::PostDisable);

        match global.require_context(ModuleId::RadioInterface) {
            Ok(_) if global.driver_state().is_recovering() => {
                info!("recovery in progress; not suspending the target");
                report.skip("suspend target");
            }
            Ok(_) => report.record(
                "suspend target",
                c.radio
                    .suspend_target()
                    .component(Component::RadioInterface, "suspend target"),
            ),
            Err(err) => {
                report.fail("resolve radio interface context", err);
                report.skip("suspend target");
            }
        }

        match global.require_context(ModuleId::FirmwareTransport) {
            Ok(transport) => {
                c.firmware.disable_interrupts(&transport);
                c.firmware.reset_soc(&transport);
            }
            Err(err) => {
                report.fail("resolve firmware transport context", err);
                report.skip("disable transport interrupts");
                report.skip("reset transport");
            }
        }
        report
    }

    fn run_close(&self) -> TeardownReport {
        let global = &self.global;
        let registry = global.registry();
        let c = &self.collaborators;
        let mut report = TeardownReport::new(Transition::Close);

        report.record(
            "close radio work queue",
            c.radio
                .close_work_queue()
                .component(Component::RadioInterface, "close work queue"),
        );

        if let Some(host) = registry.take(ModuleId::HostTransport) {
            c.firmware.stop(&host);
            c.firmware.destroy_host_transport(&host);
        }

        let soc = registry.get(ModuleId::DataPlaneSoc);
        if let Some(pdev) = registry.take(ModuleId::DataPlanePdev) {
            c.data_plane.pdev_detach(soc.as_ref(), &pdev);
        }

        match registry.take(ModuleId::Mac) {
            Some(mac) => {
                report.record("close sme", c.sme.close(&mac).component(Component::Sme, "close"));
                report.record("close mac", c.mac.close(&mac).component(Component::Mac, "close"));
            }
            None => {
                report.skip("close sme");
                report.skip("close mac");
            }
        }

        if let Some(soc) = registry.take(ModuleId::DataPlaneSoc) {
            c.data_plane.soc_detach(&soc);
        }

        c.platform.shutdown_notifier_purge();

        if c.radio.needs_shutdown() {
            error!("radio interface is marked for forced shutdown; skipping close");
            report.skip("close radio interface");
        } else {
            report.record(
                "close radio interface",
                c.radio.close().component(Component::RadioInterface, "close"),
            );
        }
        report.record(
            "close radio service",
            c.radio
                .close_service()
                .component(Component::RadioInterface, "close service"),
        );

        global.firmware_ready_event().destroy();
        global.probe_event().destroy();
        global.concurrency().destroy();
        global.log_completion().deinit();
        global.deinit_ini_config();
        c.platform.timer_module_deinit();

        for queue in MessageQueue::PRIORITY_ORDER {
            report.record(
                "deregister message queue",
                c.scheduler
                    .deregister_module(queue)
                    .component(Component::Scheduler, "deregister module"),
            );
        }

        match registry.get(ModuleId::PlatformConfig) {
            Some(platform_config) => report.record(
                "dispatcher psoc close",
                c.dispatcher
                    .psoc_close(&platform_config)
                    .component(Component::Dispatcher, "psoc close"),
            ),
            None => report.fail(
                "dispatcher psoc close",
                CdsError::MissingContext(ModuleId::PlatformConfig),
            ),
        }

        let state = global.driver_state();
        if state.is_unloading() || state.is_recovering() {
            c.scheduler.close();
            global.clear_modules_initialized();
        }
        report
    }

    fn handler_for(&self, queue: MessageQueue) -> MessageHandler {
        match queue {
            MessageQueue::Timer => {
                let sink = self.global.completion_sink();
                Arc::new(move |message: Message| system_message(&sink, message))
            }
            MessageQueue::TargetInterface => {
                let radio = self.collaborators.radio.clone();
                Arc::new(move |message: Message| radio.process_message(message))
            }
            MessageQueue::LegacyPe => {
                let mac = self.collaborators.mac.clone();
                Arc::new(move |message: Message| mac.process_message(message))
            }
            MessageQueue::LegacySme => {
                let sme = self.collaborators.sme.clone();
                Arc::new(move |message: Message| sme.process_message(message))
            }
            MessageQueue::OsInterface => Arc::new(os_interface_message),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state)
            .field("instance", &self.global.token())
            .finish_non_exhaustive()
    }
}

fn log_undo_failure(result: CollabResult, component: Component, operation: &'static str) {
    if let Err(err) = result {
        error!(component = %component, operation, error = %err, "undo step failed");
    }
}

fn system_message(sink: &CompletionSink, message: Message) -> CollabResult {
    match message.kind {
        MessageKind::Probe => sink
            .probe()
            .map_err(|err| CollaboratorError::new(err.to_string())),
        MessageKind::Deferred(work) => {
            work();
            Ok(())
        }
        MessageKind::Component(code) => {
            debug!(code, "ignoring component message on the timer queue");
            Ok(())
        }
    }
}

fn os_interface_message(message: Message) -> CollabResult {
    match message.kind {
        MessageKind::Deferred(work) => {
            work();
            Ok(())
        }
        other => Err(CollaboratorError::new(format!(
            "unexpected {:?} on the os interface queue",
            other
        ))),
    }
}
