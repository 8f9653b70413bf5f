//! ---
//! cds_section: "03-lifecycle-core"
//! cds_subsection: "tests"
//! cds_type: "source"
//! cds_scope: "test"
//! cds_description: "Lifecycle orchestration against the simulated collaborators."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
mod common;

use cds_common::{ChipFamily, DriverConfig, DriverMode};
use cds_core::{
    CdsError, Component, DataPlaneVariant, DriverState, LifecycleMetrics, LifecycleState,
    LogCompletion, LogIndicator, MessageQueue, ModuleId, RadioInterface, StopReason, Transition,
};
use common::Rig;

const OPEN_STEPS: [&str; 12] = [
    "scheduler.open",
    "firmware.download",
    "firmware.create_host_transport",
    "firmware.loader_done",
    "radio.open",
    "firmware.wait_target_ready",
    "data_plane.soc_attach",
    "mac.open",
    "sme.open",
    "data_plane.pdev_attach",
    "scheduler.register_module",
    "dispatcher.psoc_open",
];

#[test]
fn full_cycle_leaves_nothing_behind() {
    let rig = Rig::new();
    let mut orchestrator = rig.enabled();
    assert_eq!(orchestrator.state(), LifecycleState::Enabled);
    for module in [
        ModuleId::RadioInterface,
        ModuleId::HostTransport,
        ModuleId::Mac,
        ModuleId::DataPlaneSoc,
        ModuleId::DataPlanePdev,
    ] {
        assert!(rig.global.require_context(module).is_ok(), "{module} missing");
    }
    assert!(rig.global.modules_initialized());

    assert!(orchestrator.disable().unwrap().is_clean());
    assert!(orchestrator.post_disable().unwrap().is_clean());
    rig.global.set_driver_state(DriverState::UNLOADING);
    assert!(orchestrator.close().unwrap().is_clean());
    assert_eq!(orchestrator.state(), LifecycleState::Closed);
    assert!(rig.extra_modules().is_empty());
    assert!(!rig.bench.scheduler.is_running());

    rig.bench.remove(&rig.global).unwrap();
    assert!(rig.global.occupied_modules().is_empty());
    assert!(
        rig.bench.journal.outstanding().is_empty(),
        "leaked: {:?}",
        rig.bench.journal.outstanding()
    );
}

/// Journal entry written by the undo action of each Open step, if it has one.
const OPEN_UNDO: [(&str, Option<&str>); 12] = [
    ("scheduler.open", Some("scheduler.close")),
    ("firmware.download", Some("firmware.cleanup_loader")),
    ("firmware.create_host_transport", Some("firmware.destroy_host_transport")),
    ("firmware.loader_done", None),
    ("radio.open", Some("radio.close")),
    ("firmware.wait_target_ready", None),
    ("data_plane.soc_attach", Some("data_plane.soc_detach")),
    ("mac.open", Some("mac.close")),
    ("sme.open", Some("sme.close")),
    ("data_plane.pdev_attach", Some("data_plane.pdev_detach")),
    ("scheduler.register_module", Some("scheduler.deregister_module")),
    ("dispatcher.psoc_open", None),
];

#[test]
fn queues_register_in_priority_order() {
    let rig = Rig::new();
    let mut orchestrator = rig.orchestrator();
    orchestrator.open().unwrap();
    assert_eq!(
        rig.bench.scheduler.registered_queues(),
        vec![
            MessageQueue::Timer,
            MessageQueue::TargetInterface,
            MessageQueue::LegacyPe,
            MessageQueue::LegacySme,
            MessageQueue::OsInterface,
        ]
    );
    assert_eq!(
        rig.bench.journal.count("scheduler.register_module"),
        MessageQueue::PRIORITY_ORDER.len()
    );
}

#[test]
fn mac_open_failure_releases_earlier_resources() {
    let rig = Rig::new();
    rig.bench.journal.fail("mac.open");
    let mut orchestrator = rig.orchestrator();

    let err = orchestrator.open().unwrap_err();
    assert!(matches!(
        err,
        CdsError::Collaborator {
            component: Component::Mac,
            operation: "open",
            ..
        }
    ));
    assert_eq!(orchestrator.state(), LifecycleState::Uninitialized);
    assert!(rig.extra_modules().is_empty());
    assert!(rig.bench.journal.outstanding().is_empty());
    assert!(!rig.bench.journal.contains("sme.open"));
    assert!(!rig.global.firmware_ready_event().is_live());
    assert!(!rig.global.probe_event().is_live());
    assert!(!rig.global.concurrency().is_created());

    let journal = &rig.bench.journal;
    let soc = journal.position("data_plane.soc_detach").unwrap();
    let radio = journal.position("radio.close").unwrap();
    let host = journal.position("firmware.destroy_host_transport").unwrap();
    assert!(soc < radio && radio < host);

    journal.heal("mac.open");
    orchestrator.open().unwrap();
    assert_eq!(orchestrator.state(), LifecycleState::Opened);
}

#[test]
fn open_failure_at_any_step_unwinds_exactly_the_completed_steps() {
    for step in OPEN_STEPS {
        let rig = Rig::new();
        rig.bench.journal.fail(step);
        let mut orchestrator = rig.orchestrator();
        assert!(orchestrator.open().is_err(), "{step} should fail open");
        assert_eq!(orchestrator.state(), LifecycleState::Uninitialized);
        assert!(
            rig.extra_modules().is_empty(),
            "{step}: modules left {:?}",
            rig.extra_modules()
        );
        assert!(
            rig.bench.journal.outstanding().is_empty(),
            "{step}: leaked {:?}",
            rig.bench.journal.outstanding()
        );
        assert!(!rig.global.modules_initialized());
        assert!(!rig.bench.scheduler.is_running(), "{step}: scheduler left open");
    }
}

#[test]
fn open_failure_undoes_completed_steps_in_reverse_order() {
    let undo_entries: Vec<&str> = OPEN_UNDO
        .iter()
        .filter_map(|(_, undo)| *undo)
        .chain(["platform.timer_deinit"])
        .collect();

    for (k, (step, _)) in OPEN_UNDO.iter().enumerate() {
        let rig = Rig::new();
        rig.bench.journal.clear();
        rig.bench.journal.fail(*step);
        let mut orchestrator = rig.orchestrator();
        assert!(orchestrator.open().is_err(), "{step} should fail open");

        let mut expected = vec!["platform.timer_deinit"];
        for (earlier, undo) in &OPEN_UNDO[..k] {
            if let Some(undo) = undo {
                let times = if *earlier == "scheduler.register_module" {
                    MessageQueue::PRIORITY_ORDER.len()
                } else {
                    1
                };
                expected.extend(std::iter::repeat(*undo).take(times));
            }
        }
        expected.reverse();

        let entries = rig.bench.journal.entries();
        let failed_at = entries.iter().position(|entry| entry == step).unwrap();
        let undone: Vec<&str> = entries[failed_at + 1..]
            .iter()
            .copied()
            .filter(|entry| undo_entries.contains(entry))
            .collect();
        assert_eq!(undone, expected, "{step}: undo order");
    }
}

#[test]
fn open_without_driver_configuration_fails_cleanly() {
    let rig = Rig::new();
    rig.global.deinit_ini_config();
    let mut orchestrator = rig.orchestrator();
    assert!(matches!(
        orchestrator.open(),
        Err(CdsError::MissingConfig(_))
    ));
    assert!(rig.bench.journal.outstanding().is_empty());
}

#[test]
fn pre_enable_timeout_posts_exactly_one_probe() {
    let rig = Rig::new();
    rig.bench.radio.set_answer_pre_start(false);
    let mut orchestrator = rig.orchestrator();
    orchestrator.open().unwrap();

    let err = orchestrator.pre_enable().unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(orchestrator.state(), LifecycleState::Opened);
    assert_eq!(rig.bench.journal.count("scheduler.post_probe"), 1);
    assert!(!rig.bench.journal.contains("firmware.start"));

    assert!(orchestrator.close().unwrap().is_clean());
}

#[test]
fn stalled_message_thread_still_gets_a_single_probe() {
    let rig = Rig::new();
    rig.bench.radio.set_answer_pre_start(false);
    rig.bench.scheduler.stall(true);
    let mut orchestrator = rig.orchestrator();
    orchestrator.open().unwrap();

    assert!(orchestrator.pre_enable().unwrap_err().is_timeout());
    assert_eq!(rig.bench.journal.count("scheduler.post_probe"), 1);
    assert!(!rig.global.probe_event().is_signaled());
}

#[test]
fn missing_ready_event_stops_the_host_transport() {
    let rig = Rig::new();
    rig.bench.journal.fail("radio.wait_for_ready_event");
    let mut orchestrator = rig.orchestrator();
    orchestrator.open().unwrap();
    assert!(orchestrator.pre_enable().is_err());
    assert_eq!(orchestrator.state(), LifecycleState::Opened);
    let journal = &rig.bench.journal;
    assert!(journal.position("firmware.stop") > journal.position("firmware.start"));
}

#[test]
fn packet_log_follows_driver_mode() {
    let rig = Rig::with_config(DriverConfig {
        mode: DriverMode::Ftm,
        chip_family: ChipFamily::Lithium,
        ..DriverConfig::default()
    });
    let mut orchestrator = rig.orchestrator();
    orchestrator.open().unwrap();
    orchestrator.pre_enable().unwrap();
    assert!(!rig.bench.journal.contains("data_plane.packet_log_connect"));
    assert_eq!(
        rig.bench.data_plane.attached_variant(),
        Some(DataPlaneVariant::Lithium)
    );

    let rig = Rig::new();
    let mut orchestrator = rig.orchestrator();
    orchestrator.open().unwrap();
    orchestrator.pre_enable().unwrap();
    assert!(rig.bench.journal.contains("data_plane.packet_log_connect"));
}

#[test]
fn enable_failure_rolls_back_and_stays_pre_enabled() {
    let rig = Rig::new();
    rig.bench.journal.fail("data_plane.pdev_attach_target");
    let mut orchestrator = rig.orchestrator();
    orchestrator.open().unwrap();
    orchestrator.pre_enable().unwrap();

    assert!(orchestrator.enable().is_err());
    assert_eq!(orchestrator.state(), LifecycleState::PreEnabled);
    assert_eq!(rig.bench.mac.stop_reasons(), vec![StopReason::SystemReset]);

    let journal = &rig.bench.journal;
    let sme = journal.position("sme.stop").unwrap();
    let mac = journal.position("mac.stop").unwrap();
    let radio = journal.position("radio.stop").unwrap();
    assert!(sme < mac && mac < radio);
    assert!(!rig.bench.radio.needs_shutdown());
    assert!(!journal.contains("dispatcher.psoc_enable"));

    assert!(orchestrator.close().unwrap().is_clean());
}

#[test]
fn radio_start_failure_is_not_rolled_back() {
    let rig = Rig::new();
    rig.bench.journal.fail("radio.start");
    let mut orchestrator = rig.orchestrator();
    orchestrator.open().unwrap();
    orchestrator.pre_enable().unwrap();
    assert!(orchestrator.enable().is_err());
    assert!(!rig.bench.journal.contains("radio.stop"));
    assert!(!rig.bench.journal.contains("mac.stop"));
}

#[test]
fn unanswered_stop_marks_the_radio_for_forced_shutdown() {
    let rig = Rig::new();
    rig.bench.radio.set_answer_stop(false);
    rig.bench.journal.fail("sme.start");
    let mut orchestrator = rig.orchestrator();
    orchestrator.open().unwrap();
    orchestrator.pre_enable().unwrap();

    assert!(orchestrator.enable().is_err());
    assert!(rig.bench.radio.needs_shutdown());

    let report = orchestrator.close().unwrap();
    assert!(report.skipped().contains(&"close radio interface"));
    assert!(!rig.bench.journal.contains("radio.close"));
    assert_eq!(orchestrator.state(), LifecycleState::Closed);
}

#[test]
fn close_completes_when_every_teardown_step_fails() {
    let rig = Rig::new();
    let mut orchestrator = rig.enabled();
    for step in [
        "dispatcher.psoc_disable",
        "radio.stop",
        "sme.stop",
        "mac.stop",
        "radio.suspend_target",
        "radio.close_work_queue",
        "sme.close",
        "mac.close",
        "radio.close",
        "radio.close_service",
        "scheduler.deregister_module",
        "dispatcher.psoc_close",
    ] {
        rig.bench.journal.fail(step);
    }

    let disabled = orchestrator.disable().unwrap();
    assert_eq!(disabled.transition(), Transition::Disable);
    assert_eq!(
        disabled.failed_steps(),
        vec!["dispatcher psoc disable", "stop radio interface", "stop sme", "stop mac"]
    );
    assert!(rig.bench.radio.needs_shutdown());

    assert!(!orchestrator.post_disable().unwrap().is_clean());
    let closed = orchestrator.close().unwrap();
    assert!(!closed.is_clean());
    assert!(closed.skipped().contains(&"close radio interface"));
    assert_eq!(orchestrator.state(), LifecycleState::Closed);
    assert!(!rig.global.firmware_ready_event().is_live());
    assert!(rig.global.ini_config().is_none());
}

#[test]
fn transitions_out_of_order_are_rejected() {
    let rig = Rig::new();
    let mut orchestrator = rig.orchestrator();
    assert!(matches!(
        orchestrator.enable(),
        Err(CdsError::InvalidTransition {
            state: LifecycleState::Uninitialized,
            transition: Transition::Enable,
        })
    ));
    assert!(orchestrator.disable().is_err());

    let report = orchestrator.close().unwrap();
    assert!(report.is_clean());
    assert_eq!(orchestrator.state(), LifecycleState::Uninitialized);

    orchestrator.open().unwrap();
    assert!(orchestrator.open().is_err());
}

#[test]
fn scheduler_survives_a_plain_restart() {
    let rig = Rig::new();
    let mut orchestrator = rig.enabled();
    orchestrator.disable().unwrap();
    orchestrator.post_disable().unwrap();
    assert!(orchestrator.close().unwrap().is_clean());
    assert!(rig.bench.scheduler.is_running());
    assert!(rig.global.modules_initialized());

    rig.global.init_ini_config(DriverConfig::default());
    orchestrator.open().unwrap();
    assert_eq!(orchestrator.state(), LifecycleState::Opened);
    assert_eq!(rig.bench.journal.count("scheduler.open"), 1);
}

#[test]
fn reenter_after_recovery_lands_in_opened() {
    let rig = Rig::new();
    let mut orchestrator = rig.enabled();
    rig.global.set_driver_state(DriverState::RECOVERING);

    orchestrator.reenter_after_recovery().unwrap();
    assert_eq!(orchestrator.state(), LifecycleState::Opened);
    assert!(!rig.bench.journal.contains("radio.suspend_target"));
    assert_eq!(rig.bench.journal.count("scheduler.open"), 2);
    assert!(rig.global.ini_config().is_some());

    orchestrator.finish_recovery();
    assert!(!rig.global.driver_state().is_recovering());
    orchestrator.pre_enable().unwrap();
    orchestrator.enable().unwrap();
}

#[test]
fn flush_logs_records_the_report() {
    let rig = Rig::new();
    let mut orchestrator = rig.orchestrator();
    orchestrator.open().unwrap();
    let request = LogCompletion {
        is_fatal: true,
        indicator: LogIndicator::Framework,
        reason_code: 7,
        recovery_needed: false,
    };

    assert!(matches!(
        orchestrator.flush_logs(request),
        Err(CdsError::NotReady(_))
    ));

    rig.global.knobs().set_fatal_event(true);
    orchestrator.flush_logs(request).unwrap();
    assert!(rig.bench.journal.contains("sme.flush_logs"));
    assert!(rig.global.log_completion().is_in_progress());
    assert!(matches!(
        orchestrator.flush_logs(request),
        Err(CdsError::AlreadyInProgress(_))
    ));
    assert_eq!(rig.global.log_completion().get_and_reset(), request);

    orchestrator
        .flush_logs(LogCompletion {
            indicator: LogIndicator::HostOnly,
            ..request
        })
        .unwrap();
    assert!(rig.bench.journal.contains("platform.flush_host_logs"));
    rig.global.log_completion().get_and_reset();

    rig.bench.journal.fail("sme.flush_logs");
    assert!(orchestrator.flush_logs(request).is_err());
    assert!(!rig.global.log_completion().is_in_progress());

    rig.global.set_driver_state(DriverState::LOADING);
    assert!(matches!(
        orchestrator.flush_logs(request),
        Err(CdsError::NotReady(_))
    ));
}

#[test]
fn rollback_is_counted_in_metrics() {
    let rig = Rig::new();
    let registry = cds_metrics::new_registry();
    let metrics = LifecycleMetrics::new(registry.clone()).unwrap();
    rig.bench.journal.fail("sme.open");
    let mut orchestrator = rig.orchestrator().with_metrics(metrics);
    assert!(orchestrator.open().is_err());

    let families = registry.gather();
    let rollback = families
        .iter()
        .find(|family| family.get_name() == "cds_lifecycle_rollback_steps_total")
        .unwrap();
    assert!(rollback.get_metric()[0].get_counter().get_value() > 0.0);
    let transitions = families
        .iter()
        .find(|family| family.get_name() == "cds_lifecycle_transitions_total")
        .unwrap();
    assert_eq!(transitions.get_metric().len(), 1);
}
