//! ---
//! cds_section: "06-testing"
//! cds_subsection: "integration-tests"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "End-to-end driver load, recovery and unload against the simulator."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use cds_common::{DiagnosticsConfig, DriverConfig};
use cds_core::{
    CdsError, DriverServices, DriverState, LifecycleMetrics, LifecycleState, ModuleId,
    Orchestrator, RecoveryOutcome, RecoveryRequest, RecoveryTrigger, RingId, RingLogLevel,
};
use cds_sim::{fast_timeouts, SimBench};

#[test]
fn load_recover_unload_leaves_no_state_behind() {
    cds_logging::init();
    let services = DriverServices::new();
    let global = services.init().unwrap();
    global.apply_diagnostics(&DiagnosticsConfig {
        fatal_event_enabled: true,
        radio_index: 0,
        ..DiagnosticsConfig::default()
    });
    assert!(global.knobs().is_fatal_event_enabled());
    assert_eq!(global.knobs().radio_index(), 0);

    let bench = SimBench::new();
    bench
        .probe(
            &global,
            DriverConfig {
                self_recovery_enabled: true,
                ..DriverConfig::default()
            },
        )
        .unwrap();

    let registry = cds_metrics::new_registry();
    let lifecycle = LifecycleMetrics::new(registry.clone()).unwrap();
    let collaborators = bench.collaborators();
    let mut orchestrator = Orchestrator::new(global.clone(), collaborators.clone(), fast_timeouts())
        .with_metrics(lifecycle.clone());
    let recovery = RecoveryTrigger::new(
        global.clone(),
        &collaborators,
        fast_timeouts().crash_inject_ms,
    )
    .with_metrics(lifecycle);

    global.set_driver_state(DriverState::LOADING);
    orchestrator.open().unwrap();
    orchestrator.pre_enable().unwrap();
    orchestrator.enable().unwrap();
    global.clear_driver_state(DriverState::LOADING);
    global.set_driver_state(DriverState::LOADED);
    assert!(global.is_self_recovery_enabled());

    let outcome = recovery
        .trigger(RecoveryRequest {
            skip_crash_injection: false,
        })
        .unwrap();
    assert_eq!(outcome, RecoveryOutcome::Scheduled);
    assert!(global.driver_state().is_recovering());
    assert!(global.driver_state().is_loaded());

    orchestrator.reenter_after_recovery().unwrap();
    orchestrator.pre_enable().unwrap();
    orchestrator.enable().unwrap();
    orchestrator.finish_recovery();
    assert_eq!(orchestrator.state(), LifecycleState::Enabled);

    global.clear_driver_state(DriverState::LOADED);
    global.set_driver_state(DriverState::UNLOADING);
    assert!(orchestrator.disable().unwrap().is_clean());
    assert!(orchestrator.post_disable().unwrap().is_clean());
    assert!(orchestrator.close().unwrap().is_clean());
    bench.remove(&global).unwrap();
    global.clear_driver_state(DriverState::UNLOADING);

    assert!(global.occupied_modules().is_empty());
    assert!(
        bench.journal.outstanding().is_empty(),
        "leaked: {:?}",
        bench.journal.outstanding()
    );
    assert!(global.driver_state().is_uninitialized());

    let families = registry.gather();
    assert!(families
        .iter()
        .any(|family| family.get_name() == "cds_recovery_requests_total"));

    services.deinit();
    assert!(matches!(
        global.get_context(ModuleId::Mac),
        Err(CdsError::NotInitialized)
    ));
}

#[test]
fn ring_verbosity_controls_packet_stat_forwarding() {
    let services = DriverServices::new();
    let global = services.init().unwrap();
    let knobs = global.knobs();
    assert!(!knobs.should_forward_packet_stats());
    assert_eq!(
        knobs.set_ring_log_level(RingId::PerPacketStats, 3),
        RingLogLevel::Active
    );
    assert!(knobs.should_forward_packet_stats());
    knobs.set_ring_log_level(RingId::PerPacketStats, 0);
    assert_eq!(knobs.ring_log_level(RingId::PerPacketStats), RingLogLevel::Off);
    assert!(!knobs.should_forward_packet_stats());
}
