mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use vantage::{
    BeliefModel, CapabilityChange, ControllerConfig, Descriptor, DescriptorDistance, EventPayload, EventType,
    ExecutionMode, FabricatorConfig, InMemoryTarget, OperationRequest, OperationStatus, Perspective, Phase,
    PrimitiveOutcome, Severity, StateProvider, StateReading, Strategy, StructuralDistance, TargetError,
};

use common::{id, text, types, Harness, InstrumentedExecutor};

#[test]
fn end_to_end_drift_is_confirmed_and_adopted() {
    let target = InMemoryTarget::with_state([(id("X"), text("B"))]);
    let beliefs = BeliefModel::from_entries([(id("X"), text("A"))]);
    let harness = Harness::simple(target, beliefs, Strategy::ConfirmOnly);

    let (handle, stream) = harness
        .controller
        .submit(OperationRequest::new(ExecutionMode::Silent).with_perspectives(4))
        .unwrap();
    let events: Vec<_> = stream.collect();

    assert_eq!(types(&events), vec![EventType::RealityAnomaly, EventType::OperationCompleted]);
    let evidence = events[0].evidence.unwrap();
    assert!(!evidence.gap_detected());
    assert_eq!(
        evidence.severity(),
        Severity::new(StructuralDistance.distance(Some(&text("A")), Some(&text("B"))))
    );

    let Some(EventPayload::OperationCompleted(summary)) = &events[1].payload else {
        panic!("expected completion summary");
    };
    assert_eq!(summary.gaps, 1);
    assert_eq!(summary.primitives, 1);
    assert_eq!(summary.confirmed, 1);
    assert_eq!(summary.beliefs_changed, 1);

    assert_eq!(handle.status(), OperationStatus::Completed);
    assert_eq!(handle.phase(), Phase::Reconciliation);

    let after = harness.beliefs();
    assert_eq!(after.get(&id("X")), Some(&text("B")));
    assert_eq!(after.version(), 1);
    assert_eq!(harness.store.save_count(), 1);
}

#[test]
fn classical_mode_reports_started_and_completed() {
    let target = InMemoryTarget::with_state([(id("X"), text("B"))]);
    let beliefs = BeliefModel::from_entries([(id("X"), text("A"))]);
    let harness = Harness::simple(target, beliefs, Strategy::ConfirmOnly);

    let (handle, stream) = harness.controller.submit(OperationRequest::new(ExecutionMode::Classical)).unwrap();
    let events: Vec<_> = stream.collect();

    assert_eq!(
        types(&events),
        vec![EventType::PrimitiveStarted, EventType::PrimitiveCompleted, EventType::OperationCompleted]
    );
    let Some(EventPayload::PrimitiveStarted { primitive }) = &events[0].payload else {
        panic!("expected primitive payload");
    };
    assert_eq!(primitive.subsystem, id("X"));
    assert_eq!(events[1].primitive_id(), Some(primitive.id));
    let Some(EventPayload::PrimitiveCompleted { outcome, .. }) = &events[1].payload else {
        panic!("expected outcome payload");
    };
    assert_eq!(*outcome, PrimitiveOutcome::Confirmed);
    assert!(events.iter().all(|e| e.evidence.is_none()));

    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence, i as u64);
        assert_eq!(event.operation_id, handle.id());
    }
}

#[test]
fn silent_evidence_matches_fingerprint_change() {
    // Read-only probe: nothing changes.
    let probe = Harness::simple(
        InMemoryTarget::with_state([(id("X"), text("B"))]),
        BeliefModel::from_entries([(id("X"), text("A"))]),
        Strategy::ConfirmOnly,
    );
    let (_, stream) = probe.controller.submit(OperationRequest::new(ExecutionMode::Silent)).unwrap();
    let anomalies: Vec<_> = stream.filter(|e| e.event_type == EventType::RealityAnomaly).collect();
    assert_eq!(anomalies.len(), 1);
    let evidence = anomalies[0].evidence.unwrap();
    assert!(!evidence.gap_detected());
    assert_eq!(evidence.before(), evidence.after());
    assert!(anomalies[0].payload.is_none());

    // Corrective apply: the subsystem moves from B to A.
    let apply = Harness::simple(
        InMemoryTarget::with_state([(id("X"), text("B"))]),
        BeliefModel::from_entries([(id("X"), text("A"))]),
        Strategy::Remediate,
    );
    let (handle, stream) = apply.controller.submit(OperationRequest::new(ExecutionMode::Silent)).unwrap();
    let anomalies: Vec<_> = stream.filter(|e| e.event_type == EventType::RealityAnomaly).collect();
    assert_eq!(anomalies.len(), 1);
    let evidence = anomalies[0].evidence.unwrap();
    assert!(evidence.gap_detected());
    assert_ne!(evidence.before(), evidence.after());

    assert_eq!(handle.status(), OperationStatus::Completed);
    assert_eq!(apply.target.get(&id("X")).unwrap(), Some(text("A")));
    // Corrected: reality moved to the belief, which stays as it was.
    assert_eq!(apply.beliefs().get(&id("X")), Some(&text("A")));
    assert_eq!(apply.beliefs().version(), 0);
}

#[test]
fn primitives_run_strictly_one_at_a_time() {
    let names = ["a", "b", "c", "d", "e", "f"];
    let target = Arc::new(InMemoryTarget::with_state(names.iter().map(|n| (id(n), text("new")))));
    let beliefs = BeliefModel::from_entries(names.iter().map(|n| (id(n), text("old"))));
    let executor = Arc::new(InstrumentedExecutor::new(target.clone()).with_delay(Duration::from_millis(5)));
    let harness = Harness::new(
        target,
        beliefs,
        executor.clone(),
        FabricatorConfig {
            default_strategy: Strategy::ConfirmAndRemediate,
            ..FabricatorConfig::default()
        },
    );

    for mode in [ExecutionMode::Classical, ExecutionMode::Silent] {
        let (handle, stream) = harness.controller.submit(OperationRequest::new(mode)).unwrap();
        let _events: Vec<_> = stream.collect();
        assert_eq!(handle.status(), OperationStatus::Completed);
    }

    assert_eq!(executor.max_in_flight(), 1);
    // Source-gap order: every subsystem is probed before it is corrected.
    let calls = executor.calls();
    assert_eq!(&calls[..4], &["a", "a", "b", "b"]);
}

#[test]
fn non_critical_failure_continues() {
    let target = InMemoryTarget::with_state([(id("a"), text("B")), (id("b"), text("B"))]);
    target.reject_primitives_on(id("a")).unwrap();
    let beliefs = BeliefModel::from_entries([(id("a"), text("A")), (id("b"), text("A"))]);
    let harness = Harness::simple(target, beliefs, Strategy::ConfirmOnly);

    let (handle, stream) = harness.controller.submit(OperationRequest::new(ExecutionMode::Classical)).unwrap();
    let events: Vec<_> = stream.collect();

    assert_eq!(
        types(&events),
        vec![
            EventType::PrimitiveStarted,
            EventType::PrimitiveFailed,
            EventType::PrimitiveStarted,
            EventType::PrimitiveCompleted,
            EventType::OperationCompleted,
        ]
    );
    let Some(EventPayload::PrimitiveFailed { critical, reason, .. }) = &events[1].payload else {
        panic!("expected failure payload");
    };
    assert!(!critical);
    assert!(reason.contains("rejected"));

    assert_eq!(handle.status(), OperationStatus::Completed);
    let beliefs = harness.beliefs();
    assert_eq!(beliefs.get(&id("a")), Some(&text("A")));
    assert_eq!(beliefs.get(&id("b")), Some(&text("B")));
}

#[test]
fn silent_failure_reports_evidence_and_failure() {
    let target = InMemoryTarget::with_state([(id("a"), text("B"))]);
    target.reject_primitives_on(id("a")).unwrap();
    let beliefs = BeliefModel::from_entries([(id("a"), text("A"))]);
    let harness = Harness::simple(target, beliefs, Strategy::Remediate);

    let (_, stream) = harness.controller.submit(OperationRequest::new(ExecutionMode::Silent)).unwrap();
    let events: Vec<_> = stream.collect();
    assert_eq!(
        types(&events),
        vec![EventType::RealityAnomaly, EventType::PrimitiveFailed, EventType::OperationCompleted]
    );
    assert!(!events[0].evidence.unwrap().gap_detected());
}

#[test]
fn critical_failure_fails_the_operation() {
    let target = InMemoryTarget::with_state([(id("a"), text("B")), (id("b"), text("B"))]);
    target.reject_primitives_on(id("a")).unwrap();
    let beliefs = BeliefModel::from_entries([(id("a"), text("A")), (id("b"), text("A"))]);
    let target = Arc::new(target);
    let harness = Harness::new(
        target.clone(),
        beliefs.clone(),
        target.clone(),
        FabricatorConfig {
            critical_severity: Some(0.1),
            ..FabricatorConfig::default()
        },
    );

    let (handle, stream) = harness.controller.submit(OperationRequest::new(ExecutionMode::Classical)).unwrap();
    let events: Vec<_> = stream.collect();

    assert_eq!(
        types(&events),
        vec![EventType::PrimitiveStarted, EventType::PrimitiveFailed, EventType::OperationFailed]
    );
    let Some(EventPayload::OperationFailed { phase, error_kind, .. }) = &events[2].payload else {
        panic!("expected failure payload");
    };
    assert_eq!(*phase, Phase::Execution);
    assert_eq!(error_kind, "primitive_critical_failure");
    assert_eq!(handle.status(), OperationStatus::Failed);
    assert_eq!(target.executed_count(), 1);
    assert_eq!(harness.beliefs(), beliefs);
}

#[test]
fn belief_store_failure_fails_at_reconciliation() {
    let harness = Harness::simple(
        InMemoryTarget::with_state([(id("X"), text("B"))]),
        BeliefModel::from_entries([(id("X"), text("A"))]),
        Strategy::ConfirmOnly,
    );
    harness.store.set_fail_saves(true);

    let (handle, stream) = harness.controller.submit(OperationRequest::new(ExecutionMode::Silent)).unwrap();
    let events: Vec<_> = stream.collect();

    // Execution events already emitted stay reported.
    assert_eq!(types(&events), vec![EventType::RealityAnomaly, EventType::OperationFailed]);
    let Some(EventPayload::OperationFailed { phase, error_kind, .. }) = &events[1].payload else {
        panic!("expected failure payload");
    };
    assert_eq!(*phase, Phase::Reconciliation);
    assert_eq!(error_kind, "belief_store_error");
    assert_eq!(handle.status(), OperationStatus::Failed);
    assert_eq!(harness.beliefs().get(&id("X")), Some(&text("A")));
}

#[test]
fn unreachable_target_fails_gap_discovery() {
    let target = InMemoryTarget::with_state([(id("X"), text("B"))]);
    for p in 0..4 {
        target.set_unreachable(Perspective::new(p), true).unwrap();
    }
    let harness = Harness::simple(target, BeliefModel::new(), Strategy::ConfirmOnly);

    let (handle, stream) = harness.controller.submit(OperationRequest::default()).unwrap();
    let events: Vec<_> = stream.collect();
    assert_eq!(types(&events), vec![EventType::OperationFailed]);
    let Some(EventPayload::OperationFailed { phase, error_kind, .. }) = &events[0].payload else {
        panic!("expected failure payload");
    };
    assert_eq!(*phase, Phase::GapDiscovery);
    assert_eq!(error_kind, "observation_unavailable");
    assert_eq!(handle.status(), OperationStatus::Failed);
}

#[test]
fn unsupported_gap_kind_is_reported_and_skipped() {
    let target = InMemoryTarget::with_state([(id("drift"), text("B")), (id("stray"), Descriptor::Int(1))]);
    let beliefs = BeliefModel::from_entries([(id("drift"), text("A"))]);
    let harness = Harness::simple(target, beliefs, Strategy::Remediate);

    let (handle, stream) = harness.controller.submit(OperationRequest::new(ExecutionMode::Classical)).unwrap();
    let events: Vec<_> = stream.collect();

    assert_eq!(events[0].event_type, EventType::UnsupportedGapKind);
    let Some(EventPayload::UnsupportedGapKind { subsystem, .. }) = &events[0].payload else {
        panic!("expected unsupported payload");
    };
    assert_eq!(*subsystem, id("stray"));
    assert_eq!(events.last().unwrap().event_type, EventType::OperationCompleted);
    assert_eq!(handle.status(), OperationStatus::Completed);
    assert_eq!(harness.target.get(&id("drift")).unwrap(), Some(text("A")));
    assert_eq!(harness.beliefs().get(&id("stray")), None);
}

#[test]
fn no_gaps_completes_without_touching_beliefs() {
    let harness = Harness::simple(
        InMemoryTarget::with_state([(id("X"), text("A"))]),
        BeliefModel::from_entries([(id("X"), text("A"))]),
        Strategy::ConfirmOnly,
    );
    let (_, stream) = harness.controller.submit(OperationRequest::default()).unwrap();
    let events: Vec<_> = stream.collect();
    assert_eq!(types(&events), vec![EventType::OperationCompleted]);
    assert_eq!(harness.store.save_count(), 0);
    assert_eq!(harness.beliefs().version(), 0);
}

#[test]
fn operation_can_only_be_executed_once() {
    let harness = Harness::simple(InMemoryTarget::new(), BeliefModel::new(), Strategy::ConfirmOnly);
    let handle = harness.controller.create(OperationRequest::default()).unwrap();
    assert_eq!(handle.status(), OperationStatus::Pending);

    let stream = harness.controller.execute(&handle).unwrap();
    let err = harness.controller.execute(&handle).unwrap_err();
    assert!(err.is_validation());
    let _events: Vec<_> = stream.collect();

    let err = harness
        .controller
        .create(OperationRequest::default().with_perspectives(0))
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn dropped_stream_does_not_stop_the_pipeline() {
    let harness = Harness::simple(
        InMemoryTarget::with_state([(id("X"), text("B"))]),
        BeliefModel::from_entries([(id("X"), text("A"))]),
        Strategy::ConfirmOnly,
    );
    let (handle, stream) = harness.controller.submit(OperationRequest::new(ExecutionMode::Classical)).unwrap();
    drop(stream);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !handle.status().is_terminal() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(handle.status(), OperationStatus::Completed);
    assert_eq!(harness.beliefs().get(&id("X")), Some(&text("B")));
}

/// Delegates to an in-memory target but cannot reach it from perspective 0.
/// Single-subsystem reads use the trait's default path.
struct FirstPerspectiveDown(Arc<InMemoryTarget>);

impl StateProvider for FirstPerspectiveDown {
    fn read_state(&self, perspective: Perspective) -> Result<StateReading, TargetError> {
        if perspective == Perspective::PRIMARY {
            return Err(TargetError::Unreachable {
                perspective,
                reason: "link down".to_string(),
            });
        }
        self.0.read_state(perspective)
    }
}

#[test]
fn silent_and_classical_agree_when_first_perspective_is_down() {
    let run = |mode: ExecutionMode| {
        let target = Arc::new(InMemoryTarget::with_state([(id("X"), text("B"))]));
        let harness = Harness::build(
            target.clone(),
            Arc::new(FirstPerspectiveDown(target.clone())),
            BeliefModel::from_entries([(id("X"), text("A"))]),
            target,
            FabricatorConfig::default(),
            ControllerConfig::default(),
        );
        let (handle, stream) = harness.controller.submit(OperationRequest::new(mode)).unwrap();
        let events: Vec<_> = stream.collect();
        assert_eq!(handle.status(), OperationStatus::Completed);
        (types(&events), harness.beliefs().get(&id("X")).cloned())
    };

    let (classical, classical_belief) = run(ExecutionMode::Classical);
    let (silent, silent_belief) = run(ExecutionMode::Silent);

    assert_eq!(
        classical,
        vec![EventType::PrimitiveStarted, EventType::PrimitiveCompleted, EventType::OperationCompleted]
    );
    assert_eq!(silent, vec![EventType::RealityAnomaly, EventType::OperationCompleted]);
    assert_eq!(classical_belief, Some(text("B")));
    assert_eq!(silent_belief, classical_belief);
}

#[test]
fn silent_fingerprints_skip_an_unreachable_first_perspective() {
    let target = InMemoryTarget::with_state([(id("X"), text("B"))]);
    target.set_unreachable(Perspective::PRIMARY, true).unwrap();
    let harness = Harness::simple(
        target,
        BeliefModel::from_entries([(id("X"), text("A"))]),
        Strategy::Remediate,
    );

    let (handle, stream) = harness.controller.submit(OperationRequest::new(ExecutionMode::Silent)).unwrap();
    let events: Vec<_> = stream.collect();

    assert_eq!(types(&events), vec![EventType::RealityAnomaly, EventType::OperationCompleted]);
    assert!(events[0].evidence.unwrap().gap_detected());
    assert_eq!(handle.status(), OperationStatus::Completed);
    assert_eq!(harness.target.get(&id("X")).unwrap(), Some(text("A")));
}

#[test]
fn capability_drift_is_reported_but_never_adopted() {
    let target = InMemoryTarget::with_state([(id("X"), text("A"))]);
    target.grant_capability("read").unwrap();
    target.grant_capability("admin").unwrap();
    let beliefs = BeliefModel::from_entries([(id("X"), text("A"))]).with_capabilities(["read", "audit"]);
    let harness = Harness::simple(target, beliefs.clone(), Strategy::ConfirmOnly);

    let (handle, stream) = harness.controller.submit(OperationRequest::new(ExecutionMode::Classical)).unwrap();
    let events: Vec<_> = stream.collect();

    assert_eq!(
        types(&events),
        vec![EventType::CapabilityDrift, EventType::CapabilityDrift, EventType::OperationCompleted]
    );
    let drift: Vec<(String, CapabilityChange)> = events
        .iter()
        .filter_map(|e| match &e.payload {
            Some(EventPayload::CapabilityDrift { capability, change }) => Some((capability.clone(), *change)),
            _ => None,
        })
        .collect();
    assert_eq!(
        drift,
        vec![
            ("admin".to_string(), CapabilityChange::Gained),
            ("audit".to_string(), CapabilityChange::Lost),
        ]
    );

    let Some(EventPayload::OperationCompleted(summary)) = &events[2].payload else {
        panic!("expected completion summary");
    };
    assert_eq!(summary.capability_gaps, 2);
    assert_eq!(summary.gaps, 0);
    assert_eq!(handle.status(), OperationStatus::Completed);
    assert_eq!(harness.beliefs(), beliefs);
}

#[test]
fn unread_terminal_event_does_not_pin_the_driver() {
    let target = Arc::new(InMemoryTarget::with_state([(id("X"), text("A"))]));
    let harness = Harness::build(
        target.clone(),
        target.clone(),
        BeliefModel::from_entries([(id("X"), text("A"))]),
        target,
        FabricatorConfig::default(),
        ControllerConfig {
            terminal_handoff_ms: 50,
            ..ControllerConfig::default()
        },
    );
    let (handle, stream) = harness.controller.submit(OperationRequest::default()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !handle.status().is_terminal() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(handle.status(), OperationStatus::Completed);

    // The driver gives up on the handoff and closes the stream.
    thread::sleep(Duration::from_millis(300));
    let err = stream.recv_timeout(Duration::from_secs(2)).unwrap_err();
    assert_eq!(err.kind(), "disconnected");
}
