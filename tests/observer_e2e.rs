mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;

use vantage::{
    BeliefModel, CancelSignal, Descriptor, Fingerprint, GapKind, InMemoryTarget, MergeRule, ObserverConfig,
    Perspective, RealityObserver, StateProvider, StateReading, TargetError,
};

use common::{id, text};

/// Delegates to an in-memory target after a random per-read delay.
struct JitteryProvider {
    inner: InMemoryTarget,
    reads: AtomicUsize,
}

impl StateProvider for JitteryProvider {
    fn read_state(&self, perspective: Perspective) -> Result<StateReading, TargetError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = rand::thread_rng().gen_range(0..15);
        thread::sleep(Duration::from_millis(delay));
        self.inner.read_state(perspective)
    }
}

fn divergent_target() -> InMemoryTarget {
    let target = InMemoryTarget::with_state([
        (id("auth"), text("enforcing")),
        (id("cache"), Descriptor::Int(64)),
        (id("dns"), text("primary")),
    ]);
    target.override_for(Perspective::new(1), id("cache"), Descriptor::Int(32)).unwrap();
    target.override_for(Perspective::new(2), id("cache"), Descriptor::Int(32)).unwrap();
    target.override_for(Perspective::new(3), id("dns"), text("secondary")).unwrap();
    target.grant_capability("read:config").unwrap();
    target
}

#[test]
fn merge_is_independent_of_completion_order() {
    let provider = Arc::new(JitteryProvider {
        inner: divergent_target(),
        reads: AtomicUsize::new(0),
    });
    let observer = RealityObserver::new(provider.clone(), ObserverConfig::default()).unwrap();

    let baseline = serde_json::to_vec(&observer.map_reality().unwrap()).unwrap();
    for _ in 0..20 {
        let snapshot = observer.map_reality().unwrap();
        assert_eq!(serde_json::to_vec(&snapshot).unwrap(), baseline);
    }
    assert_eq!(provider.reads.load(Ordering::SeqCst), 21 * 4);

    let snapshot = observer.map_reality().unwrap();
    // cache ties 2-2 between 64 (p0, p3) and 32 (p1, p2); the tie goes to p0's value.
    assert_eq!(snapshot.get(&id("cache")), Some(&Descriptor::Int(64)));
    assert_eq!(snapshot.get(&id("dns")), Some(&text("primary")));
    assert!(snapshot.capabilities().contains("read:config"));
}

#[test]
fn lowest_perspective_rule_prefers_p0() {
    let target = InMemoryTarget::with_state([(id("x"), Descriptor::Int(1))]);
    for p in 1..4 {
        target.override_for(Perspective::new(p), id("x"), Descriptor::Int(2)).unwrap();
    }
    let consensus = RealityObserver::new(Arc::new(target), ObserverConfig::default()).unwrap();
    assert_eq!(consensus.map_reality().unwrap().get(&id("x")), Some(&Descriptor::Int(2)));

    let target = InMemoryTarget::with_state([(id("x"), Descriptor::Int(1))]);
    for p in 1..4 {
        target.override_for(Perspective::new(p), id("x"), Descriptor::Int(2)).unwrap();
    }
    let lowest = RealityObserver::new(
        Arc::new(target),
        ObserverConfig {
            merge_rule: MergeRule::LowestPerspective,
            ..ObserverConfig::default()
        },
    )
    .unwrap();
    assert_eq!(lowest.map_reality().unwrap().get(&id("x")), Some(&Descriptor::Int(1)));
}

#[test]
fn half_degraded_round_still_merges() {
    let target = InMemoryTarget::with_state([(id("x"), Descriptor::Int(1))]);
    target.set_unreachable(Perspective::new(1), true).unwrap();
    target.set_unreachable(Perspective::new(3), true).unwrap();
    let observer = RealityObserver::new(Arc::new(target), ObserverConfig::default()).unwrap();

    let snapshot = observer.map_reality().unwrap();
    assert_eq!(snapshot.perspectives(), &[Perspective::new(0), Perspective::new(2)]);
    assert_eq!(snapshot.degraded(), &[Perspective::new(1), Perspective::new(3)]);
    assert_eq!(snapshot.get(&id("x")), Some(&Descriptor::Int(1)));
}

#[test]
fn fully_degraded_round_is_unavailable() {
    let target = InMemoryTarget::new();
    for p in 0..4 {
        target.set_unreachable(Perspective::new(p), true).unwrap();
    }
    let observer = RealityObserver::new(Arc::new(target), ObserverConfig::default()).unwrap();
    let err = observer.map_reality().unwrap_err();
    assert_eq!(err.kind(), "observation_unavailable");
    assert!(err.is_retryable());
}

#[test]
fn perspective_override_controls_task_count() {
    let provider = Arc::new(JitteryProvider {
        inner: InMemoryTarget::new(),
        reads: AtomicUsize::new(0),
    });
    let observer = RealityObserver::new(provider.clone(), ObserverConfig::default()).unwrap();
    let snapshot = observer.map_reality_with(7, &CancelSignal::never()).unwrap();
    assert_eq!(snapshot.perspectives().len(), 7);
    assert_eq!(provider.reads.load(Ordering::SeqCst), 7);
}

#[test]
fn gaps_are_deterministic_and_ordered() {
    let observer = RealityObserver::new(Arc::new(divergent_target()), ObserverConfig::default()).unwrap();
    let beliefs = BeliefModel::from_entries([
        (id("auth"), text("enforced")),
        (id("cache"), Descriptor::Int(60)),
        (id("queue"), text("up")),
    ]);

    let snapshot = observer.map_reality().unwrap();
    let first = observer.find_gaps(&snapshot, &beliefs);
    for _ in 0..5 {
        assert_eq!(observer.find_gaps(&observer.map_reality().unwrap(), &beliefs), first);
    }

    let kinds: Vec<(&str, GapKind)> = first.iter().map(|g| (g.subsystem.as_str(), g.kind)).collect();
    // Presence changes score 1.0 and tie-break by id; shared text prefixes and
    // small numeric drifts score lower.
    assert_eq!(
        kinds,
        vec![
            ("dns", GapKind::Unexpected),
            ("queue", GapKind::Missing),
            ("auth", GapKind::Drift),
            ("cache", GapKind::Drift),
        ]
    );
    assert!(first.windows(2).all(|w| w[0].severity >= w[1].severity));
}

#[test]
fn fingerprints_render_as_lowercase_hex() {
    let observer = RealityObserver::new(Arc::new(divergent_target()), ObserverConfig::default()).unwrap();
    let fp = observer.map_reality().unwrap().fingerprint();

    let rendered = fp.to_string();
    assert_eq!(rendered.len(), 64);
    assert_eq!(rendered, hex::encode(fp.as_bytes()));

    let bytes: [u8; 32] = hex::decode(&rendered).unwrap().try_into().unwrap();
    assert_eq!(Fingerprint::from_bytes(bytes), fp);

    let absent = Fingerprint::of_subsystem(&id("x"), None);
    let null = Fingerprint::of_subsystem(&id("x"), Some(&Descriptor::Null));
    assert_ne!(hex::encode(absent.as_bytes()), hex::encode(null.as_bytes()));
}
