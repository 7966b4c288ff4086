#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use vantage::{
    BeliefLedger, BeliefModel, ControllerConfig, Descriptor, Event, Fabricator, FabricatorConfig,
    InMemoryBeliefStore, InMemoryTarget, ObserverConfig, OperationController, Primitive, PrimitiveExecutor,
    PrimitiveOutcome, RealityObserver, StateProvider, Strategy, SubsystemId, TargetError,
};

pub fn id(s: &str) -> SubsystemId {
    SubsystemId::new(s).unwrap()
}

pub fn text(s: &str) -> Descriptor {
    Descriptor::from(s)
}

/// Wraps a target executor: tracks concurrency, records call order and can
/// slow down chosen subsystems.
pub struct InstrumentedExecutor {
    inner: Arc<InMemoryTarget>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay_all: Duration,
    slow: BTreeMap<SubsystemId, Duration>,
    calls: Mutex<Vec<SubsystemId>>,
}

impl InstrumentedExecutor {
    pub fn new(inner: Arc<InMemoryTarget>) -> Self {
        Self {
            inner,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay_all: Duration::ZERO,
            slow: BTreeMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_all = delay;
        self
    }

    pub fn slow_on(mut self, subsystem: &str, delay: Duration) -> Self {
        self.slow.insert(id(subsystem), delay);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|s| s.to_string()).collect()
    }
}

impl PrimitiveExecutor for InstrumentedExecutor {
    fn execute(&self, primitive: &Primitive) -> Result<PrimitiveOutcome, TargetError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(primitive.subsystem.clone());

        let delay = self.slow.get(&primitive.subsystem).copied().unwrap_or(self.delay_all);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let result = self.inner.execute(primitive);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub struct Harness {
    pub target: Arc<InMemoryTarget>,
    pub store: Arc<InMemoryBeliefStore>,
    pub controller: OperationController,
}

impl Harness {
    pub fn new(
        target: Arc<InMemoryTarget>,
        beliefs: BeliefModel,
        executor: Arc<dyn PrimitiveExecutor>,
        fabricator: FabricatorConfig,
    ) -> Self {
        let provider: Arc<dyn StateProvider> = target.clone();
        Self::build(target, provider, beliefs, executor, fabricator, ControllerConfig::default())
    }

    /// Full control: observation goes through `provider`, which may wrap `target`.
    pub fn build(
        target: Arc<InMemoryTarget>,
        provider: Arc<dyn StateProvider>,
        beliefs: BeliefModel,
        executor: Arc<dyn PrimitiveExecutor>,
        fabricator: FabricatorConfig,
        controller: ControllerConfig,
    ) -> Self {
        let store = Arc::new(InMemoryBeliefStore::with_model(beliefs));
        let observer = RealityObserver::new(provider, ObserverConfig::default()).unwrap();
        let controller = OperationController::new(
            Arc::new(observer),
            Arc::new(Fabricator::new(&fabricator).unwrap()),
            executor,
            Arc::new(BeliefLedger::new(store.clone())),
            controller,
        );
        Self { target, store, controller }
    }

    /// Target executes its own primitives with the given default strategy.
    pub fn simple(target: InMemoryTarget, beliefs: BeliefModel, strategy: Strategy) -> Self {
        let target = Arc::new(target);
        let config = FabricatorConfig {
            default_strategy: strategy,
            ..FabricatorConfig::default()
        };
        Self::new(target.clone(), beliefs, target, config)
    }

    pub fn beliefs(&self) -> BeliefModel {
        self.controller.ledger().snapshot().unwrap()
    }
}

pub fn types(events: &[Event]) -> Vec<vantage::EventType> {
    events.iter().map(|e| e.event_type).collect()
}
