//! Operation controller and the per-operation pipeline driver.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn};

use crate::belief::BeliefLedger;
use crate::cancel::CancelSignal;
use crate::config::VantageConfig;
use crate::error::{ExecutionError, ValidationError, VantageError, VantageResult};
use crate::fabricator::{FabricationWarning, Fabricator, Primitive};
use crate::fingerprint::Fingerprint;
use crate::reality::RealityObserver;
use crate::storage::{BeliefStore, StorageError};
use crate::target::{Perspective, PrimitiveExecutor, PrimitiveOutcome, StateProvider, TargetError};

use super::events::{Event, EventPayload, EventType, Evidence, OperationId, OperationSummary};
use super::reconcile::{self, GapResolution, PrimitiveReport};
use super::status::{OperationStatus, Phase};
use super::stream::OperationStream;
use super::{ExecutionMode, Operation, OperationHandle, OperationRequest};

/// Controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Event channel capacity. `0` is an unbuffered rendezvous handoff.
    pub event_buffer: usize,
    /// How long the terminal event waits for a consumer before the stream is
    /// closed without it.
    pub terminal_handoff_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            event_buffer: 0,
            terminal_handoff_ms: 5_000,
        }
    }
}

impl ControllerConfig {
    /// Checks that the terminal handoff can wait at all.
    ///
    /// # Errors
    /// `InvalidConfig` if `terminal_handoff_ms` is zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.terminal_handoff_ms == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "terminal_handoff_ms must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Terminal handoff wait as a `Duration`.
    #[must_use]
    pub const fn terminal_handoff(&self) -> Duration {
        Duration::from_millis(self.terminal_handoff_ms)
    }
}

/// Creates operations and drives each on its own thread.
pub struct OperationController {
    observer: Arc<RealityObserver>,
    fabricator: Arc<Fabricator>,
    executor: Arc<dyn PrimitiveExecutor>,
    ledger: Arc<BeliefLedger>,
    config: ControllerConfig,
}

impl std::fmt::Debug for OperationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationController")
            .field("observer", &self.observer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OperationController {
    /// Wires a controller from prebuilt components.
    pub fn new(
        observer: Arc<RealityObserver>,
        fabricator: Arc<Fabricator>,
        executor: Arc<dyn PrimitiveExecutor>,
        ledger: Arc<BeliefLedger>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            observer,
            fabricator,
            executor,
            ledger,
            config,
        }
    }

    /// Builds every component from one configuration.
    ///
    /// # Errors
    /// Returns a validation error if `config` is invalid.
    pub fn from_config(
        provider: Arc<dyn StateProvider>,
        executor: Arc<dyn PrimitiveExecutor>,
        store: Arc<dyn BeliefStore>,
        config: &VantageConfig,
    ) -> VantageResult<Self> {
        config.validate()?;
        let observer = RealityObserver::new(provider, config.observer.clone())?;
        let fabricator = Fabricator::new(&config.fabricator)?;
        Ok(Self::new(
            Arc::new(observer),
            Arc::new(fabricator),
            executor,
            Arc::new(BeliefLedger::new(store)),
            config.controller,
        ))
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn observer(&self) -> &Arc<RealityObserver> {
        &self.observer
    }

    /// The shared belief ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<BeliefLedger> {
        &self.ledger
    }

    /// Creates a `Pending` operation without starting it.
    ///
    /// # Errors
    /// `ZeroPerspectives` if the request overrides the count with `0`.
    pub fn create(&self, request: OperationRequest) -> VantageResult<OperationHandle> {
        let perspectives = request.perspectives.unwrap_or(self.observer.config().perspectives);
        if perspectives == 0 {
            return Err(ValidationError::ZeroPerspectives.into());
        }
        let op = Operation::new(request.mode, perspectives, Arc::clone(&self.observer));
        debug!(operation_id = %op.id(), mode = %op.mode(), perspectives, "operation created");
        Ok(OperationHandle::new(Arc::new(op)))
    }

    /// Starts the operation's pipeline and returns its event stream.
    ///
    /// An operation cancelled before it starts yields an already-closed stream.
    ///
    /// # Errors
    /// - `OperationAlreadyStarted` on a second call for the same operation
    /// - `Spawn` if the driver thread could not be started
    pub fn execute(&self, handle: &OperationHandle) -> VantageResult<OperationStream> {
        let op = handle.shared();
        if !op.claim() {
            return Err(ValidationError::OperationAlreadyStarted { id: op.id().to_string() }.into());
        }

        let (tx, rx) = bounded::<Event>(self.config.event_buffer);
        let stream = OperationStream::new(op.id(), rx);
        if op.status().is_terminal() {
            return Ok(stream);
        }

        let driver = Driver {
            op: Arc::clone(&op),
            fabricator: Arc::clone(&self.fabricator),
            executor: Arc::clone(&self.executor),
            ledger: Arc::clone(&self.ledger),
            sink: EventSink::new(op.id(), tx, op.cancel_signal(), self.config.terminal_handoff()),
            read_from: Vec::new(),
        };

        let name = format!("vantage-op-{}", op.id());
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || driver.run())
            .map_err(|e| {
                op.transition(OperationStatus::Pending, OperationStatus::Failed);
                error!(operation_id = %op.id(), error = %e, "failed to spawn operation driver");
                ExecutionError::Spawn {
                    name,
                    reason: e.to_string(),
                }
            })?;

        Ok(stream)
    }

    /// Creates and starts an operation in one step.
    ///
    /// # Errors
    /// See [`create`](Self::create) and [`execute`](Self::execute).
    pub fn submit(&self, request: OperationRequest) -> VantageResult<(OperationHandle, OperationStream)> {
        let handle = self.create(request)?;
        let stream = self.execute(&handle)?;
        Ok((handle, stream))
    }
}

/// Why a pipeline stopped early.
enum Halt {
    Cancelled,
    Failed(VantageError),
}

impl From<VantageError> for Halt {
    fn from(err: VantageError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Failed(err)
        }
    }
}

impl From<ExecutionError> for Halt {
    fn from(err: ExecutionError) -> Self {
        VantageError::from(err).into()
    }
}

impl From<StorageError> for Halt {
    fn from(err: StorageError) -> Self {
        VantageError::from(err).into()
    }
}

/// Sequenced, cancellation-aware event producer.
struct EventSink {
    operation_id: OperationId,
    tx: Sender<Event>,
    cancel: CancelSignal,
    terminal_handoff: Duration,
    sequence: u64,
    detached: bool,
}

impl EventSink {
    const fn new(
        operation_id: OperationId,
        tx: Sender<Event>,
        cancel: CancelSignal,
        terminal_handoff: Duration,
    ) -> Self {
        Self {
            operation_id,
            tx,
            cancel,
            terminal_handoff,
            sequence: 0,
            detached: false,
        }
    }

    fn next(&mut self, event_type: EventType, payload: Option<EventPayload>, evidence: Option<Evidence>) -> Event {
        let event = Event::new(self.sequence, self.operation_id, event_type, payload, evidence);
        self.sequence += 1;
        event
    }

    /// Hands off one event, blocking until the consumer takes it.
    ///
    /// Fails with `Halt::Cancelled` if cancellation is requested before or
    /// while waiting; the event is then never delivered.
    fn emit(
        &mut self,
        event_type: EventType,
        payload: Option<EventPayload>,
        evidence: Option<Evidence>,
    ) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        let event = self.next(event_type, payload, evidence);
        if self.detached {
            return Ok(());
        }

        let delivered = select! {
            send(self.tx, event) -> sent => sent.is_ok(),
            recv(self.cancel.receiver()) -> _ => return Err(Halt::Cancelled),
        };
        if !delivered {
            self.detach();
        }
        Ok(())
    }

    /// Sends the terminal event. Runs after the status is already terminal.
    ///
    /// Gives up after `terminal_handoff` or on cancellation, so a consumer that
    /// holds the stream without reading never pins the driver thread.
    fn finish(&mut self, event_type: EventType, payload: EventPayload) {
        let event = self.next(event_type, Some(payload), None);
        if self.detached {
            return;
        }
        let consumer_gone = select! {
            send(self.tx, event) -> sent => sent.is_err(),
            recv(self.cancel.receiver()) -> _ => {
                debug!("terminal event withdrawn after cancellation");
                false
            },
            default(self.terminal_handoff) => {
                warn!(
                    timeout_ms = u64::try_from(self.terminal_handoff.as_millis()).unwrap_or(u64::MAX),
                    "terminal event not taken; closing stream"
                );
                false
            },
        };
        if consumer_gone {
            self.detach();
        }
    }

    fn detach(&mut self) {
        self.detached = true;
        info!("event stream dropped by consumer; continuing detached");
    }
}

/// Runs one operation's five phases on the operation thread.
struct Driver {
    op: Arc<Operation>,
    fabricator: Arc<Fabricator>,
    executor: Arc<dyn PrimitiveExecutor>,
    ledger: Arc<BeliefLedger>,
    sink: EventSink,
    /// Perspectives that contributed to this operation's snapshot.
    read_from: Vec<Perspective>,
}

impl Driver {
    fn run(mut self) {
        let span = info_span!("operation", operation_id = %self.op.id(), mode = %self.op.mode());
        let _guard = span.enter();

        if !self.op.transition(OperationStatus::Pending, OperationStatus::Running) {
            debug!(status = %self.op.status(), "operation not pending; driver exiting");
            return;
        }
        info!(perspectives = self.op.perspectives(), "operation started");

        match self.pipeline() {
            Ok(summary) => {
                if self.op.transition(OperationStatus::Running, OperationStatus::Completed) {
                    info!(
                        gaps = summary.gaps,
                        primitives = summary.primitives,
                        failed = summary.failed_primitives,
                        beliefs_changed = summary.beliefs_changed,
                        belief_version = summary.belief_version,
                        "operation completed"
                    );
                    self.sink.finish(EventType::OperationCompleted, EventPayload::OperationCompleted(summary));
                }
            }
            Err(Halt::Cancelled) => {
                self.op.transition(OperationStatus::Running, OperationStatus::Cancelled);
                info!(phase = %self.op.phase(), "operation cancelled");
            }
            Err(Halt::Failed(err)) => {
                let phase = self.op.phase();
                if self.op.transition(OperationStatus::Running, OperationStatus::Failed) {
                    error!(%phase, error_kind = err.kind(), error = %err, "operation failed");
                    self.sink.finish(
                        EventType::OperationFailed,
                        EventPayload::OperationFailed {
                            phase,
                            error_kind: err.kind().to_string(),
                            message: err.to_string(),
                        },
                    );
                }
            }
        }
    }

    fn pipeline(&mut self) -> Result<OperationSummary, Halt> {
        self.enter(Phase::BeliefExtraction)?;
        let beliefs = self.ledger.snapshot()?;
        debug!(version = beliefs.version(), entries = beliefs.len(), "beliefs extracted");

        self.enter(Phase::GapDiscovery)?;
        let observer = Arc::clone(self.op.observer());
        let snapshot = observer.map_reality_with(self.op.perspectives(), &self.sink.cancel)?;
        let gaps = observer.find_gaps(&snapshot, &beliefs);
        let capability_gaps = observer.find_capability_gaps(&snapshot, &beliefs);
        self.read_from = snapshot.perspectives().to_vec();
        debug!(gaps = gaps.len(), capability_gaps = capability_gaps.len(), "gaps discovered");
        for gap in &capability_gaps {
            info!(capability = %gap.capability, change = %gap.change, "capability drift");
            self.sink.emit(
                EventType::CapabilityDrift,
                Some(EventPayload::CapabilityDrift {
                    capability: gap.capability.clone(),
                    change: gap.change,
                }),
                None,
            )?;
        }

        self.enter(Phase::Fabrication)?;
        let fabrication = self.fabricator.fabricate(&gaps);
        for warning in &fabrication.warnings {
            let FabricationWarning::UnsupportedGapKind { subsystem, kind, strategy } = warning;
            self.sink.emit(
                EventType::UnsupportedGapKind,
                Some(EventPayload::UnsupportedGapKind {
                    subsystem: subsystem.clone(),
                    kind: *kind,
                    strategy: *strategy,
                }),
                None,
            )?;
        }

        self.enter(Phase::Execution)?;
        let reports = self.execute_all(&fabrication.primitives, observer.provider().as_ref())?;

        self.enter(Phase::Reconciliation)?;
        let resolved = reconcile::resolve(&gaps, &reports);
        let updates = reconcile::belief_updates(&resolved);
        let commit = self.ledger.reconcile(&updates)?;

        let count = |r: GapResolution| resolved.iter().filter(|(_, x)| *x == r).count();
        Ok(OperationSummary {
            gaps: gaps.len(),
            primitives: fabrication.primitives.len(),
            failed_primitives: reports.iter().filter(|r| r.outcome.is_err()).count(),
            unsupported: fabrication.warnings.len(),
            capability_gaps: capability_gaps.len(),
            confirmed: count(GapResolution::Confirmed),
            corrected: count(GapResolution::Corrected),
            unresolved: count(GapResolution::Unresolved),
            beliefs_changed: commit.changed,
            belief_version: commit.model.version(),
        })
    }

    fn check_cancel(&self) -> Result<(), Halt> {
        if self.sink.cancel.is_cancelled() {
            Err(Halt::Cancelled)
        } else {
            Ok(())
        }
    }

    fn enter(&self, phase: Phase) -> Result<(), Halt> {
        self.check_cancel()?;
        self.op.set_phase(phase);
        debug!(%phase, "phase entered");
        Ok(())
    }

    fn execute_all(
        &mut self,
        primitives: &[Primitive],
        provider: &dyn StateProvider,
    ) -> Result<Vec<PrimitiveReport>, Halt> {
        let mut reports = Vec::with_capacity(primitives.len());
        for primitive in primitives {
            self.check_cancel()?;
            let outcome = match self.op.mode() {
                ExecutionMode::Silent => self.run_silent(primitive, provider)?,
                ExecutionMode::Classical => self.run_classical(primitive)?,
            };
            if let Err(source) = &outcome {
                if primitive.critical {
                    return Err(Halt::Failed(
                        ExecutionError::PrimitiveCriticalFailure {
                            primitive_id: primitive.id.to_string(),
                            source: source.clone(),
                        }
                        .into(),
                    ));
                }
            }
            reports.push(PrimitiveReport {
                subsystem: primitive.subsystem.clone(),
                outcome,
            });
        }
        Ok(reports)
    }

    fn run_classical(&mut self, primitive: &Primitive) -> Result<Result<PrimitiveOutcome, TargetError>, Halt> {
        self.sink.emit(
            EventType::PrimitiveStarted,
            Some(EventPayload::PrimitiveStarted {
                primitive: primitive.clone(),
            }),
            None,
        )?;

        let outcome = self.run_primitive(primitive);
        match &outcome {
            Ok(result) => self.sink.emit(
                EventType::PrimitiveCompleted,
                Some(EventPayload::PrimitiveCompleted {
                    primitive_id: primitive.id,
                    subsystem: primitive.subsystem.clone(),
                    outcome: result.clone(),
                }),
                None,
            )?,
            Err(source) => self.emit_failure(primitive, source)?,
        }
        Ok(outcome)
    }

    /// Runs a primitive between two fingerprint reads of its subsystem and
    /// reports only the resulting evidence.
    ///
    /// Both reads go through the same perspective: the first contributing one
    /// that answers the before-read.
    fn run_silent(
        &mut self,
        primitive: &Primitive,
        provider: &dyn StateProvider,
    ) -> Result<Result<PrimitiveOutcome, TargetError>, Halt> {
        let (perspective, before) = match first_fingerprint(provider, primitive, &self.read_from) {
            Ok(read) => read,
            Err(source) => {
                self.emit_failure(primitive, &source)?;
                return Ok(Err(source));
            }
        };

        let outcome = self.run_primitive(primitive);

        let after = match fingerprint(provider, primitive, perspective) {
            Ok(fp) => fp,
            Err(source) => {
                self.emit_failure(primitive, &source)?;
                return Ok(Err(source));
            }
        };

        let evidence = Evidence::new(before, after, primitive.severity);
        debug!(
            primitive_id = %primitive.id,
            %perspective,
            gap_detected = evidence.gap_detected(),
            severity = %evidence.severity(),
            "silent evidence captured"
        );
        self.sink.emit(EventType::RealityAnomaly, None, Some(evidence))?;

        if let Err(source) = &outcome {
            self.emit_failure(primitive, source)?;
        }
        Ok(outcome)
    }

    fn run_primitive(&self, primitive: &Primitive) -> Result<PrimitiveOutcome, TargetError> {
        let outcome = self.executor.execute(primitive);
        if let Ok(result) = &outcome {
            debug!(primitive_id = %primitive.id, subsystem = %primitive.subsystem, ?result, "primitive finished");
        }
        outcome
    }

    fn emit_failure(&mut self, primitive: &Primitive, source: &TargetError) -> Result<(), Halt> {
        let err = ExecutionError::PrimitiveFailed {
            primitive_id: primitive.id.to_string(),
            source: source.clone(),
        };
        warn!(
            subsystem = %primitive.subsystem,
            critical = primitive.critical,
            error_kind = err.kind(),
            error = %err,
            "primitive failed"
        );
        self.sink.emit(
            EventType::PrimitiveFailed,
            Some(EventPayload::PrimitiveFailed {
                primitive_id: primitive.id,
                critical: primitive.critical,
                reason: source.to_string(),
            }),
            None,
        )
    }
}

fn fingerprint(
    provider: &dyn StateProvider,
    primitive: &Primitive,
    perspective: Perspective,
) -> Result<Fingerprint, TargetError> {
    provider
        .read_subsystem(&primitive.subsystem, perspective)
        .map(|descriptor| Fingerprint::of_subsystem(&primitive.subsystem, descriptor.as_ref()))
}

/// Fingerprints the primitive's subsystem from the first of `perspectives`
/// that answers.
fn first_fingerprint(
    provider: &dyn StateProvider,
    primitive: &Primitive,
    perspectives: &[Perspective],
) -> Result<(Perspective, Fingerprint), TargetError> {
    let mut last_err = None;
    for &perspective in perspectives {
        match fingerprint(provider, primitive, perspective) {
            Ok(fp) => return Ok((perspective, fp)),
            Err(err) => {
                debug!(%perspective, error = %err, "fingerprint read failed; trying next perspective");
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| TargetError::Backend("no contributing perspective to read from".to_string())))
}
