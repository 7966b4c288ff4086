//! Operations: the five-phase observe → fabricate → execute → reconcile pipeline.
//!
//! An operation is created `Pending`, driven on its own thread by the
//! `OperationController`, and reports progress through an `OperationStream`.

mod controller;
mod events;
mod reconcile;
mod status;
mod stream;

pub use controller::{ControllerConfig, OperationController};
pub use events::{Event, EventPayload, EventType, Evidence, OperationId, OperationSummary};
pub use reconcile::GapResolution;
pub use status::{OperationStatus, Phase};
pub use stream::OperationStream;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cancel::{CancelSignal, CancelSource};
use crate::reality::RealityObserver;

use status::{PhaseCell, StatusCell};

/// Execution discipline for primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Minimal footprint; reports fingerprint evidence only.
    Silent,
    /// Instrumented; reports each primitive and its outcome.
    #[default]
    Classical,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => f.write_str("silent"),
            Self::Classical => f.write_str("classical"),
        }
    }
}

/// Parameters for a new operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    #[allow(missing_docs)]
    pub mode: ExecutionMode,
    /// Perspective count override; `None` uses the observer's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perspectives: Option<usize>,
}

impl OperationRequest {
    /// A request in the given mode.
    #[must_use]
    pub const fn new(mode: ExecutionMode) -> Self {
        Self { mode, perspectives: None }
    }

    /// Override the perspective count.
    #[must_use]
    pub const fn with_perspectives(mut self, perspectives: usize) -> Self {
        self.perspectives = Some(perspectives);
        self
    }
}

/// Shared state of one operation.
#[derive(Debug)]
pub struct Operation {
    id: OperationId,
    mode: ExecutionMode,
    perspectives: usize,
    observer: Arc<RealityObserver>,
    phase: PhaseCell,
    status: StatusCell,
    cancel: CancelSource,
    started: AtomicBool,
}

impl Operation {
    pub(crate) fn new(mode: ExecutionMode, perspectives: usize, observer: Arc<RealityObserver>) -> Self {
        Self {
            id: OperationId::new(),
            mode,
            perspectives,
            observer,
            phase: PhaseCell::new(),
            status: StatusCell::new(),
            cancel: CancelSource::new(),
            started: AtomicBool::new(false),
        }
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn id(&self) -> OperationId {
        self.id
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Perspective count used for the observation round.
    #[must_use]
    pub const fn perspectives(&self) -> usize {
        self.perspectives
    }

    /// The observer this operation reads reality through.
    #[must_use]
    pub fn observer(&self) -> &Arc<RealityObserver> {
        &self.observer
    }

    /// Current phase (`NotStarted` before the driver runs).
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase.load()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> OperationStatus {
        self.status.load()
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.phase.store(phase);
    }

    pub(crate) fn transition(&self, from: OperationStatus, to: OperationStatus) -> bool {
        self.status.transition(from, to)
    }

    pub(crate) fn cancel_signal(&self) -> CancelSignal {
        self.cancel.signal()
    }

    /// Marks the operation as handed to a driver. True on the first call only.
    pub(crate) fn claim(&self) -> bool {
        !self.started.swap(true, Ordering::AcqRel)
    }
}

/// Caller-side handle to an operation. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    inner: Arc<Operation>,
}

impl OperationHandle {
    pub(crate) const fn new(inner: Arc<Operation>) -> Self {
        Self { inner }
    }

    pub(crate) fn shared(&self) -> Arc<Operation> {
        Arc::clone(&self.inner)
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn id(&self) -> OperationId {
        self.inner.id()
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn mode(&self) -> ExecutionMode {
        self.inner.mode()
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn status(&self) -> OperationStatus {
        self.inner.status()
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn phase(&self) -> Phase {
        self.inner.phase()
    }

    /// The underlying operation.
    #[must_use]
    pub fn operation(&self) -> &Operation {
        &self.inner
    }

    /// Request cancellation. Returns true on the first call only.
    ///
    /// A running operation observes the request at its next phase or
    /// primitive boundary, or while handing off an event. A pending operation
    /// becomes `Cancelled` immediately.
    pub fn cancel(&self) -> bool {
        let first = self.inner.cancel.cancel();
        self.inner.transition(OperationStatus::Pending, OperationStatus::Cancelled);
        first
    }
}
