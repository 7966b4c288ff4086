//! Operation phase and status words.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Pipeline phase. Ordinals 1 to 5 run in strict order; 0 means not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Phase {
    NotStarted = 0,
    BeliefExtraction = 1,
    GapDiscovery = 2,
    Fabrication = 3,
    Execution = 4,
    Reconciliation = 5,
}

impl Phase {
    /// Ordinal of this phase.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    const fn from_ordinal(value: u8) -> Self {
        match value {
            1 => Self::BeliefExtraction,
            2 => Self::GapDiscovery,
            3 => Self::Fabrication,
            4 => Self::Execution,
            5 => Self::Reconciliation,
            _ => Self::NotStarted,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::BeliefExtraction => "belief_extraction",
            Self::GapDiscovery => "gap_discovery",
            Self::Fabrication => "fabrication",
            Self::Execution => "execution",
            Self::Reconciliation => "reconciliation",
        };
        f.write_str(name)
    }
}

/// Lifecycle status: Pending → Running → {Completed | Failed | Cancelled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
#[allow(missing_docs)]
pub enum OperationStatus {
    Pending = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
    Cancelled = 4,
}

impl OperationStatus {
    /// Terminal states are final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            4 => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Atomic status word. Only compare-and-swap transitions are possible.
#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(OperationStatus::Pending as u8))
    }

    pub(crate) fn load(&self) -> OperationStatus {
        OperationStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves `from` → `to`. Fails if the current status is not `from`.
    pub(crate) fn transition(&self, from: OperationStatus, to: OperationStatus) -> bool {
        if from.is_terminal() {
            return false;
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug)]
pub(crate) struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(Phase::NotStarted as u8))
    }

    pub(crate) fn load(&self) -> Phase {
        Phase::from_ordinal(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, phase: Phase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}
