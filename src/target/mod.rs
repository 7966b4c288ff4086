//! Target-system interfaces.
//!
//! The core never touches the target directly. Reads go through a
//! `StateProvider` that returns owned copies of state; primitives are applied
//! through a `PrimitiveExecutor`. Both are pluggable.

mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::belief::SubsystemId;
use crate::descriptor::Descriptor;
use crate::fabricator::Primitive;

pub use memory::InMemoryTarget;

/// Owned copy of the target's per-subsystem state.
pub type StateSnapshot = BTreeMap<SubsystemId, Descriptor>;

/// Owned copy of the capabilities visible from one perspective.
pub type CapabilitySnapshot = BTreeSet<String>;

/// Index of one independent vantage point, in `[0, N)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Perspective(usize);

impl Perspective {
    /// The lowest perspective index.
    pub const PRIMARY: Self = Self(0);

    /// Wraps a perspective index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The perspective index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// One read of the target from one perspective.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateReading {
    pub state: StateSnapshot,
    pub capabilities: CapabilitySnapshot,
}

/// Errors reported by target-system collaborators.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TargetError {
    /// The target could not be reached.
    #[error("Target unreachable from {perspective}: {reason}")]
    Unreachable {
        /// Perspective that attempted the read.
        perspective: Perspective,
        /// Human-readable cause.
        reason: String,
    },

    /// The target refused the primitive.
    #[error("Primitive rejected on '{subsystem}': {reason}")]
    Rejected {
        /// Subsystem the primitive targeted.
        subsystem: SubsystemId,
        /// Human-readable cause.
        reason: String,
    },

    /// Backend failure.
    #[error("Target backend error: {0}")]
    Backend(String),
}

/// Result of running one primitive against the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimitiveOutcome {
    /// A probe read exactly the state the gap reported.
    Confirmed,
    /// A probe read something other than what the gap reported.
    Refuted {
        /// What the probe actually read.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        actual: Option<Descriptor>,
    },
    /// A corrective primitive was applied.
    Applied,
}

/// Source of target-system state. The only read path into the outside world.
pub trait StateProvider: Send + Sync {
    /// Capture state and capabilities from one perspective.
    fn read_state(&self, perspective: Perspective) -> Result<StateReading, TargetError>;

    /// Read a single subsystem from one perspective. `Ok(None)` means the
    /// subsystem is absent.
    ///
    /// The default reads the full state from `perspective`.
    fn read_subsystem(&self, id: &SubsystemId, perspective: Perspective) -> Result<Option<Descriptor>, TargetError> {
        let mut reading = self.read_state(perspective)?;
        Ok(reading.state.remove(id))
    }
}

/// Applies primitives to the target.
pub trait PrimitiveExecutor: Send + Sync {
    /// Run one primitive to completion.
    fn execute(&self, primitive: &Primitive) -> Result<PrimitiveOutcome, TargetError>;
}
