//! Per-perspective observations.

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::target::{CapabilitySnapshot, Perspective, StateReading, StateSnapshot};

/// Whether an observation holds data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ObservationStatus {
    /// State and capabilities were captured.
    Captured,
    /// The perspective could not reach the target; every data field is unset.
    Unavailable {
        /// Why the perspective degraded.
        reason: String,
    },
}

/// One perspective's capture. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    perspective: Perspective,
    state: Option<StateSnapshot>,
    capabilities: Option<CapabilitySnapshot>,
    fingerprint: Option<Fingerprint>,
    status: ObservationStatus,
}

impl Observation {
    /// A successful capture. The behavioral fingerprint is computed here.
    #[must_use]
    pub fn captured(perspective: Perspective, reading: StateReading) -> Self {
        let fingerprint = Fingerprint::of_observation(&reading.state, &reading.capabilities);
        Self {
            perspective,
            state: Some(reading.state),
            capabilities: Some(reading.capabilities),
            fingerprint: Some(fingerprint),
            status: ObservationStatus::Captured,
        }
    }

    /// A degraded capture.
    #[must_use]
    pub fn unavailable(perspective: Perspective, reason: impl Into<String>) -> Self {
        Self {
            perspective,
            state: None,
            capabilities: None,
            fingerprint: None,
            status: ObservationStatus::Unavailable { reason: reason.into() },
        }
    }

    /// The perspective that produced this observation.
    #[must_use]
    pub const fn perspective(&self) -> Perspective {
        self.perspective
    }

    /// Captured state, if available.
    #[must_use]
    pub const fn state(&self) -> Option<&StateSnapshot> {
        self.state.as_ref()
    }

    /// Captured capabilities, if available.
    #[must_use]
    pub const fn capabilities(&self) -> Option<&CapabilitySnapshot> {
        self.capabilities.as_ref()
    }

    /// Behavioral fingerprint, if available.
    #[must_use]
    pub const fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn status(&self) -> &ObservationStatus {
        &self.status
    }

    /// Returns true if this observation carries data.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self.status, ObservationStatus::Captured)
    }
}
