//! Operation events.
//!
//! Events are serializable so a consumer can forward them as-is.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::belief::SubsystemId;
use crate::fabricator::{Primitive, PrimitiveId, Strategy};
use crate::fingerprint::Fingerprint;
use crate::reality::{CapabilityChange, GapKind, Severity};
use crate::target::PrimitiveOutcome;

use super::status::Phase;

/// Unique identifier for an operation.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new random operation id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event type tag.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PrimitiveStarted,
    PrimitiveCompleted,
    PrimitiveFailed,
    RealityAnomaly,
    UnsupportedGapKind,
    CapabilityDrift,
    OperationCompleted,
    OperationFailed,
}

impl EventType {
    /// Returns true for the last event of a stream.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::OperationCompleted | Self::OperationFailed)
    }
}

/// Counts reported when an operation completes.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub gaps: usize,
    pub primitives: usize,
    pub failed_primitives: usize,
    pub unsupported: usize,
    pub capability_gaps: usize,
    pub confirmed: usize,
    pub corrected: usize,
    pub unresolved: usize,
    pub beliefs_changed: usize,
    pub belief_version: u64,
}

/// Event payload.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// The primitive about to run.
    PrimitiveStarted { primitive: Primitive },

    /// How a primitive finished.
    PrimitiveCompleted {
        primitive_id: PrimitiveId,
        subsystem: SubsystemId,
        outcome: PrimitiveOutcome,
    },

    /// Why a primitive failed.
    PrimitiveFailed {
        primitive_id: PrimitiveId,
        critical: bool,
        reason: String,
    },

    /// A gap the fabricator could not fully serve.
    UnsupportedGapKind {
        subsystem: SubsystemId,
        kind: GapKind,
        strategy: Strategy,
    },

    /// A capability gained or lost against the declared set.
    CapabilityDrift {
        capability: String,
        change: CapabilityChange,
    },

    OperationCompleted(OperationSummary),

    OperationFailed {
        phase: Phase,
        error_kind: String,
        message: String,
    },
}

/// Before/after fingerprints of one subsystem around a silent primitive.
///
/// `gap_detected` is derived in the constructor and cannot be set directly.
/// `severity` is the magnitude of the gap the primitive was fabricated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Evidence {
    before: Fingerprint,
    after: Fingerprint,
    gap_detected: bool,
    severity: Severity,
}

impl Evidence {
    /// Evidence with `gap_detected = before != after`.
    #[must_use]
    pub fn new(before: Fingerprint, after: Fingerprint, severity: Severity) -> Self {
        Self {
            before,
            after,
            gap_detected: before != after,
            severity,
        }
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn before(&self) -> Fingerprint {
        self.before
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn after(&self) -> Fingerprint {
        self.after
    }

    /// Whether the primitive left a detectable trace.
    #[must_use]
    pub const fn gap_detected(&self) -> bool {
        self.gap_detected
    }

    /// Severity of the source gap.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }
}

impl<'de> Deserialize<'de> for Evidence {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            before: Fingerprint,
            after: Fingerprint,
            severity: f64,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(Self::new(raw.before, raw.after, Severity::new(raw.severity)))
    }
}

/// One entry of an operation's event stream.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Position in the stream, starting at 0.
    pub sequence: u64,
    pub operation_id: OperationId,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub(crate) fn new(
        sequence: u64,
        operation_id: OperationId,
        event_type: EventType,
        payload: Option<EventPayload>,
        evidence: Option<Evidence>,
    ) -> Self {
        Self {
            sequence,
            operation_id,
            event_type,
            payload,
            evidence,
            timestamp: Utc::now(),
        }
    }

    /// The primitive this event refers to, if any.
    #[must_use]
    pub fn primitive_id(&self) -> Option<PrimitiveId> {
        match self.payload.as_ref()? {
            EventPayload::PrimitiveStarted { primitive } => Some(primitive.id),
            EventPayload::PrimitiveCompleted { primitive_id, .. }
            | EventPayload::PrimitiveFailed { primitive_id, .. } => Some(*primitive_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_flag_follows_fingerprints() {
        let a = Fingerprint::from_bytes([1; 32]);
        let b = Fingerprint::from_bytes([2; 32]);
        let sev = Severity::new(0.5);
        assert!(!Evidence::new(a, a, sev).gap_detected());
        assert!(Evidence::new(a, b, sev).gap_detected());
        assert_eq!(Evidence::new(a, b, sev).severity(), sev);
    }

    #[test]
    fn evidence_flag_is_recomputed_on_deserialize() {
        let a = Fingerprint::from_bytes([1; 32]);
        let mut json = serde_json::to_value(Evidence::new(a, a, Severity::new(0.25))).unwrap();
        assert_eq!(json["severity"], 0.25);
        json["gap_detected"] = serde_json::Value::Bool(true);
        json["severity"] = serde_json::json!(7.0);
        let back: Evidence = serde_json::from_value(json).unwrap();
        assert!(!back.gap_detected());
        assert_eq!(back.severity().value(), 1.0);
    }

    #[test]
    fn anomaly_event_carries_only_evidence() {
        let fp = Fingerprint::from_bytes([0; 32]);
        let evidence = Evidence::new(fp, fp, Severity::new(1.0));
        let event = Event::new(3, OperationId::new(), EventType::RealityAnomaly, None, Some(evidence));
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("payload").is_none());
        assert_eq!(json["event_type"], "reality_anomaly");
        assert_eq!(json["evidence"]["gap_detected"], false);
        assert_eq!(event.primitive_id(), None);
    }

    #[test]
    fn capability_drift_payload_is_tagged() {
        let payload = EventPayload::CapabilityDrift {
            capability: "admin".to_string(),
            change: CapabilityChange::Gained,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "capability_drift");
        assert_eq!(json["change"], "gained");
    }
}
