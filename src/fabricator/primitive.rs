//! Primitive types.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::belief::SubsystemId;
use crate::descriptor::Descriptor;
use crate::reality::{GapKind, Severity};

const PRIMITIVE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a3e_8d4b_4c57_9a0e_51b7_c3d2_e8f4);

/// Deterministic primitive identifier (UUID v5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimitiveId(Uuid);

impl PrimitiveId {
    /// Derive the id for the `step`-th action of the `ordinal`-th gap in a batch.
    #[must_use]
    pub fn derive(ordinal: usize, subsystem: &SubsystemId, action: &str, step: usize) -> Self {
        let name = format!("{ordinal}/{subsystem}/{action}/{step}");
        Self(Uuid::new_v5(&PRIMITIVE_NAMESPACE, name.as_bytes()))
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a primitive does to its subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimitiveAction {
    /// Read-only: re-read the subsystem and check it still shows `expect`.
    Probe {
        /// The observed descriptor the gap reported (`None` = absent).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<Descriptor>,
    },
    /// Corrective: move the subsystem to `target`.
    Apply {
        /// The believed descriptor.
        target: Descriptor,
    },
}

impl PrimitiveAction {
    /// Stable action name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Probe { .. } => "probe",
            Self::Apply { .. } => "apply",
        }
    }

    /// Returns true if the action never mutates the target.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        matches!(self, Self::Probe { .. })
    }
}

/// A self-contained action derived from exactly one gap.
///
/// Carries everything needed to run without further lookups.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primitive {
    pub id: PrimitiveId,
    pub subsystem: SubsystemId,
    pub action: PrimitiveAction,
    pub gap_kind: GapKind,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<Descriptor>,
    /// A failed critical primitive fails the whole operation.
    pub critical: bool,
}
