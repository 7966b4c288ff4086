//! Gap analysis: belief vs. observed divergences.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::belief::{BeliefModel, SubsystemId};
use crate::descriptor::{Descriptor, DescriptorDistance};

use super::snapshot::RealitySnapshot;

/// Shape of a divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    /// Present on both sides with different descriptors.
    Drift,
    /// Expected by the belief model but not observed.
    Missing,
    /// Observed but absent from the belief model.
    Unexpected,
}

impl fmt::Display for GapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drift => write!(f, "drift"),
            Self::Missing => write!(f, "missing"),
            Self::Unexpected => write!(f, "unexpected"),
        }
    }
}

/// Gap severity in `[0.0, 1.0]` with a total order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Severity(f64);

impl Severity {
    /// Clamp into `[0.0, 1.0]`. NaN is treated as maximal.
    #[must_use]
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self(1.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Severity {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Severity {}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// A detected divergence for one subsystem.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub subsystem: SubsystemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<Descriptor>,
    pub kind: GapKind,
    pub severity: Severity,
}

/// Compare a snapshot against a belief model.
///
/// Every subsystem present on either side whose descriptors differ yields one
/// gap. The result is ordered by severity descending, then subsystem ascending.
#[must_use]
pub fn find_gaps(
    snapshot: &RealitySnapshot,
    beliefs: &BeliefModel,
    distance: &dyn DescriptorDistance,
) -> Vec<Gap> {
    let subsystems: BTreeSet<&SubsystemId> = beliefs.entries().keys().chain(snapshot.state().keys()).collect();

    let mut gaps: Vec<Gap> = subsystems
        .into_iter()
        .filter_map(|id| {
            let expected = beliefs.get(id);
            let observed = snapshot.get(id);
            let kind = match (expected, observed) {
                (Some(e), Some(o)) if e == o => return None,
                (Some(_), Some(_)) => GapKind::Drift,
                (Some(_), None) => GapKind::Missing,
                (None, Some(_)) => GapKind::Unexpected,
                (None, None) => return None,
            };
            Some(Gap {
                subsystem: id.clone(),
                expected: expected.cloned(),
                observed: observed.cloned(),
                kind,
                severity: Severity::new(distance.distance(expected, observed)),
            })
        })
        .collect();

    gaps.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.subsystem.cmp(&b.subsystem)));
    gaps
}

/// Direction of a capability divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityChange {
    /// Observed but not believed.
    Gained,
    /// Believed but not observed.
    Lost,
}

impl fmt::Display for CapabilityChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gained => write!(f, "gained"),
            Self::Lost => write!(f, "lost"),
        }
    }
}

/// A capability whose presence differs between beliefs and the snapshot.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityGap {
    pub capability: String,
    pub change: CapabilityChange,
}

/// Compare the snapshot's capability union against the believed capability set.
///
/// A model that declares no capability set yields nothing. The result is
/// ordered by capability name.
#[must_use]
pub fn find_capability_gaps(snapshot: &RealitySnapshot, beliefs: &BeliefModel) -> Vec<CapabilityGap> {
    let Some(believed) = beliefs.capabilities() else {
        return Vec::new();
    };
    let observed = snapshot.capabilities();

    let gained = observed.difference(believed).map(|c| CapabilityGap {
        capability: c.clone(),
        change: CapabilityChange::Gained,
    });
    let lost = believed.difference(observed).map(|c| CapabilityGap {
        capability: c.clone(),
        change: CapabilityChange::Lost,
    });
    let mut gaps: Vec<CapabilityGap> = gained.chain(lost).collect();
    gaps.sort();
    gaps
}
