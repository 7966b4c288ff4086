//! Folding execution results back into beliefs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::belief::{BeliefUpdate, SubsystemId};
use crate::reality::Gap;
use crate::target::{PrimitiveOutcome, TargetError};

/// How a gap ended after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapResolution {
    /// No primitive succeeded in addressing the gap.
    Unresolved,
    /// A probe re-read exactly the observed state.
    Confirmed,
    /// A corrective primitive moved reality to the belief.
    Corrected,
}

/// Result of one executed primitive.
#[derive(Debug, Clone)]
pub(crate) struct PrimitiveReport {
    pub(crate) subsystem: SubsystemId,
    pub(crate) outcome: Result<PrimitiveOutcome, TargetError>,
}

impl PrimitiveReport {
    fn resolution(&self) -> GapResolution {
        match &self.outcome {
            Ok(PrimitiveOutcome::Applied) => GapResolution::Corrected,
            Ok(PrimitiveOutcome::Confirmed) => GapResolution::Confirmed,
            Ok(PrimitiveOutcome::Refuted { .. }) | Err(_) => GapResolution::Unresolved,
        }
    }
}

/// Per-gap resolution; the strongest result per subsystem wins.
pub(crate) fn resolve(gaps: &[Gap], reports: &[PrimitiveReport]) -> Vec<(Gap, GapResolution)> {
    let mut best: BTreeMap<&SubsystemId, GapResolution> = BTreeMap::new();
    for report in reports {
        let entry = best.entry(&report.subsystem).or_insert(GapResolution::Unresolved);
        *entry = (*entry).max(report.resolution());
    }

    gaps.iter()
        .map(|gap| {
            let resolution = best.get(&gap.subsystem).copied().unwrap_or(GapResolution::Unresolved);
            (gap.clone(), resolution)
        })
        .collect()
}

/// Belief writes implied by resolved gaps.
///
/// Confirmed gaps adopt the observed descriptor. A confirmed absence keeps
/// the existing entry. Corrected and unresolved gaps leave beliefs as-is.
pub(crate) fn belief_updates(resolved: &[(Gap, GapResolution)]) -> Vec<BeliefUpdate> {
    resolved
        .iter()
        .filter(|(_, r)| *r == GapResolution::Confirmed)
        .filter_map(|(gap, _)| {
            gap.observed.clone().map(|descriptor| BeliefUpdate {
                subsystem: gap.subsystem.clone(),
                descriptor,
            })
        })
        .collect()
}
