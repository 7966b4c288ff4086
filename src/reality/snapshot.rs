//! Consolidated reality snapshots.
//!
//! Merging sorts observations by perspective index first, so the result
//! never depends on the order in which observer tasks finished.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::belief::SubsystemId;
use crate::descriptor::Descriptor;
use crate::error::ExecutionError;
use crate::fingerprint::Fingerprint;
use crate::target::{CapabilitySnapshot, Perspective, StateSnapshot};

use super::observation::Observation;

/// Per-subsystem conflict resolution when perspectives disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRule {
    /// The descriptor reported by the most perspectives wins; ties go to the
    /// descriptor first reported by the lowest perspective index.
    #[default]
    Consensus,
    /// The lowest-indexed perspective reporting the subsystem wins.
    LowestPerspective,
}

/// Merge of all observations from one sampling round.
///
/// A subsystem reported by any captured perspective is present; a perspective
/// that does not report a subsystem does not vote for its absence.
/// Capabilities are the union across captured perspectives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealitySnapshot {
    state: StateSnapshot,
    capabilities: CapabilitySnapshot,
    fingerprint: Fingerprint,
    perspectives: Vec<Perspective>,
    degraded: Vec<Perspective>,
}

impl RealitySnapshot {
    /// Merge a round of observations.
    ///
    /// # Errors
    /// `ObservationUnavailable` if no observation carries data.
    pub fn merge(mut observations: Vec<Observation>, rule: MergeRule) -> Result<Self, ExecutionError> {
        let total = observations.len();
        observations.sort_by_key(Observation::perspective);

        let mut perspectives = Vec::new();
        let mut degraded = Vec::new();
        let mut votes: BTreeMap<&SubsystemId, Vec<&Descriptor>> = BTreeMap::new();
        let mut capabilities = CapabilitySnapshot::new();

        for obs in &observations {
            let (Some(state), Some(caps)) = (obs.state(), obs.capabilities()) else {
                degraded.push(obs.perspective());
                continue;
            };
            perspectives.push(obs.perspective());
            for (id, descriptor) in state {
                votes.entry(id).or_default().push(descriptor);
            }
            capabilities.extend(caps.iter().cloned());
        }

        if perspectives.is_empty() {
            return Err(ExecutionError::ObservationUnavailable { perspectives: total });
        }

        let state: StateSnapshot = votes
            .into_iter()
            .filter_map(|(id, ballots)| resolve(&ballots, rule).map(|d| (id.clone(), d.clone())))
            .collect();
        let fingerprint = Fingerprint::of_snapshot(&state, &capabilities);

        Ok(Self {
            state,
            capabilities,
            fingerprint,
            perspectives,
            degraded,
        })
    }

    /// Merged per-subsystem state.
    #[must_use]
    pub const fn state(&self) -> &StateSnapshot {
        &self.state
    }

    /// Observed descriptor for a subsystem.
    #[must_use]
    pub fn get(&self, id: &SubsystemId) -> Option<&Descriptor> {
        self.state.get(id)
    }

    /// Union of capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilitySnapshot {
        &self.capabilities
    }

    /// Fingerprint over merged state and capabilities.
    #[must_use]
    pub const fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Perspectives that contributed data, ascending.
    #[must_use]
    pub fn perspectives(&self) -> &[Perspective] {
        &self.perspectives
    }

    /// Perspectives that degraded, ascending.
    #[must_use]
    pub fn degraded(&self) -> &[Perspective] {
        &self.degraded
    }
}

// `ballots` is in ascending perspective order.
fn resolve<'a>(ballots: &[&'a Descriptor], rule: MergeRule) -> Option<&'a Descriptor> {
    match rule {
        MergeRule::LowestPerspective => ballots.first().copied(),
        MergeRule::Consensus => {
            let mut tally: Vec<(&Descriptor, usize)> = Vec::new();
            for ballot in ballots {
                match tally.iter().position(|(d, _)| *d == *ballot) {
                    Some(i) => tally[i].1 += 1,
                    None => tally.push((*ballot, 1)),
                }
            }
            let mut best: Option<(&Descriptor, usize)> = None;
            for (descriptor, count) in tally {
                if best.map_or(true, |(_, c)| count > c) {
                    best = Some((descriptor, count));
                }
            }
            best.map(|(d, _)| d)
        }
    }
}
