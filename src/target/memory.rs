//! In-memory target.
//!
//! A thread-safe stand-in for a real target system. It implements both
//! `StateProvider` and `PrimitiveExecutor`, supports per-perspective divergent
//! views, and allows fault injection. Intended for embedded usage and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::belief::SubsystemId;
use crate::descriptor::Descriptor;
use crate::fabricator::{Primitive, PrimitiveAction};

use super::{
    CapabilitySnapshot, Perspective, PrimitiveExecutor, PrimitiveOutcome, StateProvider, StateReading,
    StateSnapshot, TargetError,
};

fn lock_err(context: &'static str) -> TargetError {
    TargetError::Backend(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct TargetState {
    state: StateSnapshot,
    capabilities: CapabilitySnapshot,
    perspective_overrides: BTreeMap<Perspective, StateSnapshot>,
    unreachable: BTreeSet<Perspective>,
    rejecting: BTreeSet<SubsystemId>,
}

/// Thread-safe in-memory target system.
#[derive(Debug, Default)]
pub struct InMemoryTarget {
    inner: RwLock<TargetState>,
    executed: AtomicU64,
}

impl InMemoryTarget {
    /// Create an empty target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a target with the given state.
    #[must_use]
    pub fn with_state(state: impl IntoIterator<Item = (SubsystemId, Descriptor)>) -> Self {
        let target = Self::default();
        if let Ok(mut inner) = target.inner.write() {
            inner.state = state.into_iter().collect();
        }
        target
    }

    /// Set one subsystem's state as seen by every perspective without an override.
    pub fn set(&self, id: SubsystemId, descriptor: Descriptor) -> Result<(), TargetError> {
        let mut inner = self.inner.write().map_err(|_| lock_err("target.set"))?;
        inner.state.insert(id, descriptor);
        Ok(())
    }

    /// Add a capability visible from every perspective.
    pub fn grant_capability(&self, capability: impl Into<String>) -> Result<(), TargetError> {
        let mut inner = self.inner.write().map_err(|_| lock_err("target.grant"))?;
        inner.capabilities.insert(capability.into());
        Ok(())
    }

    /// Make `perspective` see `descriptor` for `id` instead of the shared state.
    pub fn override_for(
        &self,
        perspective: Perspective,
        id: SubsystemId,
        descriptor: Descriptor,
    ) -> Result<(), TargetError> {
        let mut inner = self.inner.write().map_err(|_| lock_err("target.override"))?;
        inner.perspective_overrides.entry(perspective).or_default().insert(id, descriptor);
        Ok(())
    }

    /// Make reads from `perspective` fail (or succeed again).
    pub fn set_unreachable(&self, perspective: Perspective, unreachable: bool) -> Result<(), TargetError> {
        let mut inner = self.inner.write().map_err(|_| lock_err("target.unreachable"))?;
        if unreachable {
            inner.unreachable.insert(perspective);
        } else {
            inner.unreachable.remove(&perspective);
        }
        Ok(())
    }

    /// Make every primitive targeting `id` fail with `Rejected`.
    pub fn reject_primitives_on(&self, id: SubsystemId) -> Result<(), TargetError> {
        let mut inner = self.inner.write().map_err(|_| lock_err("target.reject"))?;
        inner.rejecting.insert(id);
        Ok(())
    }

    /// Current shared state of one subsystem.
    pub fn get(&self, id: &SubsystemId) -> Result<Option<Descriptor>, TargetError> {
        let inner = self.inner.read().map_err(|_| lock_err("target.get"))?;
        Ok(inner.state.get(id).cloned())
    }

    /// Number of primitives executed so far (including rejected ones).
    #[must_use]
    pub fn executed_count(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}

impl StateProvider for InMemoryTarget {
    fn read_state(&self, perspective: Perspective) -> Result<StateReading, TargetError> {
        let inner = self.inner.read().map_err(|_| lock_err("target.read_state"))?;
        if inner.unreachable.contains(&perspective) {
            return Err(TargetError::Unreachable {
                perspective,
                reason: "perspective marked unreachable".to_string(),
            });
        }

        let mut state = inner.state.clone();
        if let Some(overrides) = inner.perspective_overrides.get(&perspective) {
            state.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        Ok(StateReading {
            state,
            capabilities: inner.capabilities.clone(),
        })
    }

    fn read_subsystem(&self, id: &SubsystemId, perspective: Perspective) -> Result<Option<Descriptor>, TargetError> {
        let inner = self.inner.read().map_err(|_| lock_err("target.read_subsystem"))?;
        if inner.unreachable.contains(&perspective) {
            return Err(TargetError::Unreachable {
                perspective,
                reason: "perspective marked unreachable".to_string(),
            });
        }
        let overridden = inner.perspective_overrides.get(&perspective).and_then(|o| o.get(id));
        Ok(overridden.or_else(|| inner.state.get(id)).cloned())
    }
}

impl PrimitiveExecutor for InMemoryTarget {
    fn execute(&self, primitive: &Primitive) -> Result<PrimitiveOutcome, TargetError> {
        self.executed.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.write().map_err(|_| lock_err("target.execute"))?;
        if inner.rejecting.contains(&primitive.subsystem) {
            return Err(TargetError::Rejected {
                subsystem: primitive.subsystem.clone(),
                reason: "subsystem rejects primitives".to_string(),
            });
        }

        match &primitive.action {
            PrimitiveAction::Probe { expect } => {
                let actual = inner.state.get(&primitive.subsystem).cloned();
                if &actual == expect {
                    Ok(PrimitiveOutcome::Confirmed)
                } else {
                    Ok(PrimitiveOutcome::Refuted { actual })
                }
            }
            PrimitiveAction::Apply { target } => {
                inner.state.insert(primitive.subsystem.clone(), target.clone());
                Ok(PrimitiveOutcome::Applied)
            }
        }
    }
}
