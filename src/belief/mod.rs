//! Belief model: the declared expectation of the target's state.
//!
//! A `BeliefModel` maps each subsystem to its expected descriptor. It is read
//! (never mutated) during gap analysis and only changes through
//! [`BeliefLedger::reconcile`], which inserts or overwrites entries but never
//! removes one.
//!
//! A model may also declare the capability set the target is expected to
//! expose. Reconciliation never rewrites it; capability drift is reported only.

mod ledger;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;
use crate::error::ValidationError;

pub use ledger::{BeliefLedger, ReconcileCommit};

/// Identifier of one subsystem of the target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubsystemId(String);

impl SubsystemId {
    /// Creates a subsystem id. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    /// Returns `EmptySubsystemId` if the trimmed id is empty.
    pub fn new(id: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = id.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySubsystemId);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SubsystemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single reconciliation write: set `subsystem` to `descriptor`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefUpdate {
    pub subsystem: SubsystemId,
    pub descriptor: Descriptor,
}

/// Versioned mapping from subsystem to expected descriptor.
///
/// # Examples
///
/// ```
/// use vantage::{BeliefModel, Descriptor, SubsystemId};
///
/// let model = BeliefModel::from_entries([
///     (SubsystemId::new("auth").unwrap(), Descriptor::from("enforcing")),
/// ]);
///
/// assert_eq!(model.version(), 0);
/// assert_eq!(model.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeliefModel {
    version: u64,
    entries: BTreeMap<SubsystemId, Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    capabilities: Option<BTreeSet<String>>,
}

impl BeliefModel {
    /// Creates an empty model at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a model at version 0 from the given entries.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (SubsystemId, Descriptor)>) -> Self {
        Self {
            version: 0,
            entries: entries.into_iter().collect(),
            capabilities: None,
        }
    }

    /// Declares the capability set the target is expected to expose.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.capabilities = Some(capabilities.into_iter().map(Into::into).collect());
        self
    }

    /// The declared capability set. `None` means capabilities are not tracked.
    #[must_use]
    pub const fn capabilities(&self) -> Option<&BTreeSet<String>> {
        self.capabilities.as_ref()
    }

    /// Model version. Incremented by every reconciliation that changes an entry.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Expected descriptor for a subsystem.
    #[must_use]
    pub fn get(&self, id: &SubsystemId) -> Option<&Descriptor> {
        self.entries.get(id)
    }

    /// Number of subsystems with an expectation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the model holds no expectations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in subsystem order.
    pub fn iter(&self) -> impl Iterator<Item = (&SubsystemId, &Descriptor)> {
        self.entries.iter()
    }

    /// Borrow the underlying ordered map.
    #[must_use]
    pub const fn entries(&self) -> &BTreeMap<SubsystemId, Descriptor> {
        &self.entries
    }

    /// Applies updates and returns how many entries actually changed.
    ///
    /// Updates only insert or overwrite. The version is bumped once if anything
    /// changed.
    pub(crate) fn apply(&mut self, updates: &[BeliefUpdate]) -> usize {
        let mut changed = 0usize;
        for update in updates {
            let differs = self
                .entries
                .get(&update.subsystem)
                .map_or(true, |current| current != &update.descriptor);
            if differs {
                self.entries.insert(update.subsystem.clone(), update.descriptor.clone());
                changed += 1;
            }
        }
        if changed > 0 {
            self.version = self.version.saturating_add(1);
        }
        changed
    }
}
