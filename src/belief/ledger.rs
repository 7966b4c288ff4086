//! Process-wide belief ledger.
//!
//! Wraps a `BeliefStore` and serializes reconciliation writes so concurrent
//! operations queue instead of interleaving load/save cycles.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::storage::{BeliefStore, StorageError};

use super::{BeliefModel, BeliefUpdate};

/// Result of one committed reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileCommit {
    /// The model as saved.
    pub model: BeliefModel,
    /// Number of entries that changed.
    pub changed: usize,
}

/// Shared, write-serialized access to the belief model.
pub struct BeliefLedger {
    store: Arc<dyn BeliefStore>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for BeliefLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeliefLedger").finish_non_exhaustive()
    }
}

impl BeliefLedger {
    /// Creates a ledger over the given store.
    pub fn new(store: Arc<dyn BeliefStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Reads a stable copy of the current model. Does not take the write lock.
    pub fn snapshot(&self) -> Result<BeliefModel, StorageError> {
        self.store.load()
    }

    /// Folds `updates` into the latest stored model and saves it.
    ///
    /// The model is re-loaded under the write lock so updates from operations
    /// that committed since this operation's snapshot are preserved. Nothing
    /// is saved when no entry changes.
    pub fn reconcile(&self, updates: &[BeliefUpdate]) -> Result<ReconcileCommit, StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::BackendError("poisoned lock: belief ledger".to_string()))?;

        let mut model = self.store.load()?;
        let changed = model.apply(updates);
        if changed > 0 {
            self.store.save(&model)?;
        }
        debug!(changed, version = model.version(), "belief ledger reconciled");

        Ok(ReconcileCommit { model, changed })
    }
}
