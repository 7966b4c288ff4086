//! In-memory storage backend.
//!
//! Thread-safe in-memory implementation of `BeliefStore`. It is intended for
//! embedded usage, tests, and as a reference implementation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use crate::belief::BeliefModel;
use crate::storage::traits::{BeliefStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory belief store.
#[derive(Debug, Default)]
pub struct InMemoryBeliefStore {
    state: RwLock<BeliefModel>,
    saves: AtomicU64,
    fail_saves: AtomicBool,
}

impl InMemoryBeliefStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `model`.
    #[must_use]
    pub fn with_model(model: BeliefModel) -> Self {
        Self {
            state: RwLock::new(model),
            ..Self::default()
        }
    }

    /// Number of successful saves so far.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Make subsequent saves fail with a backend error (fault injection).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }
}

impl BeliefStore for InMemoryBeliefStore {
    fn load(&self) -> Result<BeliefModel, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("belief.load"))?;
        Ok(state.clone())
    }

    fn save(&self, model: &BeliefModel) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(StorageError::BackendError("save rejected".to_string()));
        }

        let mut state = self.state.write().map_err(|_| lock_err("belief.save"))?;
        if model.version() < state.version() {
            return Err(StorageError::VersionConflict {
                stored: state.version(),
                attempted: model.version(),
            });
        }
        *state = model.clone();
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
