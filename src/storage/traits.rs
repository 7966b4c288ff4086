//! Abstract storage traits for vantage.
//!
//! Belief persistence is an external collaborator. These traits define the
//! contract a backend must implement; the crate ships an in-memory backend for
//! embedded use and tests.

use thiserror::Error;

use crate::belief::BeliefModel;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// A concurrent writer saved a newer model first.
    #[error("Version conflict: stored={stored} attempted={attempted}")]
    VersionConflict {
        /// Version currently stored.
        stored: u64,
        /// Version the caller tried to save.
        attempted: u64,
    },
}

/// Storage trait for the belief model.
///
/// # Safety Considerations
/// - `save` must replace the stored model atomically
/// - Implementations should handle concurrent access safely
pub trait BeliefStore: Send + Sync {
    /// Load the current model. An empty store yields an empty model at version 0.
    fn load(&self) -> Result<BeliefModel, StorageError>;

    /// Replace the stored model.
    ///
    /// # Errors
    /// - `VersionConflict`: if `model.version()` is lower than the stored version
    fn save(&self, model: &BeliefModel) -> Result<(), StorageError>;
}
