//! Error types for vantage.
//!
//! All errors in vantage are strongly typed using thiserror.
//! Per-primitive failures are recoverable and surface as stream events;
//! everything else maps onto a terminal operation status.

use thiserror::Error;

use crate::storage::StorageError;
use crate::target::TargetError;

/// Validation errors that occur during input or configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Subsystem id cannot be empty")]
    EmptySubsystemId,

    #[error("Perspective count must be at least 1")]
    ZeroPerspectives,

    #[error("Invalid strategy rule '{pattern}': {reason}")]
    InvalidStrategyRule {
        pattern: String,
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },

    #[error("Operation {id} was already started")]
    OperationAlreadyStarted {
        id: String,
    },
}

/// Execution errors raised while an operation runs.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("All {perspectives} perspectives were unavailable")]
    ObservationUnavailable {
        perspectives: usize,
    },

    #[error("Gap kind '{kind}' on '{subsystem}' is unsupported by strategy '{strategy}'")]
    UnsupportedGapKind {
        subsystem: String,
        kind: String,
        strategy: String,
    },

    #[error("Primitive {primitive_id} failed: {source}")]
    PrimitiveFailed {
        primitive_id: String,
        #[source]
        source: TargetError,
    },

    #[error("Critical primitive {primitive_id} failed: {source}")]
    PrimitiveCriticalFailure {
        primitive_id: String,
        #[source]
        source: TargetError,
    },

    #[error("Belief store error: {0}")]
    BeliefStore(#[from] StorageError),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Failed to spawn worker '{name}': {reason}")]
    Spawn {
        name: String,
        reason: String,
    },
}

impl ExecutionError {
    /// Stable machine-readable name of this error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ObservationUnavailable { .. } => "observation_unavailable",
            Self::UnsupportedGapKind { .. } => "unsupported_gap_kind",
            Self::PrimitiveFailed { .. } => "primitive_failed",
            Self::PrimitiveCriticalFailure { .. } => "primitive_critical_failure",
            Self::BeliefStore(_) => "belief_store_error",
            Self::Cancelled => "cancelled",
            Self::Timeout { .. } => "timeout",
            Self::Disconnected { .. } => "disconnected",
            Self::Spawn { .. } => "spawn",
        }
    }
}

/// Top-level error type for vantage.
#[derive(Debug, Error)]
pub enum VantageError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

}

impl From<StorageError> for VantageError {
    fn from(err: StorageError) -> Self {
        Self::Execution(ExecutionError::BeliefStore(err))
    }
}

impl VantageError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this error means the operation was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Cancelled))
    }

    /// Stable machine-readable name of this error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Execution(e) => e.kind(),
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. }
                    | ExecutionError::ObservationUnavailable { .. }
                    | ExecutionError::PrimitiveCriticalFailure {
                        source: TargetError::Unreachable { .. },
                        ..
                    }
            ),
        }
    }
}

/// Result type alias for vantage operations.
pub type VantageResult<T> = Result<T, VantageError>;
