//! # Vantage - Multi-Perspective Reality Reconciliation
//!
//! Vantage observes a running target system from several independent
//! perspectives at once, compares the merged view with a declared belief
//! model, and closes or confirms each divergence with small primitives.
//!
//! ## Core Concepts
//!
//! - **BeliefModel**: versioned map of how each subsystem is supposed to look
//! - **RealitySnapshot**: merged observation of how it actually looks
//! - **Gap**: one divergence between the two, with a severity
//! - **CapabilityGap**: a capability gained or lost against the declared set
//! - **Primitive**: a probe or corrective action derived from one gap
//! - **Operation**: one pass of the five-phase pipeline, streamed as events
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vantage::{
//!     ExecutionMode, InMemoryBeliefStore, InMemoryTarget, OperationController, OperationRequest,
//!     VantageConfig,
//! };
//!
//! let target = Arc::new(InMemoryTarget::new());
//! let controller = OperationController::from_config(
//!     target.clone(),
//!     target,
//!     Arc::new(InMemoryBeliefStore::new()),
//!     &VantageConfig::default(),
//! )?;
//!
//! let (handle, stream) = controller.submit(OperationRequest::new(ExecutionMode::Silent))?;
//! for event in stream {
//!     println!("{:?}", event.event_type);
//! }
//! println!("{}", handle.status());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod belief;
pub mod cancel;
pub mod descriptor;
pub mod error;
pub mod fingerprint;

// Collaborators
pub mod storage;
pub mod target;

// Pipeline
pub mod config;
pub mod fabricator;
pub mod operation;
pub mod reality;

// Re-export primary types at crate root for convenience
pub use belief::{BeliefLedger, BeliefModel, BeliefUpdate, ReconcileCommit, SubsystemId};
pub use cancel::{CancelSignal, CancelSource};
pub use config::VantageConfig;
pub use descriptor::{Descriptor, DescriptorDistance, StructuralDistance};
pub use error::{ExecutionError, ValidationError, VantageError, VantageResult};
pub use fabricator::{
    Fabrication, FabricationWarning, Fabricator, FabricatorConfig, Primitive, PrimitiveAction, PrimitiveId,
    Strategy, StrategyRule,
};
pub use fingerprint::Fingerprint;
pub use operation::{
    ControllerConfig, Event, EventPayload, EventType, Evidence, ExecutionMode, GapResolution, Operation,
    OperationController, OperationHandle, OperationId, OperationRequest, OperationStatus, OperationStream,
    OperationSummary, Phase,
};
pub use reality::{
    find_capability_gaps, find_gaps, CapabilityChange, CapabilityGap, Gap, GapKind, MergeRule, Observation,
    ObservationStatus, ObserverConfig, RealityObserver, RealitySnapshot, Severity,
};
pub use storage::{BeliefStore, InMemoryBeliefStore, StorageError};
pub use target::{
    CapabilitySnapshot, InMemoryTarget, Perspective, PrimitiveExecutor, PrimitiveOutcome, StateProvider,
    StateReading, StateSnapshot, TargetError,
};
