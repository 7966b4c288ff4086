//! Reality observation and gap analysis.
//!
//! The observer runs N concurrent perspective reads against a `StateProvider`,
//! merges them into one `RealitySnapshot`, and compares it with the belief
//! model to produce ordered `Gap`s.

/// Gap types and analysis.
pub mod gaps;
/// Per-perspective observations.
pub mod observation;
/// Concurrent observation rounds.
pub mod observer;
/// Merged snapshots.
pub mod snapshot;

pub use gaps::{find_capability_gaps, find_gaps, CapabilityChange, CapabilityGap, Gap, GapKind, Severity};
pub use observation::{Observation, ObservationStatus};
pub use observer::{ObserverConfig, RealityObserver};
pub use snapshot::{MergeRule, RealitySnapshot};
