//! Storage trait definitions for vantage.
//!
//! These traits define the abstract interface for belief persistence.

mod memory;
mod traits;

pub use memory::InMemoryBeliefStore;
pub use traits::{BeliefStore, StorageError};
