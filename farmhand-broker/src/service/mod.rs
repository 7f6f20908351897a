//! Service layer
//!
//! Services combine the broker's building blocks into the operations callers
//! use: registering and submitting batches, cancelling, and managing the pool
//! catalog.

mod pools;
mod submission;

pub use pools::{NAMESPACE, POOLS_KEY, PRESETS_KEY, PoolCatalog, PoolError, PoolPreset};
pub use submission::{BatchOutcome, SubmissionService};
