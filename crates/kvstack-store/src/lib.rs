//! Log-structured, segmented key-value store.
//!
//! Records are appended to numbered segment files (`current-data<N>`); a
//! per-segment in-memory index maps each key to the byte offset of its most
//! recent record in that segment. Exactly one segment is active and
//! receives writes; once a segment outgrows the configured size it is
//! frozen and a fresh active segment takes over. A background merge
//! periodically collapses the frozen prefix of the chain into a single
//! segment holding only the newest value per key.
//!
//! ## Concurrency
//!
//! Single writer, many readers. All writes and chain mutations run under
//! one store-level write lock; reads take the shared lock only long enough
//! to locate the segment and open its file. Frozen segments are immutable,
//! so the merge task works from a snapshot and publishes its result with a
//! single locked swap.

mod merge;
mod segment;
mod store;

pub use kvstack_core::{Error, Record, Result};
pub use store::Store;
