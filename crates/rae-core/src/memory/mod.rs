//! Memory item lifecycle.
//!
//! Stores items with validation, embedding and deduplication, records
//! accesses, and prunes partitions under a retention policy.

pub mod retention;
pub mod service;

pub use retention::{apply_retention, RetentionPolicy, RetentionReport};
pub use service::{MemoryService, StoreOutcome};
