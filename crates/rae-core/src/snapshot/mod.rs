//! Point-in-time capture and restore of graph partitions.
//!
//! Snapshots are immutable and append-only. A replace restore builds the
//! new partition off to the side, swaps it in under the partition write
//! lock, then persists the pre-restore backup; if that write fails the swap
//! is undone before the error surfaces.

pub mod diff;
pub mod manager;

pub use diff::SnapshotDiff;
pub use manager::{
    RestoreMode, RestoreOptions, RestoreReport, SnapshotManager, SnapshotRequest, SnapshotSummary,
};
