//! Rollback & Recovery (C8): pre-change snapshots, rollback validation,
//! corrupt-document recovery, and crash/orphan reconciliation.

mod recovery;
mod snapshot;

pub use recovery::{reconcile_checkpoint, recover_corrupt_state, resolve_orphan, OrphanDisposition, RecoveryReport};
pub use snapshot::{snapshot, validate, Snapshot, SnapshotEntry};
