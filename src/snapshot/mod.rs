//! Table snapshots
//!
//! Row fingerprinting, the snapshot-diff change detector and snapshot
//! persistence.

pub mod codec;
pub mod detector;
pub mod hash;
pub mod pg_store;
pub mod store;

pub use detector::{ChangeDetector, PassSummary, PRIMARY_KEY_ALIAS};
pub use hash::row_hash;
pub use pg_store::{PostgresSnapshotStore, DEFAULT_STORE_TABLE};
pub use store::{MemorySnapshotStore, SnapshotStore};
