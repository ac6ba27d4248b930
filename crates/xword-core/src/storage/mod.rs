//! Storage layer
//!
//! Per-game JSON snapshots of the solution, keyed by game id when playing
//! online and by puzzle id when offline.

pub mod error;
pub mod persistence;

pub use error::{StorageError, StorageResult};
pub use persistence::{SaveState, SnapshotStore};
