//! Storage for sync state and synced documents
//!
//! Sync state (checkpoints, failed records) lives in small JSON files so it
//! survives independently of the destination store. Documents go through the
//! [`DocumentStore`] trait, which allows swapping between in-memory and
//! SQLite implementations.

mod checkpoint;
mod failed;
mod memory;
mod sqlite;
mod traits;

pub use checkpoint::{CheckpointStore, CheckpointTracker};
pub use failed::{
    FailedRecordTracker, delete_failed_records, failed_records_path, load_failed_records,
};
pub use memory::InMemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;
pub use traits::DocumentStore;
