//! Domain models for sync state and synced items

mod batch;
mod checkpoint;
mod document;
mod failed_record;

pub use batch::{Batch, PageRequest};
pub use checkpoint::Checkpoint;
pub use document::Document;
pub use failed_record::FailedRecord;
