//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::Document;

/// Trait for document storage operations
///
/// Documents are keyed by (resource, id). Upserts must be idempotent: the
/// sync engine delivers boundary items at least once after a resume.
pub trait DocumentStore: Send + Sync {
    /// Insert or update a document
    fn upsert_document(&self, resource: &str, document: &Document) -> Result<(), StoreError>;

    /// Get a document by ID
    fn get_document(&self, resource: &str, id: &str) -> Result<Option<Document>>;

    /// Latest `aktualisiert` timestamp stored for a resource
    fn latest_updated(&self, resource: &str) -> Result<Option<DateTime<Utc>>>;

    /// Count documents stored for a resource
    fn count_documents(&self, resource: &str) -> Result<usize>;
}
