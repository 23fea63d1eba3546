//! In-memory storage implementation
//!
//! Used for testing and for dry runs that should not touch a database.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::DocumentStore;
use crate::error::StoreError;
use crate::models::Document;

/// In-memory implementation of DocumentStore
#[derive(Default)]
pub struct InMemoryDocumentStore {
    /// resource -> id -> document
    documents: RwLock<HashMap<String, HashMap<String, Document>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn upsert_document(&self, resource: &str, document: &Document) -> Result<(), StoreError> {
        self.documents
            .write()
            .entry(resource.to_string())
            .or_default()
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    fn get_document(&self, resource: &str, id: &str) -> Result<Option<Document>> {
        Ok(self
            .documents
            .read()
            .get(resource)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn latest_updated(&self, resource: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .documents
            .read()
            .get(resource)
            .and_then(|docs| docs.values().map(|d| d.aktualisiert).max()))
    }

    fn count_documents(&self, resource: &str) -> Result<usize> {
        Ok(self.documents.read().get(resource).map_or(0, HashMap::len))
    }
}
