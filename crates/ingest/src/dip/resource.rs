//! Sync resource for one DIP endpoint

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::debug;

use super::{DipClient, DipEndpoint};
use crate::error::StoreError;
use crate::models::{Batch, Document, PageRequest};
use crate::storage::DocumentStore;
use crate::sync::Resource;

/// Pulls one DIP endpoint into a [`DocumentStore`]
pub struct DipResource {
    client: Arc<DipClient>,
    endpoint: DipEndpoint,
    store: Arc<dyn DocumentStore>,
}

impl DipResource {
    pub fn new(client: Arc<DipClient>, endpoint: DipEndpoint, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            client,
            endpoint,
            store,
        }
    }

    pub fn endpoint(&self) -> DipEndpoint {
        self.endpoint
    }
}

/// The DIP API signals the last page by echoing the request cursor
fn next_cursor(previous: Option<&str>, returned: String) -> String {
    if previous == Some(returned.as_str()) {
        String::new()
    } else {
        returned
    }
}

impl Resource for DipResource {
    type Raw = Document;
    type Item = Document;

    async fn fetch_batch(&self, request: &PageRequest) -> anyhow::Result<Batch<Document>> {
        let client = Arc::clone(&self.client);
        let endpoint = self.endpoint;
        let cursor = request.cursor.clone();
        let since = request.since;

        let list = {
            let cursor = cursor.clone();
            tokio::task::spawn_blocking(move || {
                client.list_documents(endpoint, cursor.as_deref(), since)
            })
            .await
            .context("DIP request task failed")??
        };

        Ok(Batch::new(
            list.documents,
            next_cursor(cursor.as_deref(), list.cursor),
            list.num_found,
        ))
    }

    fn extract_items(&self, raw: Vec<Document>) -> Vec<Document> {
        raw
    }

    fn store_item(&self, item: &Document) -> Result<(), StoreError> {
        self.store.upsert_document(self.endpoint.resource_name(), item)
    }

    fn item_id(&self, item: &Document) -> String {
        item.id.clone()
    }

    /// Latest `aktualisiert` already in the store, or the item's own date if
    /// the store cannot answer
    fn watermark(&self, item: &Document) -> Option<DateTime<Utc>> {
        match self.store.latest_updated(self.endpoint.resource_name()) {
            Ok(Some(latest)) => Some(latest),
            Ok(None) => Some(item.aktualisiert),
            Err(e) => {
                debug!(
                    "Latest {} date unavailable, using item date: {:#}",
                    self.endpoint, e
                );
                Some(item.aktualisiert)
            }
        }
    }
}
