//! Pagination types exchanged between the engine and a resource

use chrono::{DateTime, Utc};

/// Parameters for fetching one page from a resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Opaque pagination token from the previous batch (None = first page)
    pub cursor: Option<String>,
    /// Resume watermark; the resource should only return items at or after it
    pub since: Option<DateTime<Utc>>,
}

impl PageRequest {
    pub fn first(since: Option<DateTime<Utc>>) -> Self {
        Self { cursor: None, since }
    }

    /// Request the page following `cursor`, keeping the same watermark
    pub fn next(&self, cursor: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor.into()),
            since: self.since,
        }
    }
}

/// One page of results from a resource
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    /// Items in the order returned by the remote side
    pub items: Vec<T>,
    /// Cursor for the next page (empty = no more pages)
    pub next_cursor: String,
    /// Total number of items the remote side reports as available
    pub total_available: usize,
}

impl<T> Batch<T> {
    pub fn new(items: Vec<T>, next_cursor: impl Into<String>, total_available: usize) -> Self {
        Self {
            items,
            next_cursor: next_cursor.into(),
            total_available,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_next(&self) -> bool {
        !self.next_cursor.is_empty()
    }
}
