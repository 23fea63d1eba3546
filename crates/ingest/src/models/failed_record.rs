//! Failed record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An item whose store attempt failed for a transient reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRecord {
    /// Identifier of the item in the remote API
    pub id: String,
    /// "<operation>: <error>"
    pub reason: String,
    /// When the failure was observed
    pub timestamp: DateTime<Utc>,
}

impl FailedRecord {
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}
