//! Checkpoint model for resumable syncs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable watermark for one resource
///
/// Only one Checkpoint exists per resource name. The resource name is
/// implied by the file the checkpoint is stored in and is not serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Resource this checkpoint belongs to
    #[serde(skip)]
    pub resource_name: String,
    /// Timestamp up to which all items are known to have been synced
    #[serde(rename = "last_sync_date")]
    pub last_watermark: DateTime<Utc>,
    /// When the checkpoint was written
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Create a checkpoint stamped with the current time
    pub fn new(resource_name: impl Into<String>, last_watermark: DateTime<Utc>) -> Self {
        Self {
            resource_name: resource_name.into(),
            last_watermark,
            updated_at: Utc::now(),
        }
    }

    /// Attach the resource name after deserialization
    pub(crate) fn for_resource(mut self, resource_name: impl Into<String>) -> Self {
        self.resource_name = resource_name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_serialized_field_names() {
        let watermark = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let checkpoint = Checkpoint::new("vorgaenge", watermark);

        let json: serde_json::Value = serde_json::to_value(&checkpoint).unwrap();
        assert_eq!(json["last_sync_date"], "2024-03-01T12:00:00Z");
        assert!(json.get("updated_at").is_some());
        assert!(json.get("resource_name").is_none());
    }

    #[test]
    fn test_deserialize_with_offset() {
        let json = r#"{
            "last_sync_date": "2024-03-01T14:00:00+02:00",
            "updated_at": "2024-03-02T08:30:00Z"
        }"#;
        let checkpoint: Checkpoint = serde_json::from_str(json).unwrap();
        let checkpoint = checkpoint.for_resource("drucksachen");

        assert_eq!(checkpoint.resource_name, "drucksachen");
        assert_eq!(
            checkpoint.last_watermark,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
    }
}
