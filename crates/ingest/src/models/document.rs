//! Generic DIP document

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document as returned by any DIP list endpoint
///
/// Only the fields the sync engine relies on are typed. Everything else is
/// carried verbatim so that it can be stored without a per-entity mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier (unique per endpoint)
    pub id: String,
    /// Last modification time reported by the API
    pub aktualisiert: DateTime<Utc>,
    /// Remaining fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, aktualisiert: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            aktualisiert,
            fields: Map::new(),
        }
    }

    /// Set an untyped field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Get a string field if present
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_keeps_extra_fields() {
        let json = r#"{
            "id": "12345",
            "aktualisiert": "2023-11-08T10:15:00+01:00",
            "titel": "Gesetz zur Änderung",
            "wahlperiode": 20
        }"#;

        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.id, "12345");
        assert_eq!(doc.aktualisiert.to_rfc3339(), "2023-11-08T09:15:00+00:00");
        assert_eq!(doc.field_str("titel"), Some("Gesetz zur Änderung"));
        assert_eq!(doc.fields["wahlperiode"], 20);
    }

    #[test]
    fn test_missing_aktualisiert_is_error() {
        let json = r#"{ "id": "1", "titel": "x" }"#;
        assert!(serde_json::from_str::<Document>(json).is_err());
    }
}
