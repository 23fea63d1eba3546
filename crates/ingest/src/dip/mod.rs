//! DIP (Dokumentations- und Informationssystem des Bundestages) integration
//!
//! This module provides:
//! - A blocking HTTP client for the cursor-paginated list endpoints
//! - The set of endpoints that can be synced
//! - A [`Resource`](crate::sync::Resource) implementation storing documents
//!   through a [`DocumentStore`](crate::storage::DocumentStore)

mod client;
mod resource;

use std::fmt;
use std::str::FromStr;

pub use client::{DipApiError, DipClient};
pub use resource::DipResource;

/// DIP API response types
pub mod api {
    use serde::Deserialize;

    use crate::models::Document;

    /// Response from any list endpoint
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DocumentList {
        /// Total number of documents matching the query
        pub num_found: usize,
        /// Cursor for the next page; equal to the request cursor on the last page
        #[serde(default)]
        pub cursor: String,
        #[serde(default)]
        pub documents: Vec<Document>,
    }
}

/// A syncable DIP list endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DipEndpoint {
    Aktivitaet,
    Drucksache,
    DrucksacheText,
    Person,
    Plenarprotokoll,
    PlenarprotokollText,
    Vorgang,
    Vorgangsposition,
}

impl DipEndpoint {
    pub const ALL: [DipEndpoint; 8] = [
        DipEndpoint::Person,
        DipEndpoint::Vorgang,
        DipEndpoint::Vorgangsposition,
        DipEndpoint::Aktivitaet,
        DipEndpoint::Drucksache,
        DipEndpoint::DrucksacheText,
        DipEndpoint::Plenarprotokoll,
        DipEndpoint::PlenarprotokollText,
    ];

    /// Path segment below the API base URL
    pub fn path(&self) -> &'static str {
        match self {
            DipEndpoint::Aktivitaet => "aktivitaet",
            DipEndpoint::Drucksache => "drucksache",
            DipEndpoint::DrucksacheText => "drucksache-text",
            DipEndpoint::Person => "person",
            DipEndpoint::Plenarprotokoll => "plenarprotokoll",
            DipEndpoint::PlenarprotokollText => "plenarprotokoll-text",
            DipEndpoint::Vorgang => "vorgang",
            DipEndpoint::Vorgangsposition => "vorgangsposition",
        }
    }

    /// Name used for checkpoint and failed-record files
    pub fn resource_name(&self) -> &'static str {
        match self {
            DipEndpoint::Aktivitaet => "aktivitaeten",
            DipEndpoint::Drucksache => "drucksachen",
            DipEndpoint::DrucksacheText => "drucksache-texte",
            DipEndpoint::Person => "personen",
            DipEndpoint::Plenarprotokoll => "plenarprotokolle",
            DipEndpoint::PlenarprotokollText => "plenarprotokoll-texte",
            DipEndpoint::Vorgang => "vorgaenge",
            DipEndpoint::Vorgangsposition => "vorgangspositionen",
        }
    }
}

impl fmt::Display for DipEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_name())
    }
}

/// Error for an unrecognized endpoint name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown endpoint '{0}'")]
pub struct UnknownEndpoint(pub String);

impl FromStr for DipEndpoint {
    type Err = UnknownEndpoint;

    /// Accepts either the API path or the resource name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        DipEndpoint::ALL
            .into_iter()
            .find(|e| e.path() == s || e.resource_name() == s)
            .ok_or(UnknownEndpoint(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        assert_eq!("vorgang".parse::<DipEndpoint>(), Ok(DipEndpoint::Vorgang));
        assert_eq!("vorgaenge".parse::<DipEndpoint>(), Ok(DipEndpoint::Vorgang));
        assert_eq!(
            "Drucksache-Text".parse::<DipEndpoint>(),
            Ok(DipEndpoint::DrucksacheText)
        );
        assert!("gesetz".parse::<DipEndpoint>().is_err());
    }

    #[test]
    fn test_resource_names_are_unique() {
        let mut names: Vec<_> = DipEndpoint::ALL.iter().map(|e| e.resource_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), DipEndpoint::ALL.len());
    }

    #[test]
    fn test_parse_document_list() {
        let json = r#"{
            "numFound": 2,
            "cursor": "AoE/abc",
            "documents": [
                {"id": "1", "aktualisiert": "2024-01-01T10:00:00+01:00", "titel": "A"},
                {"id": "2", "aktualisiert": "2024-01-02T10:00:00+01:00", "titel": "B"}
            ]
        }"#;

        let list: api::DocumentList = serde_json::from_str(json).unwrap();
        assert_eq!(list.num_found, 2);
        assert_eq!(list.cursor, "AoE/abc");
        assert_eq!(list.documents[1].field_str("titel"), Some("B"));
    }

    #[test]
    fn test_parse_empty_document_list() {
        let list: api::DocumentList = serde_json::from_str(r#"{"numFound": 0}"#).unwrap();
        assert!(list.documents.is_empty());
        assert!(list.cursor.is_empty());
    }
}
