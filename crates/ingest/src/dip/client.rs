//! DIP API HTTP client
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic; the sync resource
//! moves calls onto a blocking thread.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;

use super::DipEndpoint;
use super::api::DocumentList;
use crate::config::ApiSettings;

/// Non-success response from the DIP API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DipApiError {
    #[error("API key rejected by {endpoint} (status {status})")]
    Unauthorized { endpoint: &'static str, status: u16 },

    #[error("{endpoint} request failed with status {status}")]
    Status { endpoint: &'static str, status: u16 },
}

impl DipApiError {
    fn from_status(endpoint: DipEndpoint, status: u16) -> Self {
        match status {
            401 | 403 => DipApiError::Unauthorized {
                endpoint: endpoint.path(),
                status,
            },
            _ => DipApiError::Status {
                endpoint: endpoint.path(),
                status,
            },
        }
    }
}

/// DIP API client for listing documents
#[derive(Debug, Clone)]
pub struct DipClient {
    base_url: String,
    api_key: String,
}

impl DipClient {
    pub fn new(settings: &ApiSettings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the URL for one page of an endpoint
    ///
    /// # Arguments
    /// * `cursor` - Cursor returned by the previous page
    /// * `since` - Only list documents updated at or after this time
    pub fn list_url(
        &self,
        endpoint: DipEndpoint,
        cursor: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, endpoint.path()))
            .with_context(|| format!("Invalid DIP base URL: {}", self.base_url))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("format", "json");
            if let Some(since) = since {
                query.append_pair(
                    "f.aktualisiert.start",
                    &since.to_rfc3339_opts(SecondsFormat::Secs, true),
                );
            }
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }

        Ok(url)
    }

    /// Fetch one page of documents
    pub fn list_documents(
        &self,
        endpoint: DipEndpoint,
        cursor: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<DocumentList> {
        let url = self.list_url(endpoint, cursor, since)?;

        let response = ureq::get(url.as_str())
            .header("Authorization", &format!("ApiKey {}", self.api_key))
            .header("Accept", "application/json")
            .call();

        let mut response = match response {
            Ok(response) => response,
            Err(ureq::Error::StatusCode(status)) => {
                return Err(DipApiError::from_status(endpoint, status).into());
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to send {} list request", endpoint.path())));
            }
        };

        let list: DocumentList = response
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse {} list response", endpoint.path()))?;

        Ok(list)
    }
}
