//! # Date Catalog
//!
//! Dates the stream can be filtered by, as listed by the server.

use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::error::TailResult;

/// Dates offered by the server, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateCatalog {
    dates: Vec<String>,
}

impl DateCatalog {
    /// Wraps an already fetched listing.
    #[must_use]
    pub fn new(dates: Vec<String>) -> Self {
        Self { dates }
    }

    /// Catalog with no dates.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Listed dates.
    #[must_use]
    pub fn dates(&self) -> &[String] {
        &self.dates
    }

    /// Whether `date` is listed.
    #[must_use]
    pub fn contains(&self, date: &str) -> bool {
        self.dates.iter().any(|d| d == date)
    }

    /// Whether the listing is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Fetches the listing: one GET returning a JSON array of strings.
    ///
    /// # Errors
    /// Returns an error on network failure, a non-success status, or a body
    /// that is not a JSON string array.
    pub async fn fetch(client: &Client, url: Url, auth_token: Option<&str>) -> TailResult<Self> {
        let mut request = client.get(url.clone());
        if let Some(token) = auth_token.filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let dates: Vec<String> = request.send().await?.error_for_status()?.json().await?;
        debug!(%url, count = dates.len(), "fetched date catalog");
        Ok(Self::new(dates))
    }

    /// Like [`fetch`](Self::fetch), but logs failures and falls back to an
    /// empty catalog.
    pub async fn fetch_or_empty(client: &Client, url: Url, auth_token: Option<&str>) -> Self {
        match Self::fetch(client, url.clone(), auth_token).await {
            Ok(catalog) => catalog,
            Err(err) => {
                warn!(%url, error = %err, "failed to fetch dates");
                Self::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_exact_matches_only() {
        let catalog = DateCatalog::new(vec!["2024-05-01".into(), "2024-05-02".into()]);
        assert!(catalog.contains("2024-05-02"));
        assert!(!catalog.contains("2024-05"));
        assert!(!catalog.is_empty());
        assert!(DateCatalog::empty().is_empty());
    }

    #[tokio::test]
    async fn unreachable_listing_yields_empty_catalog() {
        let client = Client::new();
        // Nothing listens on the discard port.
        let url = Url::parse("http://127.0.0.1:9/dates").unwrap();
        let catalog = DateCatalog::fetch_or_empty(&client, url, None).await;
        assert!(catalog.is_empty());
    }
}
