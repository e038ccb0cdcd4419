//! Marketplace API client
//!
//! Pages through the marketplace's extension listing and hands each page to the
//! caller as one batch.

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::source::{BatchCallback, CatalogSource, FetchError};
use super::{ExtensionItem, ProductContext};

/// Base URL used when none is configured
pub const DEFAULT_BASE_URL: &str = "https://marketplace.example.com/api";

/// Number of extensions requested per page
const DEFAULT_PAGE_SIZE: u32 = 200;

/// One page of the extension listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtensionPage {
    #[serde(default)]
    extensions: Vec<ExtensionItem>,
    /// Whether another page follows this one
    #[serde(default)]
    has_more: bool,
}

/// Client for fetching extensions from the marketplace API
#[derive(Debug, Clone)]
pub struct MarketplaceClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Base URL for the API (allows override for testing)
    base_url: String,
    page_size: u32,
}

impl Default for MarketplaceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketplaceClient {
    /// Creates a new MarketplaceClient against the default marketplace
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a new MarketplaceClient against a custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides how many extensions are requested per page
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn listing_url(&self) -> String {
        format!("{}/extensions", self.base_url.trim_end_matches('/'))
    }

    /// Query string for one page
    ///
    /// The `since` watermark is omitted for a full fetch.
    fn query_params(
        &self,
        product: &ProductContext,
        since: DateTime<Utc>,
        page: u32,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("productVersion", product.version.clone()),
            ("skus", product.skus.join(",")),
        ];
        if since > DateTime::<Utc>::MIN_UTC {
            params.push(("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        params.push(("page", page.to_string()));
        params.push(("pageSize", self.page_size.to_string()));
        params
    }

    /// Fetches a single page of the listing
    async fn fetch_page(
        &self,
        product: &ProductContext,
        since: DateTime<Utc>,
        page: u32,
    ) -> Result<ExtensionPage, FetchError> {
        let response = self
            .http_client
            .get(self.listing_url())
            .query(&self.query_params(product, since, page))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        parse_page(&text)
    }
}

/// Parses a listing page body
fn parse_page(body: &str) -> Result<ExtensionPage, FetchError> {
    Ok(serde_json::from_str(body)?)
}

impl CatalogSource for MarketplaceClient {
    fn fetch<'a>(
        &'a self,
        product: &'a ProductContext,
        since: DateTime<Utc>,
        on_batch: &'a mut BatchCallback<'a>,
    ) -> BoxFuture<'a, Result<(), FetchError>> {
        Box::pin(async move {
            let mut page = 0;
            loop {
                let ExtensionPage {
                    extensions,
                    has_more,
                } = self.fetch_page(product, since, page).await?;
                debug!(page, count = extensions.len(), "fetched marketplace page");

                if extensions.is_empty() || !on_batch(extensions) || !has_more {
                    break;
                }
                page += 1;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn product() -> ProductContext {
        ProductContext::new("17.0", vec!["Community".to_string(), "Pro".to_string()])
    }

    fn param<'a>(params: &'a [(&'static str, String)], name: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn test_parse_page_with_extensions() {
        let body = r#"{
            "extensions": [
                {"extensionId": "one", "title": "One"},
                {"extensionId": "two", "title": "Two", "installer": "https://example.test/two.vsix"}
            ],
            "hasMore": true
        }"#;

        let page = parse_page(body).expect("Should parse");

        assert_eq!(page.extensions.len(), 2);
        assert_eq!(page.extensions[1].installer, "https://example.test/two.vsix");
        assert!(page.has_more);
    }

    #[test]
    fn test_parse_page_defaults_missing_fields() {
        let page = parse_page("{}").expect("Should parse");

        assert!(page.extensions.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn test_parse_page_rejects_malformed_body() {
        let result = parse_page("<html>oops</html>");
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_full_fetch_omits_since() {
        let client = MarketplaceClient::new();
        let params = client.query_params(&product(), DateTime::<Utc>::MIN_UTC, 0);

        assert_eq!(param(&params, "productVersion"), Some("17.0"));
        assert_eq!(param(&params, "skus"), Some("Community,Pro"));
        assert_eq!(param(&params, "page"), Some("0"));
        assert_eq!(param(&params, "pageSize"), Some("200"));
        assert!(param(&params, "since").is_none());
    }

    #[test]
    fn test_incremental_fetch_sends_since() {
        let client = MarketplaceClient::new().with_page_size(50);
        let since = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();

        let params = client.query_params(&product(), since, 3);

        assert_eq!(param(&params, "since"), Some("2026-03-01T12:30:00Z"));
        assert_eq!(param(&params, "page"), Some("3"));
        assert_eq!(param(&params, "pageSize"), Some("50"));
    }

    #[test]
    fn test_listing_url_ignores_trailing_slash() {
        let client = MarketplaceClient::with_base_url("http://localhost:9000/api/");
        assert_eq!(client.base_url(), "http://localhost:9000/api/");
        assert_eq!(client.listing_url(), "http://localhost:9000/api/extensions");
    }

    #[tokio::test]
    async fn test_fetch_unreachable_server_returns_request_error() {
        // Port 9 (discard) on loopback is expected to refuse connections
        let client = MarketplaceClient::with_base_url("http://127.0.0.1:9");
        let mut batches = 0;
        let mut on_batch = |_: Vec<ExtensionItem>| {
            batches += 1;
            true
        };

        let result = client
            .fetch(&product(), DateTime::<Utc>::MIN_UTC, &mut on_batch)
            .await;

        assert!(matches!(result, Err(FetchError::Request(_))));
        assert_eq!(batches, 0);
    }
}
