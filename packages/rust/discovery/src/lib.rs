//! Sitemap discovery.
//!
//! Before crawling, AskDocs fetches the site's `sitemap.xml` and collects the
//! page URLs it lists. Every listed page becomes one independent crawl unit.

mod parser;

use std::time::Duration;

use askdocs_shared::{AskDocsError, Result};
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

/// Maximum number of redirects to follow when fetching the sitemap.
const MAX_REDIRECTS: usize = 3;

/// Default timeout in seconds for fetching the sitemap.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum response size we consider valid (50 MB, the sitemap protocol limit).
const MAX_RESPONSE_SIZE: u64 = 50 * 1024 * 1024;

/// User-Agent string for discovery requests.
const USER_AGENT: &str = concat!("AskDocs/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Discovery options
// ---------------------------------------------------------------------------

/// Configuration for the discovery process.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
    /// Keep only the first `limit` URLs, in sitemap order. `None` keeps all.
    pub limit: Option<usize>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            limit: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Fetch a sitemap and return the page URLs it lists, in document order,
/// truncated to `opts.limit`.
#[instrument(skip_all, fields(sitemap = %sitemap_url))]
pub async fn discover_urls(sitemap_url: &Url, opts: &DiscoveryOptions) -> Result<Vec<String>> {
    info!(limit = ?opts.limit, "fetching sitemap");

    let client = build_client(opts)?;
    let xml = fetch_sitemap(&client, sitemap_url.as_str()).await?;

    let mut urls = parser::parse_sitemap(&xml);
    let found = urls.len();
    if let Some(limit) = opts.limit {
        urls.truncate(limit);
    }

    info!(found, selected = urls.len(), "sitemap parsed");
    Ok(urls)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with appropriate settings.
fn build_client(opts: &DiscoveryOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| AskDocsError::Network(format!("failed to build HTTP client: {e}")))
}

/// Fetch the sitemap body as text.
async fn fetch_sitemap(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AskDocsError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AskDocsError::Network(format!("{url}: HTTP {status}")));
    }

    // Check content-length if available
    if let Some(len) = response.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(AskDocsError::validation(format!(
                "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
            )));
        }
    }

    let body = response
        .text()
        .await
        .map_err(|e| AskDocsError::Network(format!("{url}: failed to read body: {e}")))?;

    debug!(bytes = body.len(), "sitemap fetched");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sitemap_with(paths: &[&str], base: &str) -> String {
        let entries: String = paths
            .iter()
            .map(|p| format!("<url><loc>{base}{p}</loc></url>"))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{entries}</urlset>"#
        )
    }

    #[tokio::test]
    async fn test_discover_with_mock_server() {
        let server = wiremock::MockServer::start().await;
        let body = sitemap_with(&["/a", "/b", "/c"], &server.uri());

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/sitemap.xml"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/sitemap.xml", server.uri())).unwrap();
        let urls = discover_urls(&url, &DiscoveryOptions::default()).await.unwrap();

        assert_eq!(
            urls,
            vec![
                format!("{}/a", server.uri()),
                format!("{}/b", server.uri()),
                format!("{}/c", server.uri()),
            ]
        );
    }

    #[tokio::test]
    async fn test_discover_respects_limit() {
        let server = wiremock::MockServer::start().await;
        let body = sitemap_with(&["/one", "/two", "/three", "/four"], &server.uri());

        wiremock::Mock::given(wiremock::matchers::path("/sitemap.xml"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/sitemap.xml", server.uri())).unwrap();
        let opts = DiscoveryOptions {
            limit: Some(2),
            ..DiscoveryOptions::default()
        };
        let urls = discover_urls(&url, &opts).await.unwrap();

        assert_eq!(
            urls,
            vec![format!("{}/one", server.uri()), format!("{}/two", server.uri())]
        );
    }

    #[tokio::test]
    async fn test_discover_limit_larger_than_sitemap() {
        let server = wiremock::MockServer::start().await;
        let body = sitemap_with(&["/only"], &server.uri());

        wiremock::Mock::given(wiremock::matchers::path("/sitemap.xml"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/sitemap.xml", server.uri())).unwrap();
        let opts = DiscoveryOptions {
            limit: Some(10),
            ..DiscoveryOptions::default()
        };
        assert_eq!(discover_urls(&url, &opts).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_discover_http_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/sitemap.xml"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/sitemap.xml", server.uri())).unwrap();
        let err = discover_urls(&url, &DiscoveryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AskDocsError::Network(_)));
    }
}
