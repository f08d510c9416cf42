//! End-to-end ingest pipeline: sitemap → discovery → crawl → stored documents.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument};
use url::Url;

use askdocs_crawler::{CrawlReport, Crawler};
use askdocs_discovery::DiscoveryOptions;
use askdocs_markdown::{RenderOptions, TextRenderer};
use askdocs_shared::{AppConfig, AskDocsError, CrawlConfig, Result};
use askdocs_storage::Storage;

/// Configuration for [`ingest_site`].
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Sitemap listing the pages to ingest.
    pub sitemap_url: Url,
    /// Process only the first `limit` sitemap entries.
    pub limit: Option<usize>,
    pub crawl: CrawlConfig,
    pub render: RenderOptions,
}

impl IngestConfig {
    /// Build from the app config, using its default sitemap.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let sitemap_url = Url::parse(&config.defaults.sitemap_url).map_err(|e| {
            AskDocsError::config(format!(
                "invalid sitemap URL '{}': {e}",
                config.defaults.sitemap_url
            ))
        })?;

        Ok(Self {
            sitemap_url,
            limit: None,
            crawl: CrawlConfig::from(config),
            render: RenderOptions::from(config),
        })
    }
}

/// Result of the ingest pipeline.
#[derive(Debug)]
pub struct IngestResult {
    /// URLs selected from the sitemap.
    pub discovered: usize,
    pub report: CrawlReport,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, result: &IngestResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _result: &IngestResult) {}
}

/// Run the ingest pipeline.
///
/// 1. Discovery: fetch the sitemap and select page URLs
/// 2. Crawl: fetch, render and upsert every selected page
#[instrument(skip_all, fields(sitemap = %config.sitemap_url, limit = ?config.limit))]
pub async fn ingest_site(
    config: &IngestConfig,
    storage: Arc<Storage>,
    progress: &dyn ProgressReporter,
) -> Result<IngestResult> {
    let start = Instant::now();

    // Fail on a bad selector before any network traffic.
    let renderer = TextRenderer::new(config.render.clone())?;

    // --- Phase 1: Discovery ---
    progress.phase("Reading sitemap");
    let opts = DiscoveryOptions {
        timeout_secs: config.crawl.request_timeout.as_secs(),
        limit: config.limit,
    };
    let urls = askdocs_discovery::discover_urls(&config.sitemap_url, &opts).await?;
    let discovered = urls.len();

    // --- Phase 2: Crawl ---
    progress.phase(&format!("Crawling {discovered} pages"));
    let crawler = Crawler::new(config.crawl.clone(), renderer)?;
    let report = crawler.crawl(urls, storage).await?;

    let result = IngestResult {
        discovered,
        report,
        elapsed: start.elapsed(),
    };
    progress.done(&result);

    info!(
        discovered,
        stored = result.report.inserted + result.report.updated,
        errors = result.report.errors.len(),
        elapsed_ms = result.elapsed.as_millis(),
        "ingest pipeline complete"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_storage;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount(server: &MockServer, route: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    fn config_for(server: &MockServer, limit: Option<usize>) -> IngestConfig {
        let mut app = AppConfig::default();
        app.defaults.sitemap_url = format!("{}/sitemap.xml", server.uri());
        app.renderer.site_origin = server.uri();
        let mut config = IngestConfig::from_app_config(&app).unwrap();
        config.limit = limit;
        config
    }

    async fn site(server: &MockServer) {
        let base = server.uri();
        let sitemap = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"><url><loc>{base}/intro</loc></url><url><loc>{base}/queries</loc></url><url><loc>{base}/blank</loc></url></urlset>"#
        );
        mount(server, "/sitemap.xml", sitemap).await;
        mount(
            server,
            "/intro",
            r#"<html><body><div class="markdown"><h1>Intro</h1><p>See <a href="/queries">queries</a>.</p></div></body></html>"#.into(),
        )
        .await;
        mount(
            server,
            "/queries",
            r#"<html><body><div class="markdown"><h2>Queries</h2><pre><code><span>query({})</span></code></pre></div></body></html>"#.into(),
        )
        .await;
        mount(server, "/blank", "<html><body></body></html>".into()).await;
    }

    #[tokio::test]
    async fn test_ingest_site_end_to_end() {
        let server = MockServer::start().await;
        site(&server).await;
        let storage = temp_storage().await;

        let result = ingest_site(&config_for(&server, None), storage.clone(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.discovered, 3);
        assert_eq!(result.report.inserted, 2);
        assert_eq!(result.report.skipped_empty, 1);
        assert!(result.report.errors.is_empty());

        let intro = storage
            .get_document_by_url(&format!("{}/intro", server.uri()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            intro.text,
            format!("# Intro\n\nSee  [queries]({}/queries) .", server.uri())
        );
    }

    #[tokio::test]
    async fn test_ingest_respects_limit() {
        let server = MockServer::start().await;
        site(&server).await;
        let storage = temp_storage().await;

        let result = ingest_site(&config_for(&server, Some(1)), storage.clone(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.discovered, 1);
        assert_eq!(result.report.total(), 1);
        assert_eq!(storage.count_documents().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_selector_fails_before_fetch() {
        let server = MockServer::start().await;
        let mut config = config_for(&server, None);
        config.render.content_selector = "[[".into();

        let storage = temp_storage().await;
        let err = ingest_site(&config, storage.clone(), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, AskDocsError::Config { .. }));
    }
}
