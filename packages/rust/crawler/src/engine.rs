//! Bounded-concurrency crawl engine.
//!
//! Every sitemap URL becomes one independent fetch → render → upsert unit.
//! Units run behind a semaphore; a failed unit is logged and recorded in the
//! report without touching its siblings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use askdocs_markdown::TextRenderer;
use askdocs_shared::{AskDocsError, CrawlConfig, Result};
use askdocs_storage::{Storage, UpsertOutcome};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("AskDocs/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects followed per page.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// CrawlReport
// ---------------------------------------------------------------------------

/// Summary of a completed crawl. Every dispatched URL lands in exactly one
/// bucket.
#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    /// Pages stored for the first time.
    pub inserted: usize,
    /// Pages whose stored text was replaced.
    pub updated: usize,
    /// Pages whose text matched what was already stored.
    pub unchanged: usize,
    /// Pages that rendered to an empty string and were not stored.
    pub skipped_empty: usize,
    /// Failed units as (URL, error message).
    pub errors: Vec<(String, String)>,
    /// Wall-clock duration of the crawl.
    pub duration: Duration,
}

impl CrawlReport {
    /// Number of units accounted for.
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged + self.skipped_empty + self.errors.len()
    }

    fn record(&mut self, url: String, outcome: Result<UnitOutcome>) {
        match outcome {
            Ok(UnitOutcome::Stored(UpsertOutcome::Inserted)) => self.inserted += 1,
            Ok(UnitOutcome::Stored(UpsertOutcome::Updated)) => self.updated += 1,
            Ok(UnitOutcome::Stored(UpsertOutcome::Unchanged)) => self.unchanged += 1,
            Ok(UnitOutcome::SkippedEmpty) => self.skipped_empty += 1,
            Err(e) => {
                warn!(%url, error = %e, "page failed");
                self.errors.push((url, e.to_string()));
            }
        }
    }
}

/// What one crawl unit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitOutcome {
    Stored(UpsertOutcome),
    SkippedEmpty,
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Fetches pages, renders them to text, and upserts them into storage.
pub struct Crawler {
    config: CrawlConfig,
    client: Client,
    renderer: Arc<TextRenderer>,
}

impl Crawler {
    /// Create a new crawler with the given configuration and renderer.
    pub fn new(config: CrawlConfig, renderer: TextRenderer) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AskDocsError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            renderer: Arc::new(renderer),
        })
    }

    /// Crawl every URL in `urls`, storing rendered pages in `storage`.
    ///
    /// Returns once every unit has settled. Per-page failures are reported,
    /// not propagated.
    #[instrument(skip_all, fields(pages = urls.len(), concurrency = self.config.concurrency))]
    pub async fn crawl(&self, urls: Vec<String>, storage: Arc<Storage>) -> Result<CrawlReport> {
        let start_time = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1) as usize));

        info!("starting crawl");

        let mut handles = Vec::with_capacity(urls.len());
        for url in urls {
            let client = self.client.clone();
            let renderer = self.renderer.clone();
            let storage = storage.clone();
            let sem = semaphore.clone();
            let task_url = url.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| AskDocsError::validation(format!("crawl semaphore closed: {e}")))?;
                process_page(&client, &renderer, &storage, &task_url).await
            });
            handles.push((url, handle));
        }

        let mut report = CrawlReport::default();
        for (url, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(AskDocsError::validation(format!("crawl task panicked: {e}"))),
            };
            report.record(url, outcome);
        }
        report.duration = start_time.elapsed();

        info!(
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped_empty = report.skipped_empty,
            errors = report.errors.len(),
            duration_ms = report.duration.as_millis(),
            "crawl completed"
        );

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Page processing
// ---------------------------------------------------------------------------

/// Fetch, render, and store a single page.
async fn process_page(
    client: &Client,
    renderer: &TextRenderer,
    storage: &Storage,
    url: &str,
) -> Result<UnitOutcome> {
    let body = fetch_page(client, url).await?;

    // The parsed tree is not Send; it lives and dies inside render_page.
    let text = renderer.render_page(&body)?;
    if text.is_empty() {
        debug!(%url, "rendered text is empty, skipping");
        return Ok(UnitOutcome::SkippedEmpty);
    }

    let outcome = storage.upsert_document(url, &text).await?;
    Ok(UnitOutcome::Stored(outcome))
}

/// Fetch a page body. Non-2xx responses are errors.
async fn fetch_page(client: &Client, url: &str) -> Result<String> {
    debug!(%url, "fetching page");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AskDocsError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AskDocsError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| AskDocsError::Network(format!("{url}: body read failed: {e}")))
}
