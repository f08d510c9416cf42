//! HTML-to-text rendering for documentation pages.
//!
//! Walks a parsed page tree depth-first and emits a Markdown-like string that
//! keeps the formatting a retrieval index cares about: headings, links, inline
//! code and fenced code blocks. Only the main content container is rendered;
//! site chrome outside it is discarded.

mod cleanup;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, trace};

use askdocs_shared::{AppConfig, AskDocsError, Result};

static SPAN_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span").expect("span selector"));

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Site-specific knobs for the renderer.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Origin prepended to root-relative `href`s, e.g. `https://docs.convex.dev`.
    pub site_origin: String,
    /// CSS selector of the main content container.
    pub content_selector: String,
    /// Anchors carrying this class are heading self-links and are dropped.
    pub self_link_class: String,
}

impl From<&AppConfig> for RenderOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            site_origin: config.renderer.site_origin.clone(),
            content_selector: config.renderer.content_selector.clone(),
            self_link_class: config.renderer.self_link_class.clone(),
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Element kinds
// ---------------------------------------------------------------------------

/// Element tags the renderer treats specially. Everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementKind {
    Code,
    Anchor,
    Emphasis,
    /// `h1`..`h5`; `h6` is deliberately not special.
    Heading(usize),
    Other,
}

impl ElementKind {
    fn of(tag: &str) -> Self {
        match tag {
            "code" => Self::Code,
            "a" => Self::Anchor,
            "strong" | "em" => Self::Emphasis,
            "h1" => Self::Heading(1),
            "h2" => Self::Heading(2),
            "h3" => Self::Heading(3),
            "h4" => Self::Heading(4),
            "h5" => Self::Heading(5),
            _ => Self::Other,
        }
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Converts page trees into normalized Markdown-like text.
///
/// Rendering is a pure function of the input: the same HTML always yields the
/// same bytes.
#[derive(Debug)]
pub struct TextRenderer {
    opts: RenderOptions,
    content: Selector,
}

impl TextRenderer {
    /// Build a renderer, validating the content selector up front.
    pub fn new(opts: RenderOptions) -> Result<Self> {
        let content = Selector::parse(&opts.content_selector).map_err(|e| {
            AskDocsError::config(format!(
                "invalid content selector '{}': {e}",
                opts.content_selector
            ))
        })?;
        Ok(Self { opts, content })
    }

    /// Render a full HTML page.
    ///
    /// Every element matching the content selector is rendered in document
    /// order, then runs of blank lines are collapsed and the result trimmed.
    /// An empty string means the page has nothing worth storing.
    pub fn render_page(&self, html: &str) -> Result<String> {
        let doc = Html::parse_document(html);

        let mut raw = String::new();
        for root in doc.select(&self.content) {
            raw.push_str(&self.render_children(root)?);
        }

        let text = cleanup::run_pipeline(&raw);
        debug!(raw_len = raw.len(), text_len = text.len(), "page rendered");
        Ok(text)
    }

    /// Render the children of `parent` in document order and concatenate them.
    pub fn render_children(&self, parent: ElementRef<'_>) -> Result<String> {
        let mut out = String::new();
        for child in parent.children() {
            match child.value() {
                Node::Text(text) => {
                    out.push_str(text.trim());
                    out.push(' ');
                }
                Node::Element(_) => {
                    if let Some(el) = ElementRef::wrap(child) {
                        out.push_str(&self.render_element(el)?);
                    }
                }
                // Comments, doctypes and processing instructions carry no content.
                _ => {}
            }
        }
        Ok(out)
    }

    /// Render a single element according to its tag.
    pub fn render_element(&self, el: ElementRef<'_>) -> Result<String> {
        let tag = el.value().name();
        trace!(tag, "rendering element");

        let rendered = match ElementKind::of(tag) {
            ElementKind::Code if el.select(&SPAN_SEL).next().is_some() => {
                let lines: Vec<String> = el
                    .children()
                    .filter_map(ElementRef::wrap)
                    .map(|line| line.text().collect())
                    .collect();
                format!("```\n{}\n```\n", lines.join("\n"))
            }
            ElementKind::Code => format!(" `{}` ", text_of(el)),
            ElementKind::Anchor => self.render_anchor(el)?,
            ElementKind::Emphasis => format!(" {} ", text_of(el)),
            ElementKind::Heading(level) => {
                format!("{} {}\n\n", "#".repeat(level), text_of(el))
            }
            ElementKind::Other => {
                let mut out = self.render_children(el)?;
                out.push_str("\n\n");
                out
            }
        };
        Ok(rendered)
    }

    fn render_anchor(&self, el: ElementRef<'_>) -> Result<String> {
        if el.value().classes().any(|c| c == self.opts.self_link_class) {
            return Ok(String::new());
        }

        let href = el
            .value()
            .attr("href")
            .ok_or_else(|| AskDocsError::render(format!("anchor without href: {}", el.html())))?;

        let href = if href.starts_with('/') {
            format!("{}{href}", self.opts.site_origin)
        } else {
            href.to_string()
        };

        Ok(format!(" [{}]({href}) ", text_of(el)))
    }
}

/// Full text content of an element, with formatting collapsed.
fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect()
}

/// Render a page with a one-off renderer.
pub fn render_page(html: &str, opts: &RenderOptions) -> Result<String> {
    TextRenderer::new(opts.clone())?.render_page(html)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
