//! Sitemap XML parser.
//!
//! Extracts the `<loc>` of every `<url>` entry of a sitemap
//! (<https://www.sitemaps.org/protocol.html>) in document order:
//!
//! ```xml
//! <urlset>
//!   <url><loc>https://docs.example.com/intro</loc></url>
//! </urlset>
//! ```

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use scraper::{Html, Selector};

/// Matches `<loc>` elements that are direct children of `<url>`.
static URL_LOC_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("url > loc").expect("url > loc selector"));

/// Parse sitemap XML into the list of page URLs it enumerates.
///
/// Entries with an empty `<loc>` are dropped. Nested locations such as
/// `<image:loc>` are not page URLs and are ignored.
pub(crate) fn parse_sitemap(xml: &str) -> Vec<String> {
    let doc = Html::parse_document(&unwrap_cdata(xml));

    doc.select(&URL_LOC_SEL)
        .map(|loc| loc.text().collect::<String>().trim().to_string())
        .filter(|loc| !loc.is_empty())
        .collect()
}

/// Replace `<![CDATA[...]]>` sections with their escaped text.
///
/// The HTML parser reads CDATA outside foreign content as a comment, which
/// would drop the enclosed URL.
fn unwrap_cdata(xml: &str) -> Cow<'_, str> {
    static CDATA_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("valid regex"));

    CDATA_RE.replace_all(xml, |caps: &Captures| {
        caps[1]
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITEMAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://docs.convex.dev/home</loc><changefreq>weekly</changefreq></url>
  <url><loc>https://docs.convex.dev/database</loc></url>
  <url>
    <loc>
      https://docs.convex.dev/functions
    </loc>
  </url>
</urlset>"#;

    #[test]
    fn parse_in_document_order() {
        let urls = parse_sitemap(SITEMAP);
        assert_eq!(
            urls,
            vec![
                "https://docs.convex.dev/home",
                "https://docs.convex.dev/database",
                "https://docs.convex.dev/functions",
            ]
        );
    }

    #[test]
    fn parse_ignores_image_locations() {
        let xml = r#"<urlset xmlns:image="http://www.google.com/schemas/sitemap-image/1.1">
  <url>
    <loc>https://docs.example.com/gallery</loc>
    <image:image><image:loc>https://docs.example.com/a.png</image:loc></image:image>
  </url>
</urlset>"#;
        assert_eq!(parse_sitemap(xml), vec!["https://docs.example.com/gallery"]);
    }

    #[test]
    fn parse_skips_empty_and_orphan_locs() {
        let xml = "<urlset><url><loc></loc></url><loc>https://orphan.example.com</loc></urlset>";
        assert!(parse_sitemap(xml).is_empty());
    }

    #[test]
    fn parse_reads_cdata_locations() {
        let xml = "<urlset><url><loc><![CDATA[https://docs.example.com/a?x=1&y=2]]></loc></url>\
                   <url><loc>https://docs.example.com/b</loc></url>\
                   <url><loc><![CDATA[ https://docs.example.com/c?q=&amp; ]]></loc></url></urlset>";
        assert_eq!(
            parse_sitemap(xml),
            vec![
                "https://docs.example.com/a?x=1&y=2",
                "https://docs.example.com/b",
                "https://docs.example.com/c?q=&amp;",
            ]
        );
    }

    #[test]
    fn parse_empty_document() {
        assert!(parse_sitemap("").is_empty());
    }
}
