//! Page crawler for AskDocs.
//!
//! Turns a list of discovered page URLs into stored documents:
//! - [`engine`]: bounded-concurrency fetch → render → upsert fan-out
//! - [`CrawlReport`]: per-bucket accounting of what each unit did

pub mod engine;

pub use engine::{CrawlReport, Crawler};
