//! Shared types, error model, and configuration for AskDocs.
//!
//! This crate is the foundation depended on by all other AskDocs crates.
//! It provides:
//! - [`AskDocsError`]: the unified error type
//! - Domain records ([`Document`], [`ConversationThread`], [`Message`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AnswerConfig, AppConfig, CrawlConfig, DefaultsConfig, OpenAiConfig, RendererConfig,
    config_dir, config_file_path, database_path, init_config, load_config, load_config_from,
    resolve_api_key, resolve_assistant_id, validate_api_key,
};
pub use error::{AskDocsError, Result};
pub use types::{ConversationThread, Document, Message};
