//! Application configuration for AskDocs.
//!
//! User config lives at `~/.askdocs/askdocs.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AskDocsError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "askdocs.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".askdocs";

// ---------------------------------------------------------------------------
// Config structs (matching askdocs.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Page rendering settings.
    #[serde(default)]
    pub renderer: RendererConfig,

    /// OpenAI Assistants settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Answer polling settings.
    #[serde(default)]
    pub answer: AnswerConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the libSQL database file. A leading `~/` is expanded.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Sitemap crawled by `askdocs ingest` when no URL is given.
    #[serde(default = "default_sitemap_url")]
    pub sitemap_url: String,

    /// Maximum number of pages fetched and stored at once.
    #[serde(default = "default_crawl_concurrency")]
    pub crawl_concurrency: u32,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            sitemap_url: default_sitemap_url(),
            crawl_concurrency: default_crawl_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_database_path() -> String {
    "~/.askdocs/askdocs.db".into()
}
fn default_sitemap_url() -> String {
    "https://docs.convex.dev/sitemap.xml".into()
}
fn default_crawl_concurrency() -> u32 {
    8
}
fn default_request_timeout_secs() -> u64 {
    30
}

/// `[renderer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Origin prepended to root-relative link targets.
    #[serde(default = "default_site_origin")]
    pub site_origin: String,

    /// CSS selector of the main content container; everything else is dropped.
    #[serde(default = "default_content_selector")]
    pub content_selector: String,

    /// Class marking heading self-links, which are dropped.
    #[serde(default = "default_self_link_class")]
    pub self_link_class: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            site_origin: default_site_origin(),
            content_selector: default_content_selector(),
            self_link_class: default_self_link_class(),
        }
    }
}

fn default_site_origin() -> String {
    "https://docs.convex.dev".into()
}
fn default_content_selector() -> String {
    ".markdown".into()
}
fn default_self_link_class() -> String {
    "hash-link".into()
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// API base URL, without the `/v1` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the assistant id.
    #[serde(default = "default_assistant_id_env")]
    pub assistant_id_env: String,

    /// Literal assistant id; takes precedence over `assistant_id_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,

    /// Model used when creating the assistant.
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            assistant_id_env: default_assistant_id_env(),
            assistant_id: None,
            model: default_model(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com".into()
}
fn default_assistant_id_env() -> String {
    "ASSISTANT_ID".into()
}
fn default_model() -> String {
    "gpt-4-1106-preview".into()
}

/// `[answer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    /// Delay between run status checks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up after this many status checks. `0` polls until the run ends.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}
fn default_max_poll_attempts() -> u32 {
    600
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum number of in-flight fetch/render/store units.
    pub concurrency: u32,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.defaults.crawl_concurrency,
            request_timeout: Duration::from_secs(config.defaults.request_timeout_secs),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.askdocs/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| AskDocsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.askdocs/askdocs.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AskDocsError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| AskDocsError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AskDocsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AskDocsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AskDocsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve `defaults.database_path`, expanding a leading `~/`.
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    expand_home(&config.defaults.database_path)
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| AskDocsError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Check that the OpenAI API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    resolve_api_key(config).map(|_| ())
}

/// Read the OpenAI API key from the configured env var.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openai.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(AskDocsError::config(format!(
            "OpenAI API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Resolve the assistant id: the literal config value first, then the env var.
pub fn resolve_assistant_id(config: &AppConfig) -> Result<String> {
    if let Some(id) = config.openai.assistant_id.as_deref().filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }

    let var_name = &config.openai.assistant_id_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(AskDocsError::config(format!(
            "assistant id not configured. Run `askdocs assistant create` and set {var_name}."
        ))),
    }
}
