//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use askdocs_assistant::{AssistantApi, AssistantConfig, OpenAiAssistant};
use askdocs_core::{
    AnswerState, IngestConfig, IngestResult, PollPolicy, ProgressReporter, Responder,
    UPLOAD_BATCH_SIZE,
};
use askdocs_shared::{
    AppConfig, database_path, init_config, load_config, resolve_assistant_id, validate_api_key,
};
use askdocs_storage::Storage;

/// Crates whose logs the verbosity flag controls.
const LOG_TARGETS: &[&str] = &[
    "askdocs",
    "askdocs_core",
    "askdocs_crawler",
    "askdocs_discovery",
    "askdocs_markdown",
    "askdocs_storage",
    "askdocs_assistant",
    "askdocs_shared",
];

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// AskDocs: answer questions from a documentation site.
#[derive(Parser)]
#[command(
    name = "askdocs",
    version,
    about = "Ingest a documentation site and answer questions about it with a hosted assistant.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl the sitemap and store every page as a document.
    Ingest {
        /// Sitemap URL (defaults to `defaults.sitemap_url`).
        #[arg(long)]
        sitemap: Option<String>,

        /// Only process the first N sitemap entries.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Maximum number of pages processed at once.
        #[arg(short, long)]
        concurrency: Option<u32>,
    },

    /// Upload documents without a remote file to the assistant.
    Upload,

    /// Manage the remote assistant.
    Assistant {
        #[command(subcommand)]
        action: AssistantAction,
    },

    /// Ask a question within a conversation session.
    Ask {
        /// Conversation session identifier.
        #[arg(short, long)]
        session: String,

        /// The question.
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Print a session's transcript.
    History {
        /// Conversation session identifier.
        #[arg(short, long)]
        session: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Assistant subcommands.
#[derive(Subcommand)]
pub(crate) enum AssistantAction {
    /// Create a retrieval assistant and print its id.
    Create {
        /// Model to use (defaults to `openai.model`).
        #[arg(long)]
        model: Option<String>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let directives = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ingest {
            sitemap,
            limit,
            concurrency,
        } => cmd_ingest(sitemap.as_deref(), limit, concurrency).await,
        Command::Upload => cmd_upload().await,
        Command::Assistant { action } => match action {
            AssistantAction::Create { model } => cmd_assistant_create(model.as_deref()).await,
        },
        Command::Ask { session, question } => cmd_ask(&session, &question.join(" ")).await,
        Command::History { session } => cmd_history(&session).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = database_path(config)?;
    Ok(Arc::new(Storage::open(&path).await?))
}

fn assistant_client(config: &AppConfig) -> Result<Arc<dyn AssistantApi>> {
    validate_api_key(config)?;
    let client = OpenAiAssistant::new(AssistantConfig::from_app_config(config)?)?;
    Ok(Arc::new(client))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ingest(
    sitemap: Option<&str>,
    limit: Option<usize>,
    concurrency: Option<u32>,
) -> Result<()> {
    let config = load_config()?;

    let mut ingest = IngestConfig::from_app_config(&config)?;
    if let Some(sitemap) = sitemap {
        ingest.sitemap_url =
            Url::parse(sitemap).map_err(|e| eyre!("invalid sitemap URL '{sitemap}': {e}"))?;
    }
    ingest.limit = limit;
    if let Some(concurrency) = concurrency {
        ingest.crawl.concurrency = concurrency;
    }

    info!(
        sitemap = %ingest.sitemap_url,
        limit = ?ingest.limit,
        concurrency = ingest.crawl.concurrency,
        "ingesting documentation"
    );

    let storage = open_storage(&config).await?;
    let reporter = CliProgress::new();
    let result = askdocs_core::ingest_site(&ingest, storage, &reporter).await;
    if result.is_err() {
        reporter.spinner.finish_and_clear();
    }
    let result = result?;
    let report = &result.report;

    println!();
    println!("  Ingest complete");
    println!("  Discovered: {}", result.discovered);
    println!("  Inserted:   {}", report.inserted);
    println!("  Updated:    {}", report.updated);
    println!("  Unchanged:  {}", report.unchanged);
    println!("  Empty:      {}", report.skipped_empty);
    println!("  Failed:     {}", report.errors.len());
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    for (url, error) in &report.errors {
        println!("    ✗ {url}: {error}");
    }
    println!();

    Ok(())
}

async fn cmd_upload() -> Result<()> {
    let config = load_config()?;
    let assistant = assistant_client(&config)?;
    let assistant_id = resolve_assistant_id(&config)?;
    let storage = open_storage(&config).await?;

    let spinner = spinner("Uploading documents");
    let report =
        askdocs_core::upload_all_documents(storage, assistant, &assistant_id, UPLOAD_BATCH_SIZE)
            .await;
    spinner.finish_and_clear();
    let report = report?;

    println!();
    println!("  Upload complete");
    println!("  Uploaded: {}", report.uploaded);
    println!("  Skipped:  {}", report.skipped);
    println!("  Failed:   {}", report.errors.len());
    for (id, error) in &report.errors {
        println!("    ✗ {id}: {error}");
    }
    println!();

    Ok(())
}

async fn cmd_assistant_create(model: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let assistant = assistant_client(&config)?;
    let model = model.unwrap_or(&config.openai.model);

    let id = askdocs_core::create_assistant(assistant.as_ref(), model).await?;

    println!("Assistant created: {id}");
    println!(
        "Set {}={id} or add `assistant_id = \"{id}\"` under [openai] in the config.",
        config.openai.assistant_id_env
    );
    Ok(())
}

async fn cmd_ask(session: &str, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        return Err(eyre!("question must not be empty"));
    }

    let config = load_config()?;
    let assistant = assistant_client(&config)?;
    let assistant_id = resolve_assistant_id(&config)?;
    let storage = open_storage(&config).await?;

    let responder = Responder::new(storage, assistant, assistant_id, PollPolicy::from(&config));

    let spinner = spinner("Waiting for the assistant");
    let outcome = responder.ask(session, question).await;
    spinner.finish_and_clear();
    let outcome = outcome?;

    if outcome.state != AnswerState::Completed {
        info!(state = ?outcome.state, "no answer produced");
    }
    for message in &outcome.messages_added {
        println!("{}", message.text);
        println!();
    }
    Ok(())
}

async fn cmd_history(session: &str) -> Result<()> {
    let config = load_config()?;
    let path = database_path(&config)?;
    let storage = Storage::open_readonly(&path).await?;

    let messages = storage.list_messages(session).await?;
    if messages.is_empty() {
        println!("No messages for session '{session}'.");
        return Ok(());
    }

    for message in messages {
        let who = if message.is_viewer { "you" } else { "assistant" };
        println!(
            "[{}] {who}:",
            message.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("{}", message.text);
        println!();
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            spinner: spinner("Starting"),
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _result: &IngestResult) {
        self.spinner.finish_and_clear();
    }
}
