//! AskDocs CLI: ingest a documentation site and ask questions about it.
//!
//! Crawls a sitemap into a local knowledge base, uploads it to a hosted
//! assistant, and answers questions per conversation session.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
