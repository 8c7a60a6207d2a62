//! Pressroom CLI — multi-stage content intake and curation pipeline.
//!
//! Fetches items from configured sources, deduplicates them across every
//! stage, scores them, and promotes the best into the review queue.

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
