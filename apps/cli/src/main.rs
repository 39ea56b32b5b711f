//! lineage CLI: hierarchy moves for lineage-embedding document stores.
//!
//! Moves contacts to a new parent and stages every document whose embedded
//! ancestry changes, for a later upload.

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
