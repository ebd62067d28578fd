//! hubkit CLI: run view content pipelines from declarative scripts.
//!
//! Loads a view through its operation chain, requests extra pages and
//! prints each resulting content model with the diff from the previous one.

mod commands;
mod script;

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
