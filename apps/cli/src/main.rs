//! ReportKit CLI: bulk report import with rich-text normalization.
//!
//! Reads report spreadsheets, maps their columns onto canonical fields,
//! turns free-form cells into sanitized markup and stores the results.

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
