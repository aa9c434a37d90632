//! crmrelay CLI — bulk relationship operations against a CRM backend.
//!
//! Searches entity listings and applies batch sequence, tag, link, and
//! delete operations to explicit entity selections.

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
