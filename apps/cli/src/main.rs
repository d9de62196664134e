//! CourseFeedback CLI: annotate course search pages with feedback widgets.
//!
//! Pages are read from saved HTML files. `watch` keeps a page live by
//! reloading it on every change and re-running reconciliation.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
