//! bookbinder CLI: build a multi-chapter book into PDF, EPUB, MOBI, and a
//! static site by orchestrating the external document tools.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
