//! oscup CLI entry point.
//!
//! Parses arguments, initializes logging, executes the selected command and
//! renders failures as user-friendly errors with suggestions.

use anyhow::Result;
use clap::Parser;
use oscup::cli::Cli;
use oscup::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}
