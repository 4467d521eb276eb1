//! `oscup rollback` — undo the recorded file replacement of a failed upgrade.
//!
//! Replays the target's journal newest-first: files that were replaced are
//! restored from their pre-copy backups, files that were added are removed.
//! Only available while a journal from a failed attempt exists; successful
//! upgrades clean theirs up.

use anyhow::{Result, bail};
use clap::Parser;
use colored::Colorize;

use crate::config::Settings;
use crate::constants::CORE_SHORT_NAME;
use crate::installer::journal::{journal_exists, rollback};

/// Arguments for the `rollback` command.
#[derive(Parser, Debug)]
pub struct RollbackArgs {
    /// Plugin short name to roll back; omitted means the core application.
    #[arg(value_name = "PLUGIN")]
    pub target: Option<String>,
}

pub fn execute(args: RollbackArgs, settings: &Settings) -> Result<()> {
    let short_name = args.target.as_deref().unwrap_or(CORE_SHORT_NAME);
    let state_dir = settings.state_dir();

    if !journal_exists(&state_dir, short_name) {
        bail!("No replacement journal found for '{short_name}'; nothing to roll back");
    }

    let summary = rollback(&state_dir, short_name)?;
    println!(
        "{} rolled back '{short_name}' in {}: {} file(s) restored, {} removed",
        "ok".green().bold(),
        summary.target_dir.display(),
        summary.restored,
        summary.removed,
    );
    Ok(())
}
