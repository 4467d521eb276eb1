//! `oscup migrate` — apply the shipped schema script on its own.
//!
//! Useful after an upgrade halted on schema errors: the operator reviews the
//! failed statements, then re-runs with `--proceed-on-errors` once satisfied
//! they are false positives.

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;

use crate::config::Settings;
use crate::core::UpgradeError;
use crate::migrator::{SchemaMigrator, SqliteExecutor};

/// Arguments for the `migrate` command.
#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Exit successfully even when statements failed (review them first).
    #[arg(long)]
    pub proceed_on_errors: bool,
}

pub fn execute(args: MigrateArgs, settings: &Settings) -> Result<()> {
    let script_path = settings.schema_script_path();
    if !script_path.exists() {
        bail!("No schema script at {}", script_path.display());
    }
    let script = std::fs::read_to_string(&script_path)
        .with_context(|| format!("Failed to read schema script: {}", script_path.display()))?;

    let executor = SqliteExecutor::open(&settings.database_path())?;
    let result = SchemaMigrator::new(&executor).apply(&script, &settings.database.table_prefix);

    println!("Schema migration: {result}");
    for failed in &result.failed {
        println!("  {} {}", "failed:".red(), failed.statement);
        println!("    {}", failed.message.dimmed());
    }

    if !result.is_clean() && !args.proceed_on_errors {
        return Err(UpgradeError::SchemaErrors {
            failed: result.failed,
        }
        .into());
    }
    println!("{} database schema is up to date", "ok".green().bold());
    Ok(())
}
