//! `oscup upgrade` — run the full upgrade state machine for one target.
//!
//! Without an argument the core application is upgraded; with a plugin short
//! name, that plugin. The command always prints the structured outcome; a
//! failure additionally surfaces the typed error so the operator gets the
//! matching hint (and, after a failed replacement, the rollback pointer).

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::config::Settings;
use crate::fetcher::HttpFetcher;
use crate::installer::{InstallOptions, PackageInstaller, UpgradeReport, UpgradeStatus};
use crate::manifest::UpgradeTarget;
use crate::migrator::{SqlExecutor, SqliteExecutor};
use crate::plugins::DirectoryCatalog;
use crate::registry::JsonPreferenceStore;

/// Arguments for the `upgrade` command.
#[derive(Parser, Debug)]
pub struct UpgradeArgs {
    /// Plugin short name to upgrade; omitted means the core application.
    #[arg(value_name = "PLUGIN")]
    pub target: Option<String>,

    /// Install even when already on the latest version.
    #[arg(long)]
    pub force: bool,

    /// Skip the schema migration step.
    #[arg(long)]
    pub skip_db: bool,

    /// Continue despite failed schema statements (review them first).
    #[arg(long)]
    pub proceed_on_schema_errors: bool,
}

pub async fn execute(args: UpgradeArgs, settings: &Settings) -> Result<()> {
    let store = JsonPreferenceStore::new(&settings.state_dir());
    let fetcher = HttpFetcher::new(&settings.network)?;
    let catalog = DirectoryCatalog::new(settings.plugins_dir(), &store);

    let target = match args.target {
        Some(name) => UpgradeTarget::Plugin(name),
        None => UpgradeTarget::Core,
    };
    let options = InstallOptions {
        force: args.force,
        skip_db: args.skip_db,
        proceed_on_schema_errors: args.proceed_on_schema_errors,
    };

    // The live database is only needed for core upgrades.
    let executor = if target.is_core() && !args.skip_db {
        Some(SqliteExecutor::open(&settings.database_path())?)
    } else {
        None
    };

    let installer = PackageInstaller::new(&fetcher, &catalog, &store, settings, options);
    let report = installer
        .install(&target, executor.as_ref().map(|e| e as &dyn SqlExecutor))
        .await;

    render(&report);
    match report.status {
        UpgradeStatus::Failed(error) => Err(error.into()),
        _ => Ok(()),
    }
}

fn render(report: &UpgradeReport) {
    match &report.status {
        UpgradeStatus::Completed => println!("{} {}", "ok".green().bold(), report.message()),
        UpgradeStatus::AlreadyUpToDate => println!("{} {}", "ok".green(), report.message()),
        UpgradeStatus::Failed(_) => println!("{} {}", "x".red().bold(), report.message()),
    }

    if let Some(digest) = &report.archive_sha256 {
        println!("  archive sha256: {}", digest.dimmed());
    }

    if let Some(migration) = &report.migration {
        println!("  schema migration: {migration}");
        for failed in &migration.failed {
            println!("    {} {}", "failed:".red(), failed.statement);
            println!("      {}", failed.message.dimmed());
        }
    }

    if !report.is_success() && !report.copied.is_empty() {
        let command = if report.short_name == crate::constants::CORE_SHORT_NAME {
            "oscup rollback".to_string()
        } else {
            format!("oscup rollback {}", report.short_name)
        };
        println!(
            "  {} file(s) were already written; run {} to restore the previous tree",
            report.copied.len(),
            command.cyan(),
        );
    }
}
