//! Command-line interface.
//!
//! Subcommands:
//! - `check` — resolve remote manifests for the core and enabled plugins and
//!   report available updates
//! - `upgrade` — run the full upgrade state machine for one target
//! - `status` — show installed versions and pending update flags
//! - `rollback` — replay the replacement journal of a failed upgrade
//! - `migrate` — apply the shipped schema script on its own
//!
//! The CLI wires up the concrete collaborators (settings, preference store,
//! plugin catalog, HTTP fetcher, SQLite executor) and passes them into the
//! library explicitly; no globals.

mod check;
mod migrate;
mod rollback;
mod status;
mod upgrade;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Settings;

/// Upgrade manager for a self-hosted classifieds install.
#[derive(Parser, Debug)]
#[command(name = "oscup", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install root of the managed site.
    #[arg(long, global = true, env = "OSCUP_ROOT", default_value = ".")]
    root: PathBuf,

    /// Enable verbose output (equivalent to RUST_LOG=debug).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors; useful for cron and scripts.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check the core and enabled plugins for available updates
    Check(check::CheckArgs),
    /// Download and install an update for the core or a plugin
    Upgrade(upgrade::UpgradeArgs),
    /// Show installed versions and pending update flags
    Status(status::StatusArgs),
    /// Undo the recorded file replacement of a failed upgrade
    Rollback(rollback::RollbackArgs),
    /// Apply the shipped schema script against the live database
    Migrate(migrate::MigrateArgs),
}

impl Cli {
    /// Initialize tracing according to `--verbose`/`--quiet`; an explicit
    /// `RUST_LOG` always wins.
    pub fn init_logging(&self) {
        let default_level = if self.verbose {
            "oscup=debug"
        } else if self.quiet {
            "error"
        } else {
            "oscup=info"
        };
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Execute the selected subcommand.
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::discover(&self.root)?;
        match self.command {
            Commands::Check(args) => check::execute(args, &settings).await,
            Commands::Upgrade(args) => upgrade::execute(args, &settings).await,
            Commands::Status(args) => status::execute(args, &settings),
            Commands::Rollback(args) => rollback::execute(args, &settings),
            Commands::Migrate(args) => migrate::execute(args, &settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn upgrade_accepts_an_optional_plugin_name() {
        let cli = Cli::try_parse_from(["oscup", "upgrade"]).unwrap();
        assert!(matches!(cli.command, Commands::Upgrade(_)));

        let cli = Cli::try_parse_from(["oscup", "--root", "/srv/ads", "upgrade", "maps", "--force"])
            .unwrap();
        assert_eq!(cli.root, PathBuf::from("/srv/ads"));
        let Commands::Upgrade(args) = cli.command else {
            panic!("expected upgrade");
        };
        assert_eq!(args.target.as_deref(), Some("maps"));
        assert!(args.force);
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["oscup", "-v", "-q", "status"]).is_err());
    }
}
