//! `oscup check` — report available updates for the core and enabled plugins.
//!
//! A newer version found here flips the matching update-available preference
//! so the admin surface can react; the flags are consumed again by a
//! successful `upgrade`. Resolver failures for individual plugins are
//! reported and counted but do not abort the sweep.

use anyhow::{Result, bail};
use clap::Parser;
use colored::Colorize;

use crate::config::Settings;
use crate::constants::UPDATE_CORE_AVAILABLE_KEY;
use crate::fetcher::HttpFetcher;
use crate::manifest::{PackageInfo, PackageResolver, UpgradeTarget};
use crate::plugins::{DirectoryCatalog, PluginCatalog};
use crate::registry::{JsonPreferenceStore, PreferenceStore, VersionRegistry};
use crate::version;

/// Arguments for the `check` command.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Check only the core application.
    #[arg(long, conflicts_with = "plugins")]
    pub core: bool,

    /// Check only the enabled plugins.
    #[arg(long)]
    pub plugins: bool,
}

pub async fn execute(args: CheckArgs, settings: &Settings) -> Result<()> {
    let store = JsonPreferenceStore::new(&settings.state_dir());
    let fetcher = HttpFetcher::new(&settings.network)?;
    let catalog = DirectoryCatalog::new(settings.plugins_dir(), &store);
    let resolver =
        PackageResolver::new(&fetcher, &catalog, VersionRegistry::new(&store), settings);

    let mut failures = 0usize;

    if !args.plugins {
        match resolver.resolve(&UpgradeTarget::Core).await {
            Ok(package) => report_target(&package, true, &store)?,
            Err(e) => {
                failures += 1;
                println!("{} osclass: {e}", "x".red());
            }
        }
    }

    if !args.core {
        for short_name in catalog.list_enabled()? {
            match resolver.resolve(&UpgradeTarget::Plugin(short_name.clone())).await {
                Ok(package) => report_target(&package, false, &store)?,
                Err(e) => {
                    failures += 1;
                    println!("{} {short_name}: {e}", "x".red());
                }
            }
        }
    }

    if failures > 0 {
        bail!("{failures} target(s) could not be checked");
    }
    Ok(())
}

fn report_target(
    package: &PackageInfo,
    is_core: bool,
    store: &dyn PreferenceStore,
) -> Result<()> {
    let newer = version::is_newer(&package.new_version, &package.installed_version)?;
    if newer {
        let prerelease = if package.is_prerelease { " (pre-release)" } else { "" };
        println!(
            "{} {} {} -> {}{prerelease}",
            "!".yellow().bold(),
            package.short_name.bold(),
            package.installed_version,
            package.new_version.green().bold(),
        );
        if is_core {
            store.set(UPDATE_CORE_AVAILABLE_KEY, &package.new_version)?;
        } else {
            store.set(&format!("{}_update_available", package.short_name), "1")?;
        }
    } else {
        println!(
            "{} {} {} (up to date)",
            "ok".green(),
            package.short_name.bold(),
            package.installed_version,
        );
    }
    Ok(())
}
