//! `oscup status` — installed versions and pending update flags.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::config::Settings;
use crate::constants::{CORE_SHORT_NAME, UPDATE_CORE_AVAILABLE_KEY};
use crate::plugins::{DirectoryCatalog, PluginCatalog};
use crate::registry::{JsonPreferenceStore, PreferenceStore, VersionRegistry};

/// Arguments for the `status` command.
#[derive(Parser, Debug)]
pub struct StatusArgs {}

pub fn execute(_args: StatusArgs, settings: &Settings) -> Result<()> {
    let store = JsonPreferenceStore::new(&settings.state_dir());
    let registry = VersionRegistry::new(&store);
    let catalog = DirectoryCatalog::new(settings.plugins_dir(), &store);

    println!("Install root: {}", settings.root.display());

    let core_version = registry
        .get(CORE_SHORT_NAME)?
        .unwrap_or_else(|| "unknown".to_string());
    match store.get(UPDATE_CORE_AVAILABLE_KEY)? {
        Some(available) => println!(
            "{CORE_SHORT_NAME}: {core_version} ({} {})",
            "update available:".yellow(),
            available.bold()
        ),
        None => println!("{CORE_SHORT_NAME}: {core_version}"),
    }

    let enabled = catalog.list_enabled()?;
    if enabled.is_empty() {
        println!("No plugins enabled");
        return Ok(());
    }
    for short_name in enabled {
        let version = match registry.get(&short_name)? {
            Some(v) => v,
            None => match catalog.info(&short_name) {
                Ok(info) => info.installed_version,
                Err(_) => "unknown".to_string(),
            },
        };
        let flagged = store
            .get(&format!("{short_name}_update_available"))?
            .is_some_and(|flag| flag == "1");
        if flagged {
            println!("  {short_name}: {version} ({})", "update available".yellow());
        } else {
            println!("  {short_name}: {version}");
        }
    }
    Ok(())
}
