//! Plugin enumeration and metadata lookup.
//!
//! Plugins live in their own directories under the install tree, each
//! shipping a `plugin.toml` describing itself and, optionally, where to look
//! for updates. Which plugins are *enabled* is operational state kept in the
//! preference store.
//!
//! The [`PluginCatalog`] trait is the narrow seam the resolver consumes;
//! [`DirectoryCatalog`] is the production implementation over the live
//! install tree.

use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use tracing::debug;

use crate::constants::{ENABLED_PLUGINS_KEY, PLUGIN_MANIFEST_FILE};
use crate::core::UpgradeError;
use crate::registry::PreferenceStore;

/// Metadata a plugin declares about itself in its `plugin.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    /// Human-readable plugin name.
    pub name: String,
    /// Version currently shipped in the plugin directory.
    pub version: String,
    /// Where to fetch release information; absent means not updatable.
    #[serde(default)]
    pub update_uri: Option<String>,
}

/// Resolved view of one installed plugin.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    /// Directory name, the plugin's identity key.
    pub short_name: String,
    /// Human-readable name from the metadata file.
    pub title: String,
    /// Version declared by the installed metadata file.
    pub installed_version: String,
    /// Declared update manifest URL, if any.
    pub update_uri: Option<String>,
    /// Absolute plugin directory.
    pub directory: PathBuf,
}

/// Enumerates installed plugins and resolves their metadata.
pub trait PluginCatalog: Send + Sync {
    /// Short names of enabled plugins, in their configured order.
    fn list_enabled(&self) -> Result<Vec<String>, UpgradeError>;
    /// Metadata for one installed plugin.
    fn info(&self, short_name: &str) -> Result<PluginDescriptor, UpgradeError>;
}

/// Catalog over the live plugins directory, with the enabled list read from
/// the preference store.
pub struct DirectoryCatalog<'a> {
    plugins_dir: PathBuf,
    store: &'a dyn PreferenceStore,
}

impl<'a> DirectoryCatalog<'a> {
    /// Catalog for the plugins under `plugins_dir`.
    pub fn new(plugins_dir: PathBuf, store: &'a dyn PreferenceStore) -> Self {
        Self { plugins_dir, store }
    }
}

/// A plugin short name is a bare directory name; anything that could step
/// outside the plugins directory is rejected at this boundary.
pub fn validate_short_name(short_name: &str) -> Result<(), UpgradeError> {
    let ok = !short_name.is_empty()
        && short_name != "."
        && short_name != ".."
        && !short_name.contains(['/', '\\'])
        && !short_name.contains('\0');
    if ok {
        Ok(())
    } else {
        Err(UpgradeError::fs(
            short_name,
            io::Error::new(io::ErrorKind::InvalidInput, "invalid plugin name"),
        ))
    }
}

impl PluginCatalog for DirectoryCatalog<'_> {
    fn list_enabled(&self) -> Result<Vec<String>, UpgradeError> {
        let csv = self.store.get(ENABLED_PLUGINS_KEY)?.unwrap_or_default();
        let enabled: Vec<String> = csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
        debug!(count = enabled.len(), "Enumerated enabled plugins");
        Ok(enabled)
    }

    fn info(&self, short_name: &str) -> Result<PluginDescriptor, UpgradeError> {
        validate_short_name(short_name)?;

        let directory = self.plugins_dir.join(short_name);
        let manifest_path = directory.join(PLUGIN_MANIFEST_FILE);
        let content = std::fs::read_to_string(&manifest_path)
            .map_err(|e| UpgradeError::fs(&manifest_path, e))?;
        let manifest: PluginManifest =
            toml::from_str(&content).map_err(|e| UpgradeError::ManifestMalformed {
                target: short_name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(PluginDescriptor {
            short_name: short_name.to_string(),
            title: manifest.name,
            installed_version: manifest.version,
            update_uri: manifest.update_uri,
            directory,
        })
    }
}
