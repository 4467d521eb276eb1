//! Persisted preference store and the installed-version registry over it.
//!
//! The platform keeps operational flags and the installed-version markers in
//! a key-value preference store that survives restarts. This module defines
//! the narrow [`PreferenceStore`] seam, a JSON-file implementation, and
//! [`VersionRegistry`], the view the upgrade machinery uses.
//!
//! The file-backed store re-reads the live file on every call: a resolver
//! checking versions minutes apart must never act on a value cached earlier
//! in a long-running process.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::UpgradeError;

/// Persisted key-value preference store.
///
/// Implementations must read live state on every `get`; callers rely on the
/// absence of in-process caching.
pub trait PreferenceStore: Send + Sync {
    /// Look up a preference value.
    fn get(&self, key: &str) -> Result<Option<String>, UpgradeError>;
    /// Set a preference value, persisting it before returning.
    fn set(&self, key: &str, value: &str) -> Result<(), UpgradeError>;
    /// Delete a preference if present.
    fn delete(&self, key: &str) -> Result<(), UpgradeError>;
}

/// JSON-file preference store kept under the state directory.
///
/// Every operation is a full read (and for mutations, write) of the backing
/// file, which keeps the store coherent across processes without additional
/// coordination; mutations only ever happen under the installer's target
/// lock.
#[derive(Debug, Clone)]
pub struct JsonPreferenceStore {
    path: PathBuf,
}

impl JsonPreferenceStore {
    /// Store backed by `{state_dir}/preferences.json`.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("preferences.json"),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, UpgradeError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| UpgradeError::fs(&self.path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            UpgradeError::fs(
                &self.path,
                io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
            )
        })
    }

    fn save(&self, map: &BTreeMap<String, String>) -> Result<(), UpgradeError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| UpgradeError::fs(parent, e))?;
        }
        let content = serde_json::to_string_pretty(map).map_err(|e| {
            UpgradeError::fs(
                &self.path,
                io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
            )
        })?;
        std::fs::write(&self.path, content).map_err(|e| UpgradeError::fs(&self.path, e))
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, UpgradeError> {
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), UpgradeError> {
        let mut map = self.load()?;
        map.insert(key.to_string(), value.to_string());
        self.save(&map)?;
        debug!(key, value, "Preference set");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), UpgradeError> {
        let mut map = self.load()?;
        if map.remove(key).is_some() {
            self.save(&map)?;
            debug!(key, "Preference deleted");
        }
        Ok(())
    }
}

/// Installed-version registry over a preference store.
///
/// One entry per target short name. Entries are written only after a
/// successful install and persist until superseded by the next one.
pub struct VersionRegistry<'a> {
    store: &'a dyn PreferenceStore,
}

impl<'a> VersionRegistry<'a> {
    /// Registry view over `store`.
    pub fn new(store: &'a dyn PreferenceStore) -> Self {
        Self { store }
    }

    fn key(short_name: &str) -> String {
        format!("{short_name}_installed_version")
    }

    /// Currently recorded version for a target, if any.
    ///
    /// Reads the live persisted value on every call.
    pub fn get(&self, short_name: &str) -> Result<Option<String>, UpgradeError> {
        self.store.get(&Self::key(short_name))
    }

    /// Record a newly installed version for a target.
    pub fn set(&self, short_name: &str, version: &str) -> Result<(), UpgradeError> {
        self.store.set(&Self::key(short_name), version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn get_on_missing_store_is_none() {
        let temp = TempDir::new().unwrap();
        let store = JsonPreferenceStore::new(temp.path());
        assert_eq!(store.get("version").unwrap(), None);
    }

    #[test]
    fn set_then_get_round_trips_through_the_file() {
        let temp = TempDir::new().unwrap();
        let store = JsonPreferenceStore::new(temp.path());
        store.set("enabled_plugins", "maps,seo").unwrap();

        // A second handle sees the persisted value: no in-process caching.
        let other = JsonPreferenceStore::new(temp.path());
        assert_eq!(other.get("enabled_plugins").unwrap().as_deref(), Some("maps,seo"));
    }

    #[test]
    fn get_reflects_external_mutation() {
        let temp = TempDir::new().unwrap();
        let store = JsonPreferenceStore::new(temp.path());
        store.set("flag", "1").unwrap();

        // Simulate another process rewriting the file between calls.
        std::fs::write(store.path(), "{\"flag\": \"2\"}").unwrap();
        assert_eq!(store.get("flag").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn delete_removes_the_key() {
        let temp = TempDir::new().unwrap();
        let store = JsonPreferenceStore::new(temp.path());
        store.set("update_core_available", "3.5.0").unwrap();
        store.delete("update_core_available").unwrap();
        assert_eq!(store.get("update_core_available").unwrap(), None);
        // Deleting a missing key is not an error.
        store.delete("update_core_available").unwrap();
    }

    #[test]
    fn registry_records_per_target_versions() {
        let temp = TempDir::new().unwrap();
        let store = JsonPreferenceStore::new(temp.path());
        let registry = VersionRegistry::new(&store);

        assert_eq!(registry.get("osclass").unwrap(), None);
        registry.set("osclass", "3.5.0").unwrap();
        registry.set("maps", "1.2.0").unwrap();
        assert_eq!(registry.get("osclass").unwrap().as_deref(), Some("3.5.0"));
        assert_eq!(registry.get("maps").unwrap().as_deref(), Some("1.2.0"));
    }

    #[test]
    fn corrupt_store_surfaces_as_error() {
        let temp = TempDir::new().unwrap();
        let store = JsonPreferenceStore::new(temp.path());
        std::fs::create_dir_all(temp.path()).unwrap();
        std::fs::write(store.path(), "not json").unwrap();
        assert!(store.get("anything").is_err());
    }
}
