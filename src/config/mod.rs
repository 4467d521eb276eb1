//! Settings for an oscup-managed install.
//!
//! Settings live in an `oscup.toml` next to the install root. Every section
//! is optional; a missing file yields defaults, so a fresh install works with
//! nothing but `--root`.
//!
//! # File format
//!
//! ```toml
//! [install]
//! # Paths never overwritten by an upgrade (defaults shown)
//! excluded_paths = ["oc-content", "config.php"]
//!
//! [network]
//! manifest_timeout_secs = 30
//! download_timeout_secs = 300
//! retries = 3
//!
//! [core]
//! # Override the upstream release manifest (e.g. a fork)
//! manifest_url = "https://api.github.com/repos/mindstellar/osclass/releases/latest"
//!
//! [database]
//! path = "oscup.db"
//! table_prefix = "oc_"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    CORE_MANIFEST_URL, DEFAULT_EXCLUDED_PATHS, DOWNLOAD_TIMEOUT_SECS, FETCH_ATTEMPTS,
    MANIFEST_TIMEOUT_SECS, PLUGINS_DIR_REL, SCHEMA_SCRIPT_REL, STATE_DIR_REL,
};

/// Name of the settings file looked up under the install root.
pub const SETTINGS_FILE: &str = "oscup.toml";

fn default_excluded_paths() -> Vec<String> {
    DEFAULT_EXCLUDED_PATHS.iter().map(|s| (*s).to_string()).collect()
}

fn default_manifest_timeout() -> u64 {
    MANIFEST_TIMEOUT_SECS
}

fn default_download_timeout() -> u64 {
    DOWNLOAD_TIMEOUT_SECS
}

fn default_retries() -> u32 {
    FETCH_ATTEMPTS
}

fn default_core_manifest_url() -> String {
    CORE_MANIFEST_URL.to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("oscup.db")
}

fn default_table_prefix() -> String {
    "oc_".to_string()
}

/// Install-tree section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallSettings {
    /// Relative paths under the install root that upgrades must never
    /// overwrite.
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            excluded_paths: default_excluded_paths(),
        }
    }
}

/// Network section: timeouts and retry budget for remote fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSettings {
    /// Timeout for manifest fetches, in seconds.
    #[serde(default = "default_manifest_timeout")]
    pub manifest_timeout_secs: u64,
    /// Timeout for archive downloads, in seconds.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    /// Maximum attempts for transient transport failures.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            manifest_timeout_secs: default_manifest_timeout(),
            download_timeout_secs: default_download_timeout(),
            retries: default_retries(),
        }
    }
}

/// Core-target section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreSettings {
    /// Release manifest URL for the core application.
    #[serde(default = "default_core_manifest_url")]
    pub manifest_url: String,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            manifest_url: default_core_manifest_url(),
        }
    }
}

/// Database section for the schema-migration step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSettings {
    /// Database file, relative to the install root unless absolute.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    /// Live table prefix substituted into the schema script.
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            table_prefix: default_table_prefix(),
        }
    }
}

/// Settings for one managed install.
///
/// Constructed per invocation and passed explicitly to consumers; there is no
/// process-wide configuration singleton.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Absolute install root. Not read from the file; set from `--root`.
    #[serde(skip)]
    pub root: PathBuf,
    /// Install-tree options.
    pub install: InstallSettings,
    /// Network options.
    pub network: NetworkSettings,
    /// Core-target options.
    pub core: CoreSettings,
    /// Database options.
    pub database: DatabaseSettings,
}

impl Settings {
    /// Load settings for the install rooted at `root`.
    ///
    /// Reads `{root}/oscup.toml` when present; a missing file yields
    /// defaults. A present-but-invalid file is an error rather than a silent
    /// fallback.
    pub fn discover(root: &Path) -> Result<Self> {
        let path = root.join(SETTINGS_FILE);
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
            toml::from_str::<Self>(&content)
                .with_context(|| format!("Failed to parse settings file: {}", path.display()))?
        } else {
            Self::default()
        };
        settings.root = root.to_path_buf();
        Ok(settings)
    }

    /// State directory holding locks, journals, backups and the preference
    /// store.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR_REL)
    }

    /// Directory holding installed plugins.
    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join(PLUGINS_DIR_REL)
    }

    /// Schema script shipped by the core package, inside the live tree.
    pub fn schema_script_path(&self) -> PathBuf {
        self.root.join(SCHEMA_SCRIPT_REL)
    }

    /// Database file path, resolved against the install root.
    pub fn database_path(&self) -> PathBuf {
        if self.database.path.is_absolute() {
            self.database.path.clone()
        } else {
            self.root.join(&self.database.path)
        }
    }

    /// Exclusion list as paths relative to the install root.
    pub fn excluded_paths(&self) -> Vec<PathBuf> {
        self.install.excluded_paths.iter().map(PathBuf::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::discover(temp.path()).unwrap();
        assert_eq!(settings.root, temp.path());
        assert_eq!(settings.network.retries, 3);
        assert_eq!(settings.install.excluded_paths, vec!["oc-content", "config.php"]);
        assert!(settings.core.manifest_url.contains("api.github.com"));
    }

    #[test]
    fn partial_file_keeps_section_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(SETTINGS_FILE),
            "[network]\nretries = 5\n\n[database]\ntable_prefix = \"ads_\"\n",
        )
        .unwrap();

        let settings = Settings::discover(temp.path()).unwrap();
        assert_eq!(settings.network.retries, 5);
        assert_eq!(settings.network.manifest_timeout_secs, 30);
        assert_eq!(settings.database.table_prefix, "ads_");
        assert_eq!(settings.install.excluded_paths.len(), 2);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(SETTINGS_FILE), "[network]\nretries = \"many\"\n").unwrap();
        assert!(Settings::discover(temp.path()).is_err());
    }

    #[test]
    fn derived_paths_hang_off_root() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::discover(temp.path()).unwrap();
        assert_eq!(settings.state_dir(), temp.path().join(".oscup"));
        assert_eq!(settings.plugins_dir(), temp.path().join("oc-content/plugins"));
        assert_eq!(settings.database_path(), temp.path().join("oscup.db"));
        assert!(settings.schema_script_path().ends_with("installer/struct.sql"));
    }
}
