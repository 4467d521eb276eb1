//! Shared fixtures for unit and integration tests.
//!
//! Available to the integration suite through the `test-utils` feature (the
//! crate depends on itself with that feature enabled in dev builds).

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::config::Settings;
use crate::core::UpgradeError;
use crate::fetcher::RemoteSource;
use crate::registry::JsonPreferenceStore;

/// In-memory [`RemoteSource`] serving canned manifests and archives.
///
/// Counts fetches so tests can assert that an operation short-circuited
/// before touching the network.
#[derive(Default)]
pub struct InMemorySource {
    manifests: HashMap<String, String>,
    archives: HashMap<String, Vec<u8>>,
    manifest_fetches: AtomicUsize,
    archive_fetches: AtomicUsize,
}

impl InMemorySource {
    /// Empty source; unknown URLs answer 404.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for manifest fetches of `url`.
    #[must_use]
    pub fn with_manifest(mut self, url: &str, body: &str) -> Self {
        self.manifests.insert(url.to_string(), body.to_string());
        self
    }

    /// Serve `bytes` for archive fetches of `url`.
    #[must_use]
    pub fn with_archive(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.archives.insert(url.to_string(), bytes);
        self
    }

    /// Number of manifest fetches served or refused so far.
    pub fn manifest_fetches(&self) -> usize {
        self.manifest_fetches.load(Ordering::SeqCst)
    }

    /// Number of archive fetches served or refused so far.
    pub fn archive_fetches(&self) -> usize {
        self.archive_fetches.load(Ordering::SeqCst)
    }
}

impl RemoteSource for InMemorySource {
    async fn fetch_manifest(&self, url: &str) -> Result<String, UpgradeError> {
        self.manifest_fetches.fetch_add(1, Ordering::SeqCst);
        match self.manifests.get(url) {
            Some(body) if body.trim().is_empty() => Err(UpgradeError::EmptyResponse {
                url: url.to_string(),
            }),
            Some(body) => Ok(body.clone()),
            None => Err(UpgradeError::Http {
                url: url.to_string(),
                status: 404,
            }),
        }
    }

    async fn fetch_archive(&self, url: &str) -> Result<Vec<u8>, UpgradeError> {
        self.archive_fetches.fetch_add(1, Ordering::SeqCst);
        match self.archives.get(url) {
            Some(bytes) if bytes.is_empty() => Err(UpgradeError::EmptyResponse {
                url: url.to_string(),
            }),
            Some(bytes) => Ok(bytes.clone()),
            None => Err(UpgradeError::Http {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Build a zip archive in memory from `(entry_name, contents)` pairs.
///
/// Entry names ending in `/` become directories.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(name.trim_end_matches('/'), options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Releases-API manifest body for a published release.
pub fn releases_manifest(tag: &str, asset_url: &str) -> String {
    format!(
        r#"{{
            "name": "Release {tag}",
            "draft": false,
            "prerelease": false,
            "tag_name": "{tag}",
            "assets": [{{"browser_download_url": "{asset_url}"}}]
        }}"#
    )
}

/// A disposable install tree with settings and a preference store.
pub struct TempInstall {
    /// Owns the temporary directory for the test's lifetime.
    pub temp: TempDir,
    /// Settings discovered for the temp root.
    pub settings: Settings,
    /// Preference store under the temp state dir.
    pub store: JsonPreferenceStore,
}

impl TempInstall {
    /// A minimal live tree: a user config file, a content directory with an
    /// upload, and the platform library directory.
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("oc-content/uploads")).unwrap();
        std::fs::create_dir_all(root.join("oc-includes")).unwrap();
        std::fs::write(root.join("config.php"), b"<?php // live credentials\n").unwrap();
        std::fs::write(root.join("oc-content/uploads/photo.jpg"), b"jpeg-bytes").unwrap();

        let settings = Settings::discover(root).unwrap();
        let store = JsonPreferenceStore::new(&settings.state_dir());
        Self {
            temp,
            settings,
            store,
        }
    }

    /// Install root path.
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Write a file under the root, creating parent directories.
    pub fn write_file(&self, rel: &str, contents: &[u8]) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    /// Read a file under the root.
    pub fn read_file(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.root().join(rel)).unwrap()
    }

    /// Whether a path exists under the root.
    pub fn exists(&self, rel: &str) -> bool {
        self.root().join(rel).exists()
    }

    /// Add a plugin directory with its metadata file.
    pub fn add_plugin(&self, short: &str, version: &str, update_uri: Option<&str>) -> PathBuf {
        let dir = self.settings.plugins_dir().join(short);
        std::fs::create_dir_all(&dir).unwrap();
        let mut manifest = format!("name = \"{short}\"\nversion = \"{version}\"\n");
        if let Some(uri) = update_uri {
            manifest.push_str(&format!("update_uri = \"{uri}\"\n"));
        }
        std::fs::write(dir.join("plugin.toml"), manifest).unwrap();
        dir
    }
}

impl Default for TempInstall {
    fn default() -> Self {
        Self::new()
    }
}
