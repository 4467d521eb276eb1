//! Remote manifest resolution.
//!
//! A manifest is a remote JSON document describing an available package
//! version and its download location. Two dialects exist in the wild:
//!
//! - **Releases-API**: the JSON a release-hosting API serves for the latest
//!   release of a repository (`draft`, `prerelease`, `tag_name`, `assets`).
//! - **Custom**: a hand-maintained document plugin authors host themselves
//!   (`s_source_file`, `s_version`, optional `s_compatible`).
//!
//! The dialect is decided exactly once from the manifest URL's host and
//! carried as an explicit [`ManifestDialect`] value rather than re-sniffed at
//! each field access.
//!
//! Resolution builds a fresh [`PackageInfo`] per call — remote state may
//! change between checks, so nothing here is cached.

use reqwest::Url;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::constants::{CORE_SHORT_NAME, RELEASES_API_HOST};
use crate::core::UpgradeError;
use crate::fetcher::RemoteSource;
use crate::plugins::PluginCatalog;
use crate::registry::VersionRegistry;
use crate::version;

/// The install unit being upgraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeTarget {
    /// The core application.
    Core,
    /// A single plugin, by directory short name.
    Plugin(String),
}

impl UpgradeTarget {
    /// Identity key of the target.
    pub fn short_name(&self) -> &str {
        match self {
            Self::Core => CORE_SHORT_NAME,
            Self::Plugin(name) => name,
        }
    }

    /// Whether this is the core application.
    pub fn is_core(&self) -> bool {
        matches!(self, Self::Core)
    }
}

/// Which JSON shape a manifest URL serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestDialect {
    /// Release-hosting API (`api.github.com`).
    ReleasesApi,
    /// Author-hosted custom JSON document.
    Custom,
}

impl ManifestDialect {
    /// Decide the dialect from the manifest URL host.
    pub fn for_url(url: &Url) -> Self {
        if url.host_str() == Some(RELEASES_API_HOST) {
            Self::ReleasesApi
        } else {
            Self::Custom
        }
    }
}

/// Describes an installable unit, constructed fresh per upgrade check.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    /// Human-readable package title.
    pub title: String,
    /// Identity key: `osclass` for the core, plugin directory name otherwise.
    pub short_name: String,
    /// Download URL for the release archive.
    pub source_url: String,
    /// Available version, normalized (leading `v` stripped, trimmed).
    pub new_version: String,
    /// Version currently installed.
    pub installed_version: String,
    /// Absolute install root for this target.
    pub target_directory: PathBuf,
    /// Paths relative to `target_directory` that must never be overwritten.
    pub excluded_paths: Vec<PathBuf>,
    /// Versions the package declares compatibility with, when stated.
    pub compatible_versions: Option<Vec<String>>,
    /// Whether the release is marked as a pre-release.
    pub is_prerelease: bool,
}

/// Fields a manifest contributes, before they are joined with local state.
#[derive(Debug, Clone)]
struct RemoteRelease {
    title: Option<String>,
    source_url: String,
    new_version: String,
    compatible_versions: Option<Vec<String>>,
    is_prerelease: bool,
}

fn malformed(target: &str, reason: impl Into<String>) -> UpgradeError {
    UpgradeError::ManifestMalformed {
        target: target.to_string(),
        reason: reason.into(),
    }
}

/// Parse a releases-API manifest body.
///
/// Drafts are never eligible, regardless of any other field.
fn parse_releases_api(target: &str, body: &str) -> Result<RemoteRelease, UpgradeError> {
    let value: Value = serde_json::from_str(body).map_err(|e| malformed(target, e.to_string()))?;

    if value.get("draft").and_then(Value::as_bool).unwrap_or(false) {
        return Err(UpgradeError::DraftOrIneligible {
            target: target.to_string(),
        });
    }

    let tag = value
        .get("tag_name")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(target, "missing tag_name"))?;

    let source_url = value
        .get("assets")
        .and_then(|assets| assets.get(0))
        .and_then(|asset| asset.get("browser_download_url"))
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(target, "release has no downloadable asset"))?
        .to_string();

    Ok(RemoteRelease {
        title: value.get("name").and_then(Value::as_str).map(ToString::to_string),
        source_url,
        new_version: version::normalize(tag),
        compatible_versions: None,
        is_prerelease: value.get("prerelease").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// Parse a custom manifest body.
///
/// `s_compatible` is carried only when present and non-blank after trimming.
fn parse_custom(target: &str, body: &str) -> Result<RemoteRelease, UpgradeError> {
    let value: Value = serde_json::from_str(body).map_err(|e| malformed(target, e.to_string()))?;

    let source_url = value
        .get("s_source_file")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(target, "missing s_source_file"))?
        .to_string();

    let raw_version = value
        .get("s_version")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(target, "missing s_version"))?;

    let compatible_versions = value
        .get("s_compatible")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|csv| {
            csv.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        });

    Ok(RemoteRelease {
        title: None,
        source_url,
        new_version: version::normalize(raw_version),
        compatible_versions,
        is_prerelease: false,
    })
}

/// Validate a declared update URI at the trust boundary: it must parse as an
/// absolute http(s) URL before anything is fetched from it.
fn validate_update_uri(target: &str, uri: &str) -> Result<Url, UpgradeError> {
    let invalid = || UpgradeError::InvalidUpdateUri {
        target: target.to_string(),
        uri: uri.to_string(),
    };
    let url = Url::parse(uri).map_err(|_| invalid())?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid());
    }
    Ok(url)
}

/// Resolves upgrade targets into [`PackageInfo`] records.
///
/// All collaborators are injected explicitly; a resolver is constructed per
/// operation, not shared process-wide.
pub struct PackageResolver<'a, S: RemoteSource> {
    source: &'a S,
    catalog: &'a dyn PluginCatalog,
    registry: VersionRegistry<'a>,
    settings: &'a Settings,
}

impl<'a, S: RemoteSource> PackageResolver<'a, S> {
    /// Resolver over the given collaborators.
    pub fn new(
        source: &'a S,
        catalog: &'a dyn PluginCatalog,
        registry: VersionRegistry<'a>,
        settings: &'a Settings,
    ) -> Self {
        Self {
            source,
            catalog,
            registry,
            settings,
        }
    }

    /// Resolve a target into a fresh [`PackageInfo`].
    pub async fn resolve(&self, target: &UpgradeTarget) -> Result<PackageInfo, UpgradeError> {
        match target {
            UpgradeTarget::Core => self.resolve_core().await,
            UpgradeTarget::Plugin(short_name) => self.resolve_plugin(short_name).await,
        }
    }

    async fn fetch_manifest_body(&self, target: &str, url: &Url) -> Result<String, UpgradeError> {
        match self.source.fetch_manifest(url.as_str()).await {
            Ok(body) => Ok(body),
            Err(UpgradeError::EmptyResponse { .. }) => Err(UpgradeError::ManifestUnavailable {
                target: target.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn resolve_core(&self) -> Result<PackageInfo, UpgradeError> {
        let url = validate_update_uri(CORE_SHORT_NAME, &self.settings.core.manifest_url)?;
        let dialect = ManifestDialect::for_url(&url);
        debug!(url = %url, ?dialect, "Resolving core release manifest");

        let body = self.fetch_manifest_body(CORE_SHORT_NAME, &url).await?;
        let release = match dialect {
            ManifestDialect::ReleasesApi => parse_releases_api(CORE_SHORT_NAME, &body)?,
            ManifestDialect::Custom => parse_custom(CORE_SHORT_NAME, &body)?,
        };

        let installed_version = match self.registry.get(CORE_SHORT_NAME)? {
            Some(v) => v,
            None => {
                warn!("No installed core version recorded; treating as 0.0.0");
                "0.0.0".to_string()
            }
        };

        Ok(PackageInfo {
            title: release.title.unwrap_or_else(|| CORE_SHORT_NAME.to_string()),
            short_name: CORE_SHORT_NAME.to_string(),
            source_url: release.source_url,
            new_version: release.new_version,
            installed_version,
            target_directory: self.settings.root.clone(),
            excluded_paths: self.settings.excluded_paths(),
            compatible_versions: release.compatible_versions,
            is_prerelease: release.is_prerelease,
        })
    }

    async fn resolve_plugin(&self, short_name: &str) -> Result<PackageInfo, UpgradeError> {
        let descriptor = self.catalog.info(short_name)?;

        let uri = descriptor.update_uri.as_deref().ok_or_else(|| {
            UpgradeError::InvalidUpdateUri {
                target: short_name.to_string(),
                uri: "(not declared)".to_string(),
            }
        })?;
        let url = validate_update_uri(short_name, uri)?;
        let dialect = ManifestDialect::for_url(&url);
        debug!(plugin = short_name, url = %url, ?dialect, "Resolving plugin manifest");

        let body = self.fetch_manifest_body(short_name, &url).await?;
        let release = match dialect {
            ManifestDialect::ReleasesApi => parse_releases_api(short_name, &body)?,
            ManifestDialect::Custom => parse_custom(short_name, &body)?,
        };

        // Registry entry wins over the shipped metadata when both exist;
        // after a successful install the two agree again.
        let installed_version = match self.registry.get(short_name)? {
            Some(v) => v,
            None => descriptor.installed_version,
        };

        Ok(PackageInfo {
            title: descriptor.title,
            short_name: short_name.to_string(),
            source_url: release.source_url,
            new_version: release.new_version,
            installed_version,
            // Whatever the archive contains is confined to the plugin's own
            // directory; the manifest has no say in where files land.
            target_directory: descriptor.directory,
            excluded_paths: Vec::new(),
            compatible_versions: release.compatible_versions,
            is_prerelease: release.is_prerelease,
        })
    }
}
