//! The upgrade state machine.
//!
//! An install runs through the phases
//! `CHECKING → DOWNLOADING → STAGING → REPLACING → MIGRATING (core only) →
//! FINALIZING → DONE`, and every phase can end the operation in a recorded
//! failure instead. Whatever happens, the caller gets a structured
//! [`UpgradeReport`] — success, "already up to date", or the failure with the
//! phase reached and the paths already written. Nothing here panics its way
//! out to the operator.
//!
//! Ordering guarantees:
//! - nothing is downloaded before the version comparison decides an upgrade
//!   is actually due (or `--force` says so);
//! - per-target locks are taken before the download and held through
//!   finalization; a contended lock is an immediate
//!   [`UpgradeError::AlreadyInProgress`] failure;
//! - live files only change during REPLACING, always from a staged and
//!   layout-verified tree, and every write is journaled first.

pub mod journal;
pub mod lock;
pub mod replace;
pub mod staging;


use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::Settings;
use crate::constants::{CORE_SHORT_NAME, RETIRED_MARKET_KEYS, UPDATE_CORE_AVAILABLE_KEY};
use crate::core::UpgradeError;
use crate::fetcher::RemoteSource;
use crate::installer::journal::ReplaceJournal;
use crate::installer::lock::{CORE_LOCK_NAME, TargetLock};
use crate::installer::replace::replace_tree;
use crate::installer::staging::stage_archive;
use crate::manifest::{PackageInfo, PackageResolver, UpgradeTarget};
use crate::migrator::{MigrationResult, SchemaMigrator, SqlExecutor};
use crate::plugins::PluginCatalog;
use crate::registry::{PreferenceStore, VersionRegistry};
use crate::version;

/// Phases of one upgrade operation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UpgradePhase {
    /// Resolve the manifest and compare versions.
    Checking,
    /// Fetch the release archive.
    Downloading,
    /// Extract and verify the archive outside the live tree.
    Staging,
    /// Copy staged files into the live tree.
    Replacing,
    /// Apply the shipped schema script (core only).
    Migrating,
    /// Record the new version and run the post-install hook.
    Finalizing,
    /// Operation complete.
    Done,
}

impl fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::Staging => "staging",
            Self::Replacing => "replacing",
            Self::Migrating => "migrating",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Terminal status of one upgrade operation.
#[derive(Debug)]
pub enum UpgradeStatus {
    /// The target was upgraded.
    Completed,
    /// No newer version exists; nothing was downloaded or written.
    AlreadyUpToDate,
    /// The operation stopped with a recorded failure.
    Failed(UpgradeError),
}

/// Structured outcome of one upgrade operation.
#[derive(Debug)]
pub struct UpgradeReport {
    /// Target short name.
    pub short_name: String,
    /// Version installed before the operation, once known.
    pub installed_version: Option<String>,
    /// Version offered by the manifest, once known.
    pub new_version: Option<String>,
    /// Phase the operation reached.
    pub phase: UpgradePhase,
    /// Terminal status.
    pub status: UpgradeStatus,
    /// SHA-256 of the downloaded archive, once downloaded.
    pub archive_sha256: Option<String>,
    /// Relative paths written into the live tree, in copy order. On a
    /// replacement failure this is the partial list, for manual recovery.
    pub copied: Vec<PathBuf>,
    /// Schema migration outcome, when the migration step ran.
    pub migration: Option<MigrationResult>,
}

impl UpgradeReport {
    fn new(target: &UpgradeTarget) -> Self {
        Self {
            short_name: target.short_name().to_string(),
            installed_version: None,
            new_version: None,
            phase: UpgradePhase::Checking,
            status: UpgradeStatus::Completed,
            archive_sha256: None,
            copied: Vec::new(),
            migration: None,
        }
    }

    fn failed(mut self, error: UpgradeError) -> Self {
        self.status = UpgradeStatus::Failed(error);
        self
    }

    /// Whether the operation ended without a failure.
    pub fn is_success(&self) -> bool {
        !matches!(self.status, UpgradeStatus::Failed(_))
    }

    /// One-line human summary of the outcome.
    pub fn message(&self) -> String {
        let unknown = || "unknown".to_string();
        match &self.status {
            UpgradeStatus::Completed => format!(
                "'{}' upgraded from {} to {}",
                self.short_name,
                self.installed_version.clone().unwrap_or_else(unknown),
                self.new_version.clone().unwrap_or_else(unknown),
            ),
            UpgradeStatus::AlreadyUpToDate => format!(
                "'{}' is already up to date ({})",
                self.short_name,
                self.installed_version.clone().unwrap_or_else(unknown),
            ),
            UpgradeStatus::Failed(error) => format!(
                "Upgrade of '{}' failed during {}: {error}",
                self.short_name, self.phase
            ),
        }
    }
}

/// Caller-selected behavior switches for one install.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Install even when the available version is not strictly newer.
    pub force: bool,
    /// Skip the schema migration step entirely.
    pub skip_db: bool,
    /// Treat failed schema statements as non-fatal (operator reviewed them).
    pub proceed_on_schema_errors: bool,
}

/// Drives the upgrade state machine for one target at a time.
///
/// All collaborators are injected; construct one per operation.
pub struct PackageInstaller<'a, S: RemoteSource> {
    source: &'a S,
    catalog: &'a dyn PluginCatalog,
    prefs: &'a dyn PreferenceStore,
    settings: &'a Settings,
    options: InstallOptions,
}

impl<'a, S: RemoteSource> PackageInstaller<'a, S> {
    /// Installer over the given collaborators.
    pub fn new(
        source: &'a S,
        catalog: &'a dyn PluginCatalog,
        prefs: &'a dyn PreferenceStore,
        settings: &'a Settings,
        options: InstallOptions,
    ) -> Self {
        Self {
            source,
            catalog,
            prefs,
            settings,
            options,
        }
    }

    /// Locks held for the duration of DOWNLOADING through FINALIZING.
    ///
    /// Core holds the core lock exclusively; a plugin holds it shared plus
    /// its own exclusive lock, so plugins never interleave with a core file
    /// replacement but do run concurrently with each other.
    fn acquire_locks(&self, target: &UpgradeTarget) -> Result<Vec<TargetLock>, UpgradeError> {
        let locks_dir = self.settings.state_dir().join("locks");
        match target {
            UpgradeTarget::Core => Ok(vec![TargetLock::acquire_exclusive(
                &locks_dir,
                CORE_LOCK_NAME,
                CORE_SHORT_NAME,
            )?]),
            UpgradeTarget::Plugin(short_name) => {
                let core_gate =
                    TargetLock::acquire_shared(&locks_dir, CORE_LOCK_NAME, CORE_SHORT_NAME)?;
                let own = TargetLock::acquire_exclusive(&locks_dir, short_name, short_name)?;
                Ok(vec![core_gate, own])
            }
        }
    }

    fn warn_if_incompatible(&self, info: &PackageInfo) {
        let Some(compatible) = &info.compatible_versions else {
            return;
        };
        let core_version = match VersionRegistry::new(self.prefs).get(CORE_SHORT_NAME) {
            Ok(Some(v)) => v,
            _ => return,
        };
        let listed = compatible
            .iter()
            .any(|c| version::normalize(c) == version::normalize(&core_version));
        if !listed {
            warn!(
                package = %info.short_name,
                %core_version,
                "Package does not declare compatibility with the installed core version"
            );
        }
    }

    /// Preference keys retired at the 3.9.0 schema are dropped when an
    /// upgrade crosses that boundary.
    fn prune_retired_preferences(&self, installed_version: &str) -> Result<(), UpgradeError> {
        let crossed = version::parse_lenient(installed_version)
            .map(|v| v < semver::Version::new(3, 9, 0))
            .unwrap_or(false);
        if crossed {
            for key in RETIRED_MARKET_KEYS {
                self.prefs.delete(key)?;
            }
        }
        Ok(())
    }

    /// Run the full upgrade state machine for `target`.
    ///
    /// `executor` is the live-database seam for the migration step; it is
    /// only consulted for core upgrades.
    pub async fn install(
        &self,
        target: &UpgradeTarget,
        executor: Option<&dyn SqlExecutor>,
    ) -> UpgradeReport {
        let mut report = UpgradeReport::new(target);

        // CHECKING: resolve remote state and decide whether an upgrade is due.
        let resolver = PackageResolver::new(
            self.source,
            self.catalog,
            VersionRegistry::new(self.prefs),
            self.settings,
        );
        let package = match resolver.resolve(target).await {
            Ok(package) => package,
            Err(e) => return report.failed(e),
        };
        report.installed_version = Some(package.installed_version.clone());
        report.new_version = Some(package.new_version.clone());

        let newer = match version::is_newer(&package.new_version, &package.installed_version) {
            Ok(newer) => newer,
            Err(e) => return report.failed(e),
        };
        if !newer && !self.options.force {
            info!(
                target = %package.short_name,
                version = %package.installed_version,
                "Already up to date"
            );
            report.status = UpgradeStatus::AlreadyUpToDate;
            return report;
        }
        self.warn_if_incompatible(&package);

        // Locks gate everything that touches the network or the tree.
        report.phase = UpgradePhase::Downloading;
        let _locks = match self.acquire_locks(target) {
            Ok(locks) => locks,
            Err(e) => return report.failed(e),
        };

        // DOWNLOADING
        let bytes = match self.source.fetch_archive(&package.source_url).await {
            Ok(bytes) => bytes,
            Err(UpgradeError::EmptyResponse { .. }) => {
                return report.failed(UpgradeError::CorruptArchive {
                    reason: "empty download".to_string(),
                });
            }
            Err(e) => return report.failed(e),
        };
        report.archive_sha256 = Some(hex::encode(Sha256::digest(&bytes)));

        // STAGING
        report.phase = UpgradePhase::Staging;
        let staged = match stage_archive(bytes, target).await {
            Ok(staged) => staged,
            Err(e) => return report.failed(e),
        };

        // REPLACING
        report.phase = UpgradePhase::Replacing;
        let journal = match ReplaceJournal::create(
            &self.settings.state_dir(),
            &package.short_name,
            &package.target_directory,
        ) {
            Ok(journal) => journal,
            Err(e) => return report.failed(e),
        };

        let target_dir = package.target_directory.clone();
        let excluded = package.excluded_paths.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut journal = journal;
            let staged = staged;
            let result = replace_tree(staged.install_root(), &target_dir, &excluded, &mut journal);
            (journal, result)
        })
        .await;
        let (journal, replaced) = match joined {
            Ok(pair) => pair,
            Err(e) => return report.failed(UpgradeError::Io(std::io::Error::other(e))),
        };
        match replaced {
            Ok(copied) => report.copied = copied,
            Err(failure) => {
                // Journal and backups stay on disk for `rollback`.
                report.copied = failure.copied;
                return report.failed(failure.error);
            }
        }

        // MIGRATING (core only)
        if target.is_core() && !self.options.skip_db {
            report.phase = UpgradePhase::Migrating;
            if let Some(executor) = executor {
                let script_path = self.settings.schema_script_path();
                if script_path.exists() {
                    let script = match std::fs::read_to_string(&script_path) {
                        Ok(script) => script,
                        Err(e) => return report.failed(UpgradeError::fs(&script_path, e)),
                    };
                    let result = SchemaMigrator::new(executor)
                        .apply(&script, &self.settings.database.table_prefix);
                    info!(%result, "Schema migration finished");
                    let clean = result.is_clean();
                    let failed = result.failed.clone();
                    report.migration = Some(result);
                    if !clean && !self.options.proceed_on_schema_errors {
                        return report.failed(UpgradeError::SchemaErrors { failed });
                    }
                } else {
                    warn!(path = %script_path.display(), "No schema script shipped; skipping migration");
                }
                if let Err(e) = self.prune_retired_preferences(&package.installed_version) {
                    return report.failed(e);
                }
            } else {
                warn!("No database executor provided; skipping schema migration");
            }
        }

        // FINALIZING
        report.phase = UpgradePhase::Finalizing;
        let registry = VersionRegistry::new(self.prefs);
        if let Err(e) = registry.set(&package.short_name, &package.new_version) {
            return report.failed(e);
        }
        let hook = match target {
            UpgradeTarget::Core => self.prefs.delete(UPDATE_CORE_AVAILABLE_KEY),
            UpgradeTarget::Plugin(short_name) => {
                self.prefs.set(&format!("{short_name}_update_available"), "0")
            }
        };
        if let Err(e) = hook {
            return report.failed(e);
        }
        if let Err(e) = journal.commit() {
            return report.failed(e);
        }

        report.phase = UpgradePhase::Done;
        report.status = UpgradeStatus::Completed;
        info!(
            target = %report.short_name,
            from = %package.installed_version,
            to = %package.new_version,
            "Upgrade complete"
        );
        report
    }
}
