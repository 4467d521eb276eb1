//! oscup - upgrade manager for self-hosted Osclass classifieds installs.
//!
//! oscup keeps an install of the classifieds platform and its plugins up to
//! date: it resolves remote release manifests, downloads and stages release
//! archives, selectively replaces live files while preserving user
//! configuration and content, applies the shipped schema migration, and
//! records installed versions in a persisted preference store.
//!
//! # Architecture Overview
//!
//! One upgrade is a linear state machine
//! (`CHECKING → DOWNLOADING → STAGING → REPLACING → MIGRATING → FINALIZING`)
//! driven by [`installer::PackageInstaller`]. Everything the machine touches
//! is behind a narrow seam so the surrounding platform stays an external
//! collaborator:
//!
//! - [`fetcher::RemoteSource`] — manifest and archive fetches over HTTP(S)
//! - [`plugins::PluginCatalog`] — plugin enumeration and metadata lookup
//! - [`registry::PreferenceStore`] — the persisted key-value store holding
//!   version markers and update flags
//! - [`migrator::SqlExecutor`] — raw statement execution on the live database
//!
//! ## Key guarantees
//!
//! - **Check before touch**: resolver and fetcher failures abort before any
//!   live file changes; those operations are always safe to retry.
//! - **Staged installs**: archives are extracted and layout-checked in a
//!   temporary tree, never on top of the live install.
//! - **User data survives**: paths on the exclusion list are never written,
//!   and live files absent from a release are never deleted.
//! - **Journaled replacement**: every write is journaled with a pre-copy
//!   backup, so a failed upgrade can be rolled back.
//! - **One upgrade per target**: per-target file locks fail a concurrent
//!   attempt fast, and plugin installs never interleave with a core
//!   replacement.
//! - **Structured outcomes**: every operation ends in an
//!   [`installer::UpgradeReport`], never an unhandled crash.
//!
//! # Core Modules
//!
//! - [`manifest`] - manifest dialects, package resolution
//! - [`fetcher`] - HTTP fetching with timeouts and bounded retry
//! - [`installer`] - the upgrade state machine, staging, replacement,
//!   journal and locks
//! - [`migrator`] - schema-script splitting and best-effort batch execution
//! - [`registry`] - preference store and installed-version registry
//! - [`plugins`] - plugin metadata catalog
//! - [`config`] - per-install settings (`oscup.toml`)
//! - [`cli`] - the `oscup` command-line interface

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod fetcher;
pub mod installer;
pub mod manifest;
pub mod migrator;
pub mod plugins;
pub mod registry;
pub mod version;

// Shared fixtures for unit tests and the integration suite.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
