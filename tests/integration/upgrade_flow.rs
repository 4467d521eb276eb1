//! End-to-end upgrade scenarios through the public library API.

use oscup::installer::{InstallOptions, PackageInstaller, UpgradePhase, UpgradeStatus};
use oscup::manifest::{PackageResolver, UpgradeTarget};
use oscup::migrator::{SqlExecutor, SqliteExecutor};
use oscup::plugins::{DirectoryCatalog, PluginCatalog};
use oscup::registry::{PreferenceStore, VersionRegistry};
use oscup::test_utils::{InMemorySource, TempInstall, releases_manifest, zip_archive};
use oscup::version;

const ASSET_URL: &str =
    "https://github.com/mindstellar/osclass/releases/download/v3.5.0/osclass.zip";

fn core_zip() -> Vec<u8> {
    zip_archive(&[
        ("index.php", b"<?php // core 3.5.0".as_slice()),
        (
            "oc-includes/osclass/installer/struct.sql",
            b"CREATE TABLE IF NOT EXISTS /*TABLE_PREFIX*/t_preference (pk_s_name TEXT PRIMARY KEY, s_value TEXT);\n".as_slice(),
        ),
        ("oc-content/themes/shipped.css", b"body{}".as_slice()),
    ])
}

#[tokio::test]
async fn core_upgrade_from_3_4_0_to_3_5_0_lands_in_the_registry() {
    let install = TempInstall::new();
    VersionRegistry::new(&install.store).set("osclass", "3.4.0").unwrap();

    let source = InMemorySource::new()
        .with_manifest(
            &install.settings.core.manifest_url,
            &releases_manifest("v3.5.0", ASSET_URL),
        )
        .with_archive(ASSET_URL, core_zip());
    let catalog = DirectoryCatalog::new(install.settings.plugins_dir(), &install.store);
    let executor = SqliteExecutor::in_memory().unwrap();
    let installer = PackageInstaller::new(
        &source,
        &catalog,
        &install.store,
        &install.settings,
        InstallOptions::default(),
    );

    let report = installer
        .install(&UpgradeTarget::Core, Some(&executor as &dyn SqlExecutor))
        .await;

    assert!(matches!(report.status, UpgradeStatus::Completed), "{}", report.message());
    assert_eq!(report.phase, UpgradePhase::Done);
    assert_eq!(
        VersionRegistry::new(&install.store).get("osclass").unwrap().as_deref(),
        Some("3.5.0")
    );
    // User config and content were never written.
    assert_eq!(install.read_file("config.php"), b"<?php // live credentials\n");
    assert_eq!(install.read_file("oc-content/uploads/photo.jpg"), b"jpeg-bytes");
    assert!(!install.exists("oc-content/themes/shipped.css"));
}

#[tokio::test]
async fn matching_versions_stop_at_checking_with_no_archive_fetch() {
    let install = TempInstall::new();
    VersionRegistry::new(&install.store).set("osclass", "3.4.0").unwrap();

    let source = InMemorySource::new()
        .with_manifest(
            &install.settings.core.manifest_url,
            &releases_manifest("v3.4.0", ASSET_URL),
        )
        .with_archive(ASSET_URL, core_zip());
    let catalog = DirectoryCatalog::new(install.settings.plugins_dir(), &install.store);
    let installer = PackageInstaller::new(
        &source,
        &catalog,
        &install.store,
        &install.settings,
        InstallOptions::default(),
    );

    let report = installer.install(&UpgradeTarget::Core, None).await;

    assert!(matches!(report.status, UpgradeStatus::AlreadyUpToDate));
    assert_eq!(report.phase, UpgradePhase::Checking);
    assert_eq!(source.archive_fetches(), 0);
    assert_eq!(
        VersionRegistry::new(&install.store).get("osclass").unwrap().as_deref(),
        Some("3.4.0")
    );
}

#[tokio::test]
async fn enabled_plugins_are_checked_in_bulk_in_their_configured_order() {
    let install = TempInstall::new();
    install.store.set("enabled_plugins", "maps,seo").unwrap();
    install.add_plugin("maps", "1.2.0", Some("https://updates.example.com/maps.json"));
    install.add_plugin("seo", "2.0.0", Some("https://updates.example.com/seo.json"));

    let source = InMemorySource::new()
        .with_manifest(
            "https://updates.example.com/maps.json",
            r#"{"s_source_file": "https://cdn.example.com/maps.zip", "s_version": "v1.3.0"}"#,
        )
        .with_manifest(
            "https://updates.example.com/seo.json",
            r#"{"s_source_file": "https://cdn.example.com/seo.zip", "s_version": "2.0.0"}"#,
        );
    let catalog = DirectoryCatalog::new(install.settings.plugins_dir(), &install.store);
    let resolver = PackageResolver::new(
        &source,
        &catalog,
        VersionRegistry::new(&install.store),
        &install.settings,
    );

    let mut updates = Vec::new();
    for short_name in catalog.list_enabled().unwrap() {
        let package = resolver
            .resolve(&UpgradeTarget::Plugin(short_name.clone()))
            .await
            .unwrap();
        let newer = version::is_newer(&package.new_version, &package.installed_version).unwrap();
        updates.push((short_name, newer));
    }

    assert_eq!(
        updates,
        vec![("maps".to_string(), true), ("seo".to_string(), false)]
    );
}
