//! Global constants used throughout the oscup codebase.
//!
//! Timeout durations, retry parameters, well-known preference keys and the
//! fixed identity of the core package live here so magic values stay
//! discoverable and consistent across modules.

/// Short name identifying the core application as an upgrade target.
pub const CORE_SHORT_NAME: &str = "osclass";

/// Release manifest consulted for core upgrades unless overridden in settings.
pub const CORE_MANIFEST_URL: &str =
    "https://api.github.com/repos/mindstellar/osclass/releases/latest";

/// Host that marks a manifest URL as speaking the releases-API dialect.
pub const RELEASES_API_HOST: &str = "api.github.com";

/// Paths under the install root that an upgrade must never overwrite.
pub const DEFAULT_EXCLUDED_PATHS: &[&str] = &["oc-content", "config.php"];

/// Directory expected at the root of a core release archive.
pub const CORE_LAYOUT_MARKER: &str = "oc-includes";

/// Schema migration script shipped inside the core package, relative to the
/// install root.
pub const SCHEMA_SCRIPT_REL: &str = "oc-includes/osclass/installer/struct.sql";

/// Plugins directory relative to the install root.
pub const PLUGINS_DIR_REL: &str = "oc-content/plugins";

/// Metadata file each plugin ships in its own directory.
pub const PLUGIN_MANIFEST_FILE: &str = "plugin.toml";

/// State directory (locks, journals, backups, preference store) relative to
/// the install root.
pub const STATE_DIR_REL: &str = ".oscup";

/// Preference key flagging that a newer core release exists.
pub const UPDATE_CORE_AVAILABLE_KEY: &str = "update_core_available";

/// Preference key holding the ordered CSV of enabled plugin short names.
pub const ENABLED_PLUGINS_KEY: &str = "enabled_plugins";

/// Placeholder token substituted with the live table prefix before schema
/// statements are executed.
pub const TABLE_PREFIX_TOKEN: &str = "/*TABLE_PREFIX*/";

/// Preference keys retired by the 3.9.0 schema; deleted when an upgrade
/// crosses that boundary.
pub const RETIRED_MARKET_KEYS: &[&str] = &[
    "marketAllowExternalSources",
    "marketURL",
    "marketAPIConnect",
    "marketCategories",
    "marketDataUpdate",
];

/// Timeout for manifest fetches (seconds).
pub const MANIFEST_TIMEOUT_SECS: u64 = 30;

/// Default timeout for archive downloads (seconds); configurable since
/// archives scale with release size.
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Maximum fetch attempts for transient transport failures.
pub const FETCH_ATTEMPTS: u32 = 3;

/// Starting delay for exponential backoff between fetch attempts (ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 250;

/// Maximum backoff delay between fetch attempts (ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 4_000;

/// User agent sent with every outbound request.
pub const USER_AGENT: &str = concat!("oscup/", env!("CARGO_PKG_VERSION"));
