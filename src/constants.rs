//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Every default can be overridden through the environment (or a `.env` file),
//! see `logic::config::AgentConfig::from_env`.

/// Website blocklist sync interval (seconds)
pub const DEFAULT_WEBSITE_INTERVAL: u64 = 30 * 60;

/// Software blocklist sync interval (seconds)
pub const DEFAULT_SOFTWARE_INTERVAL: u64 = 60 * 60;

/// Grace period for in-flight cycles on shutdown (seconds)
pub const DEFAULT_SHUTDOWN_GRACE: u64 = 10;

/// Upper bound for a single enforcement action (seconds)
pub const DEFAULT_ACTION_TIMEOUT: u64 = 60;

/// HTTP request timeout (seconds)
pub const DEFAULT_HTTP_TIMEOUT: u64 = 30;

/// Compliance upload interval (seconds, 0 disables upload)
pub const DEFAULT_REPORT_INTERVAL: u64 = 15 * 60;

/// Runtime worker threads (never below `MIN_WORKER_THREADS`)
pub const DEFAULT_WORKER_THREADS: usize = 2;
pub const MIN_WORKER_THREADS: usize = 2;

/// Default hosts file used by the website filter
pub const DEFAULT_HOSTS_PATH: &str = "/etc/hosts";

/// Default Chrome managed policy file used by the browser-policy filter
pub const DEFAULT_BROWSER_POLICY_PATH: &str = "/etc/opt/chrome/policies/managed/compliance_blocklist.json";

/// Default software hook commands (dpkg/apt), run through `sh -c`.
/// List output: one app per line, `name<TAB>location` (location optional).
pub const DEFAULT_LIST_APPS_COMMAND: &str =
    r"dpkg-query -W -f='${db:Status-Abbrev}\t${Package}\n' | awk -F'\t' '$1 ~ /^ii/ {print $2}'";
/// `{name}` and `{location}` are substituted (shell-quoted) per app
pub const DEFAULT_UNINSTALL_COMMAND: &str = "apt-get remove -y {name}";

/// Data directory name under the platform local data dir
pub const DATA_DIR_NAME: &str = "compliance-agent";

/// File names inside the data directory
pub const CREDENTIALS_FILE: &str = "credentials.json";
pub const POLICY_CACHE_PREFIX: &str = "policy_cache_";
pub const DEVICE_STATE_PREFIX: &str = "enforced_";
pub const BROWSER_POLICY_LEDGER_FILE: &str = "browser_policy_managed.json";

/// Sink address used for blocked domains in the hosts file
pub const HOSTS_SINK_ADDRESS: &str = "0.0.0.0";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "compliance-agent";

// ============================================
// Environment variable names
// ============================================

pub const ENV_DATA_DIR: &str = "COMPLIANCE_DATA_DIR";
pub const ENV_ENDPOINT: &str = "COMPLIANCE_ENDPOINT";
pub const ENV_API_KEY: &str = "COMPLIANCE_API_KEY";
pub const ENV_WEBSITE_INTERVAL: &str = "COMPLIANCE_WEBSITE_INTERVAL";
pub const ENV_SOFTWARE_INTERVAL: &str = "COMPLIANCE_SOFTWARE_INTERVAL";
pub const ENV_SHUTDOWN_GRACE: &str = "COMPLIANCE_SHUTDOWN_GRACE";
pub const ENV_ACTION_TIMEOUT: &str = "COMPLIANCE_ACTION_TIMEOUT";
pub const ENV_HTTP_TIMEOUT: &str = "COMPLIANCE_HTTP_TIMEOUT";
pub const ENV_REPORT_INTERVAL: &str = "COMPLIANCE_REPORT_INTERVAL";
pub const ENV_WORKER_THREADS: &str = "COMPLIANCE_WORKER_THREADS";
pub const ENV_WEBSITE_BACKEND: &str = "COMPLIANCE_WEBSITE_BACKEND";
pub const ENV_HOSTS_PATH: &str = "COMPLIANCE_HOSTS_PATH";
pub const ENV_BROWSER_POLICY_PATH: &str = "COMPLIANCE_BROWSER_POLICY_PATH";
pub const ENV_LIST_APPS_COMMAND: &str = "COMPLIANCE_LIST_APPS_COMMAND";
pub const ENV_UNINSTALL_COMMAND: &str = "COMPLIANCE_UNINSTALL_COMMAND";
