//! Agent Configuration
//!
//! Explicit configuration value built once at startup from the environment
//! (after `.env` is loaded). Defaults live in `constants.rs`.

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;
use crate::logic::error::ConfigError;
use crate::logic::policy::PolicyCategory;
use crate::logic::storage::default_data_dir;

/// OS mechanism used to block websites
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebsiteBackend {
    /// Managed section of a hosts file
    Hosts(PathBuf),
    /// Chrome managed-policy `URLBlocklist` file
    BrowserPolicy(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub data_dir: PathBuf,
    pub website_interval: Duration,
    pub software_interval: Duration,
    pub shutdown_grace: Duration,
    pub action_timeout: Duration,
    pub http_timeout: Duration,
    /// Zero disables compliance upload
    pub report_interval: Duration,
    pub worker_threads: usize,
    pub website_backend: WebsiteBackend,
    pub list_apps_command: String,
    pub uninstall_command: String,
    pub hostname: String,
}

impl AgentConfig {
    /// Defaults rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            website_interval: Duration::from_secs(DEFAULT_WEBSITE_INTERVAL),
            software_interval: Duration::from_secs(DEFAULT_SOFTWARE_INTERVAL),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE),
            action_timeout: Duration::from_secs(DEFAULT_ACTION_TIMEOUT),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT),
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL),
            worker_threads: DEFAULT_WORKER_THREADS,
            website_backend: WebsiteBackend::Hosts(PathBuf::from(DEFAULT_HOSTS_PATH)),
            list_apps_command: DEFAULT_LIST_APPS_COMMAND.to_string(),
            uninstall_command: DEFAULT_UNINSTALL_COMMAND.to_string(),
            hostname: local_hostname(),
        }
    }

    /// Build from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = match get(ENV_DATA_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir().ok_or(ConfigError::NoDataDir)?,
        };

        let mut config = Self::with_data_dir(data_dir);

        config.website_interval = secs(&get, ENV_WEBSITE_INTERVAL, DEFAULT_WEBSITE_INTERVAL)?;
        config.software_interval = secs(&get, ENV_SOFTWARE_INTERVAL, DEFAULT_SOFTWARE_INTERVAL)?;
        config.shutdown_grace = secs(&get, ENV_SHUTDOWN_GRACE, DEFAULT_SHUTDOWN_GRACE)?;
        config.action_timeout = secs(&get, ENV_ACTION_TIMEOUT, DEFAULT_ACTION_TIMEOUT)?;
        config.http_timeout = secs(&get, ENV_HTTP_TIMEOUT, DEFAULT_HTTP_TIMEOUT)?;
        config.report_interval = secs(&get, ENV_REPORT_INTERVAL, DEFAULT_REPORT_INTERVAL)?;

        if let Some(raw) = get(ENV_WORKER_THREADS) {
            let threads: usize = raw.parse().map_err(|_| invalid(ENV_WORKER_THREADS, "not a number"))?;
            config.worker_threads = threads.max(MIN_WORKER_THREADS);
        }

        config.website_backend = match get(ENV_WEBSITE_BACKEND).as_deref() {
            None | Some("hosts") => WebsiteBackend::Hosts(PathBuf::from(
                get(ENV_HOSTS_PATH).unwrap_or_else(|| DEFAULT_HOSTS_PATH.to_string()),
            )),
            Some("browser-policy") => WebsiteBackend::BrowserPolicy(PathBuf::from(
                get(ENV_BROWSER_POLICY_PATH).unwrap_or_else(|| DEFAULT_BROWSER_POLICY_PATH.to_string()),
            )),
            Some(other) => {
                return Err(invalid(
                    ENV_WEBSITE_BACKEND,
                    &format!("unknown backend '{}' (expected hosts or browser-policy)", other),
                ))
            }
        };

        if let Some(cmd) = get(ENV_LIST_APPS_COMMAND) {
            config.list_apps_command = cmd;
        }
        if let Some(cmd) = get(ENV_UNINSTALL_COMMAND) {
            config.uninstall_command = cmd;
        }

        config.validate()?;
        Ok(config)
    }

    /// Sync cadence of `category`
    pub fn interval(&self, category: PolicyCategory) -> Duration {
        match category {
            PolicyCategory::Website => self.website_interval,
            PolicyCategory::Software => self.software_interval,
        }
    }

    /// Upload cadence, `None` when disabled
    pub fn report_every(&self) -> Option<Duration> {
        (!self.report_interval.is_zero()).then_some(self.report_interval)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (var, value) in [
            (ENV_WEBSITE_INTERVAL, self.website_interval),
            (ENV_SOFTWARE_INTERVAL, self.software_interval),
            (ENV_ACTION_TIMEOUT, self.action_timeout),
            (ENV_HTTP_TIMEOUT, self.http_timeout),
        ] {
            if value.is_zero() {
                return Err(invalid(var, "must be greater than zero"));
            }
        }

        if !self.uninstall_command.contains("{name}") && !self.uninstall_command.contains("{location}") {
            return Err(invalid(ENV_UNINSTALL_COMMAND, "must reference {name} or {location}"));
        }

        Ok(())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn secs<G>(get: &G, var: &str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| invalid(var, "expected whole seconds")),
    }
}

fn invalid(var: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

// ============================================================================
// TESTS
// ============================================================================
