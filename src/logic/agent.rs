//! Compliance Agent
//!
//! Wiring facade: credential store, remote client, policy cache, enforcers,
//! reconciliation engine, scheduler and compliance upload.
//!
//! Features:
//! - Platform hooks selected from `AgentConfig` (or injected)
//! - Background mode (`start` / `stop`) and one-shot mode (`run_once`)
//! - Credential reload without restart
//! - Headless enrollment from `COMPLIANCE_ENDPOINT` / `COMPLIANCE_API_KEY`

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::constants::{ENV_API_KEY, ENV_ENDPOINT};
use crate::logic::compliance::{run_upload_loop, ComplianceReporter, ComplianceSnapshot};
use crate::logic::config::{AgentConfig, WebsiteBackend};
use crate::logic::credentials::{CredentialStore, Credentials, FileCredentialStore};
use crate::logic::enforcement::{
    AppLifecycle, BrowserPolicyFilter, CommandAppLifecycle, DomainFilter, HostsFileFilter,
    SoftwareEnforcer, WebsiteEnforcer,
};
use crate::logic::error::{ConfigError, StoreError};
use crate::logic::policy::{PolicyCache, PolicyCategory};
use crate::logic::reconcile::{CycleReport, ReconciliationEngine};
use crate::logic::remote::RemoteClient;
use crate::logic::scheduler::{SyncScheduler, TriggerOutcome};

// ============================================================================
// AGENT
// ============================================================================

pub struct ComplianceAgent {
    config: AgentConfig,
    store: Arc<dyn CredentialStore>,
    remote: Arc<RemoteClient>,
    reporter: Arc<ComplianceReporter>,
    engine: Arc<ReconciliationEngine>,
    scheduler: SyncScheduler,
    upload: Mutex<Option<JoinHandle<()>>>,
}

impl ComplianceAgent {
    /// Agent with the file credential store and the OS hooks selected by `config`
    pub fn new(config: AgentConfig) -> Result<Self, ConfigError> {
        let store = Arc::new(FileCredentialStore::new(&config.data_dir));

        let filter: Arc<dyn DomainFilter> = match config.website_backend {
            WebsiteBackend::Hosts(ref path) => Arc::new(HostsFileFilter::new(path)),
            WebsiteBackend::BrowserPolicy(ref path) => {
                Arc::new(BrowserPolicyFilter::new(path, &config.data_dir))
            }
        };
        let apps = Arc::new(CommandAppLifecycle::new(
            &config.list_apps_command,
            &config.uninstall_command,
        ));

        Self::with_hooks(config, store, filter, apps)
    }

    /// Agent over injected credential store and OS hooks
    pub fn with_hooks(
        config: AgentConfig,
        store: Arc<dyn CredentialStore>,
        filter: Arc<dyn DomainFilter>,
        apps: Arc<dyn AppLifecycle>,
    ) -> Result<Self, ConfigError> {
        let remote = Arc::new(RemoteClient::new(store.get_credentials(), config.http_timeout)?);
        if !remote.is_configured() {
            log::warn!("Device not enrolled: policy fetches disabled until credentials are provided");
        }

        let cache = Arc::new(PolicyCache::open(&config.data_dir));
        let reporter = Arc::new(ComplianceReporter::default());

        let engine = ReconciliationEngine::builder(remote.clone(), cache, reporter.clone())
            .enforcer(Arc::new(WebsiteEnforcer::new(filter)))
            .enforcer(Arc::new(SoftwareEnforcer::new(apps)))
            .state_dir(&config.data_dir)
            .action_timeout(config.action_timeout)
            .build();
        let engine = Arc::new(engine);

        let mut scheduler = SyncScheduler::new(engine.clone()).with_shutdown_grace(config.shutdown_grace);
        for category in PolicyCategory::ALL {
            scheduler = scheduler.with_interval(category, config.interval(category));
        }

        Ok(Self {
            config,
            store,
            remote,
            reporter,
            engine,
            scheduler,
            upload: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Start the category timers and the compliance upload loop
    pub fn start(&self) {
        log::info!("Starting compliance agent on {}", self.config.hostname);
        self.scheduler.start();

        let Some(period) = self.config.report_every() else {
            log::info!("Compliance upload disabled");
            return;
        };

        let mut upload = self.upload.lock();
        if upload.is_none() {
            *upload = Some(tokio::spawn(run_upload_loop(
                self.remote.clone(),
                self.reporter.clone(),
                self.config.hostname.clone(),
                period,
                self.scheduler.shutdown_signal(),
            )));
        }
    }

    /// Stop timers, wait for in-flight cycles (bounded) and the upload loop
    pub async fn stop(&self) {
        self.scheduler.stop().await;

        let upload = self.upload.lock().take();
        if let Some(handle) = upload {
            let _ = handle.await;
        }
    }

    /// On-demand sync of one category
    pub fn sync_now(&self, category: PolicyCategory) -> TriggerOutcome {
        self.scheduler.trigger_now(category)
    }

    /// On-demand sync of every category
    pub fn sync_all(&self) -> Vec<(PolicyCategory, TriggerOutcome)> {
        self.engine
            .categories()
            .into_iter()
            .map(|c| (c, self.sync_now(c)))
            .collect()
    }

    /// Read-only compliance view for upstream telemetry
    pub fn compliance_snapshot(&self) -> ComplianceSnapshot {
        self.reporter.snapshot()
    }

    /// Re-read credentials (after re-enrollment). Returns true if they changed.
    pub fn reload_credentials(&self) -> bool {
        self.remote.reload(self.store.as_ref())
    }

    /// One cycle per category, concurrently, then a single compliance upload
    pub async fn run_once(&self) -> ComplianceSnapshot {
        let handles: Vec<JoinHandle<Option<CycleReport>>> = self
            .engine
            .categories()
            .into_iter()
            .map(|category| {
                let engine = self.engine.clone();
                tokio::spawn(async move { engine.run(category).await })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Sync cycle task failed: {}", e);
            }
        }

        let snapshot = self.reporter.snapshot();
        if self.config.report_every().is_some() && self.remote.is_configured() {
            if let Err(e) = self
                .remote
                .report_compliance(&self.config.hostname, snapshot.device)
                .await
            {
                log::warn!("Compliance upload failed: {}", e);
            }
        }
        snapshot
    }
}

// ============================================================================
// ENROLLMENT
// ============================================================================

/// Persist credentials given through the environment into `store`.
///
/// Returns true when new credentials were saved. Missing or partial
/// variables leave the store untouched.
pub fn enroll_from_env(store: &FileCredentialStore) -> Result<bool, StoreError> {
    let endpoint = std::env::var(ENV_ENDPOINT).unwrap_or_default();
    let key = std::env::var(ENV_API_KEY).unwrap_or_default();
    enroll(store, Credentials::new(endpoint, key))
}

fn enroll(store: &FileCredentialStore, credentials: Credentials) -> Result<bool, StoreError> {
    if !credentials.is_complete() {
        return Ok(false);
    }

    let current = match store.load() {
        Ok(current) => current,
        Err(e) => {
            log::warn!("Replacing unusable stored credentials: {}", e);
            None
        }
    };
    if current.as_ref() == Some(&credentials) {
        return Ok(false);
    }

    store.save(&credentials)?;
    Ok(true)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::compliance::{DeviceCompliance, SyncResult};
    use crate::logic::credentials::MemoryCredentialStore;
    use crate::logic::scheduler::SkipReason;
    use crate::logic::test_support::{MemoryApps, MemoryDomainFilter};

    fn agent(dir: &std::path::Path, store: Arc<MemoryCredentialStore>) -> ComplianceAgent {
        let mut config = AgentConfig::with_data_dir(dir);
        config.report_interval = std::time::Duration::ZERO;
        ComplianceAgent::with_hooks(
            config,
            store,
            Arc::new(MemoryDomainFilter::default()),
            Arc::new(MemoryApps::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unenrolled_run_once_reports_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(dir.path(), Arc::new(MemoryCredentialStore::default()));

        let snapshot = agent.run_once().await;
        assert_eq!(snapshot.device, DeviceCompliance::Unknown);
        assert_eq!(snapshot.categories.len(), 2);
        for status in snapshot.categories.values() {
            assert_eq!(status.last_result, SyncResult::StaleCache);
            assert_eq!(status.reason.as_deref(), Some("unconfigured"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(dir.path(), Arc::new(MemoryCredentialStore::default()));

        agent.start();
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        agent.stop().await;

        assert_eq!(agent.compliance_snapshot().categories.len(), 2);
        assert_eq!(
            agent.sync_now(PolicyCategory::Website),
            TriggerOutcome::Skipped(SkipReason::ShuttingDown)
        );
    }

    #[tokio::test]
    async fn test_reload_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryCredentialStore::default());
        let agent = agent(dir.path(), store.clone());
        assert!(!agent.reload_credentials());

        store.set(Some(Credentials::new("http://127.0.0.1:9", "k")));
        assert!(agent.reload_credentials());

        let snapshot = agent.run_once().await;
        let status = &snapshot.categories[&PolicyCategory::Website];
        assert_eq!(status.reason.as_deref(), Some("transport"));
    }

    #[test]
    fn test_enroll_saves_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        let creds = Credentials::new("https://policy.example.org", "k-1");

        assert!(enroll(&store, creds.clone()).unwrap());
        assert!(!enroll(&store, creds.clone()).unwrap());
        assert!(!enroll(&store, Credentials::new("", "")).unwrap());
        assert_eq!(store.get_credentials(), Some(creds));
    }
}
