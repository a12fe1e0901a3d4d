//! Test doubles shared by unit tests: in-memory OS hooks, a scripted
//! PolicySource and a scripted Enforceable.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::logic::enforcement::{
    ActionKind, AppLifecycle, DomainFilter, Enforceable, EnforcementAction, InstalledApp,
};
use crate::logic::error::{EnforcementError, FetchError};
use crate::logic::policy::{PolicyCategory, PolicyRule, PolicySnapshot, PolicySource, RuleEntry};

// ============================================================================
// OS HOOKS
// ============================================================================

#[derive(Default)]
pub struct MemoryDomainFilter {
    blocked: Mutex<BTreeSet<String>>,
    block_calls: AtomicUsize,
    unblock_calls: AtomicUsize,
}

impl MemoryDomainFilter {
    pub fn blocked(&self) -> Vec<String> {
        self.blocked.lock().iter().cloned().collect()
    }

    pub fn block_calls(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }

    pub fn unblock_calls(&self) -> usize {
        self.unblock_calls.load(Ordering::SeqCst)
    }

    /// Remove a block behind the agent's back
    pub fn tamper(&self, domain: &str) {
        self.blocked.lock().remove(domain);
    }
}

impl DomainFilter for MemoryDomainFilter {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_blocked(&self, domain: &str) -> Result<bool, EnforcementError> {
        Ok(self.blocked.lock().contains(domain))
    }

    fn block_domain(&self, domain: &str) -> Result<(), EnforcementError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        self.blocked.lock().insert(domain.to_string());
        Ok(())
    }

    fn unblock_domain(&self, domain: &str) -> Result<(), EnforcementError> {
        self.unblock_calls.fetch_add(1, Ordering::SeqCst);
        self.blocked.lock().remove(domain);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryApps {
    apps: Mutex<Vec<InstalledApp>>,
    uninstall_calls: AtomicUsize,
    deny: AtomicBool,
}

impl MemoryApps {
    pub fn with(apps: Vec<InstalledApp>) -> Self {
        Self {
            apps: Mutex::new(apps),
            ..Default::default()
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.apps.lock().iter().map(|a| a.name.clone()).collect()
    }

    pub fn install(&self, app: InstalledApp) {
        self.apps.lock().push(app);
    }

    pub fn uninstall_calls(&self) -> usize {
        self.uninstall_calls.load(Ordering::SeqCst)
    }

    pub fn deny_uninstall(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }
}

impl AppLifecycle for MemoryApps {
    fn list_installed(&self) -> Result<Vec<InstalledApp>, EnforcementError> {
        Ok(self.apps.lock().clone())
    }

    fn uninstall(&self, app: &InstalledApp) -> Result<(), EnforcementError> {
        self.uninstall_calls.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(EnforcementError::PermissionDenied(format!("uninstall {}", app.name)));
        }
        self.apps.lock().retain(|a| a != app);
        Ok(())
    }
}

// ============================================================================
// POLICY SOURCE
// ============================================================================

/// PolicySource with scripted responses per category and a fetch counter.
/// Unscripted categories return an empty rule set.
#[derive(Default)]
pub struct ScriptedSource {
    responses: Mutex<HashMap<PolicyCategory, Result<Vec<RuleEntry>, FetchError>>>,
    fetches: Mutex<HashMap<PolicyCategory, usize>>,
    gates: Mutex<HashMap<PolicyCategory, Arc<Semaphore>>>,
    delays: Mutex<HashMap<PolicyCategory, Duration>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rules(&self, category: PolicyCategory, entries: Vec<RuleEntry>) {
        self.responses.lock().insert(category, Ok(entries));
    }

    /// Serve `patterns` as active rules
    pub fn set_active(&self, category: PolicyCategory, patterns: &[&str]) {
        self.set_rules(category, patterns.iter().map(|p| RuleEntry::active(*p)).collect());
    }

    pub fn fail(&self, category: PolicyCategory, err: FetchError) {
        self.responses.lock().insert(category, Err(err));
    }

    pub fn fetch_count(&self, category: PolicyCategory) -> usize {
        self.fetches.lock().get(&category).copied().unwrap_or(0)
    }

    /// Make fetches of `category` wait for a permit on the returned semaphore
    pub fn hold(&self, category: PolicyCategory) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.lock().insert(category, Arc::clone(&gate));
        gate
    }

    /// Make every fetch of `category` take `delay`
    pub fn set_delay(&self, category: PolicyCategory, delay: Duration) {
        self.delays.lock().insert(category, delay);
    }
}

#[async_trait]
impl PolicySource for ScriptedSource {
    async fn fetch_rules(
        &self,
        category: PolicyCategory,
        _active_only: bool,
    ) -> Result<PolicySnapshot, FetchError> {
        *self.fetches.lock().entry(category).or_default() += 1;

        let gate = self.gates.lock().get(&category).cloned();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let delay = self.delays.lock().get(&category).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .responses
            .lock()
            .get(&category)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()));
        let count = self.fetch_count(category);

        response.map(|entries| {
            PolicySnapshot::new(category, format!("test-{}", count), Utc::now(), entries)
        })
    }
}

// ============================================================================
// ENFORCER
// ============================================================================

/// Enforceable that records applied actions and fails chosen targets
pub struct ScriptedEnforcer {
    category: PolicyCategory,
    failing: Mutex<HashSet<String>>,
    drifted: Mutex<HashSet<String>>,
    applied: Mutex<Vec<(ActionKind, String)>>,
    attempts: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedEnforcer {
    pub fn new(category: PolicyCategory) -> Self {
        Self {
            category,
            failing: Mutex::new(HashSet::new()),
            drifted: Mutex::new(HashSet::new()),
            applied: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            delay: Mutex::new(None),
        }
    }

    pub fn fail_on(&self, target: &str) {
        self.failing.lock().insert(target.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Report `target` as no longer enforced until it is applied again
    pub fn drift(&self, target: &str) {
        self.drifted.lock().insert(target.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Successfully applied actions, in order
    pub fn applied(&self) -> Vec<(ActionKind, String)> {
        self.applied.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Enforceable for ScriptedEnforcer {
    fn category(&self) -> PolicyCategory {
        self.category
    }

    async fn apply(&self, action: &EnforcementAction) -> Result<(), EnforcementError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(&action.target) {
            return Err(EnforcementError::PermissionDenied(action.target.clone()));
        }

        self.drifted.lock().remove(&action.target);
        self.applied.lock().push((action.kind, action.target.clone()));
        Ok(())
    }

    async fn is_enforced(&self, rule: &PolicyRule) -> Result<bool, EnforcementError> {
        Ok(!self.drifted.lock().contains(rule.pattern()))
    }
}
