//! Reconciliation Engine
//!
//! One cycle per category: fetch -> cache -> refresh + drift check -> plan ->
//! apply -> persist state -> record compliance.
//!
//! Features:
//! - Per-category exclusive lock held for the whole cycle (single-flight)
//! - Partial-failure isolation: every planned action is tried exactly once
//! - Stale-cache path on any fetch failure, without forcing enforcement
//! - Each action bounded by `action_timeout`; stops issuing actions on shutdown

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::plan::{pending_violations, plan_actions};
use super::state::{load_state, save_state, DeviceState};
use crate::constants::DEFAULT_ACTION_TIMEOUT;
use crate::logic::compliance::{ComplianceReporter, ComplianceStatus};
use crate::logic::enforcement::{ActionStatus, Enforceable, EnforcementAction};
use crate::logic::error::{EnforcementError, FetchError};
use crate::logic::policy::{PolicyCache, PolicyCategory, PolicyRule, PolicySnapshot, PolicySource};
use crate::logic::scheduler::ShutdownSignal;

// ============================================================================
// TYPES
// ============================================================================

/// Outcome of one category cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub category: PolicyCategory,
    pub actions: Vec<EnforcementAction>,
    pub status: ComplianceStatus,
}

impl CycleReport {
    pub fn applied(&self) -> usize {
        self.actions.iter().filter(|a| a.status.is_applied()).count()
    }

    pub fn failed(&self) -> usize {
        self.actions.iter().filter(|a| a.status.is_failed()).count()
    }
}

/// Exclusive right to run one cycle of a category.
///
/// Holds the category lock; dropping it releases the category.
pub struct CycleGuard {
    category: PolicyCategory,
    enforcer: Arc<dyn Enforceable>,
    state: OwnedMutexGuard<DeviceState>,
}

impl CycleGuard {
    pub fn category(&self) -> PolicyCategory {
        self.category
    }
}

/// Enforcer and device state of one category
struct Lane {
    enforcer: Arc<dyn Enforceable>,
    state: Arc<Mutex<DeviceState>>,
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct EngineBuilder {
    source: Arc<dyn PolicySource>,
    cache: Arc<PolicyCache>,
    reporter: Arc<ComplianceReporter>,
    enforcers: Vec<Arc<dyn Enforceable>>,
    state_dir: Option<PathBuf>,
    action_timeout: Duration,
}

impl EngineBuilder {
    /// Register the enforcer of its category
    pub fn enforcer(mut self, enforcer: Arc<dyn Enforceable>) -> Self {
        self.enforcers.push(enforcer);
        self
    }

    /// Persist DeviceState under `dir` (and restore it on build)
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn build(self) -> ReconciliationEngine {
        let mut lanes = HashMap::new();

        for enforcer in self.enforcers {
            let category = enforcer.category();
            let state = self
                .state_dir
                .as_deref()
                .map(|dir| load_state(dir, category))
                .unwrap_or_default();

            let lane = Lane {
                enforcer,
                state: Arc::new(Mutex::new(state)),
            };
            if lanes.insert(category, lane).is_some() {
                log::warn!("Duplicate {} enforcer registered; keeping the last one", category);
            }
        }

        ReconciliationEngine {
            source: self.source,
            cache: self.cache,
            reporter: self.reporter,
            lanes,
            state_dir: self.state_dir,
            action_timeout: self.action_timeout,
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    source: Arc<dyn PolicySource>,
    cache: Arc<PolicyCache>,
    reporter: Arc<ComplianceReporter>,
    lanes: HashMap<PolicyCategory, Lane>,
    state_dir: Option<PathBuf>,
    action_timeout: Duration,
}

impl ReconciliationEngine {
    pub fn builder(
        source: Arc<dyn PolicySource>,
        cache: Arc<PolicyCache>,
        reporter: Arc<ComplianceReporter>,
    ) -> EngineBuilder {
        EngineBuilder {
            source,
            cache,
            reporter,
            enforcers: Vec::new(),
            state_dir: None,
            action_timeout: Duration::from_secs(DEFAULT_ACTION_TIMEOUT),
        }
    }

    /// Categories with a registered enforcer, sorted
    pub fn categories(&self) -> Vec<PolicyCategory> {
        let mut categories: Vec<_> = self.lanes.keys().copied().collect();
        categories.sort();
        categories
    }

    /// Claim the category without waiting. `None` while a cycle is in flight
    /// (or when no enforcer is registered for it).
    pub fn try_begin(&self, category: PolicyCategory) -> Option<CycleGuard> {
        let lane = self.lanes.get(&category)?;
        let state = Arc::clone(&lane.state).try_lock_owned().ok()?;
        Some(CycleGuard {
            category,
            enforcer: Arc::clone(&lane.enforcer),
            state,
        })
    }

    /// Claim the category, waiting for an in-flight cycle to finish
    pub async fn begin(&self, category: PolicyCategory) -> Option<CycleGuard> {
        let lane = self.lanes.get(&category)?;
        let state = Arc::clone(&lane.state).lock_owned().await;
        Some(CycleGuard {
            category,
            enforcer: Arc::clone(&lane.enforcer),
            state,
        })
    }

    /// Run one full cycle outside the scheduler
    pub async fn run(&self, category: PolicyCategory) -> Option<CycleReport> {
        let guard = self.begin(category).await?;
        Some(self.run_cycle(guard, &ShutdownSignal::never()).await)
    }

    /// Copy of the enforced state of `category`. Waits for an in-flight cycle.
    pub async fn device_state(&self, category: PolicyCategory) -> Option<DeviceState> {
        let lane = self.lanes.get(&category)?;
        let state = lane.state.lock().await;
        Some(state.clone())
    }

    /// Run one cycle while holding the category lock
    pub async fn run_cycle(&self, mut guard: CycleGuard, shutdown: &ShutdownSignal) -> CycleReport {
        let category = guard.category;
        let cycle_id = Uuid::new_v4();
        log::info!("Starting {} sync cycle {}", category, cycle_id);

        // 1. Fetch
        let snapshot = match self.source.fetch_rules(category, true).await {
            Ok(snapshot) if snapshot.category() == category => Arc::new(snapshot),
            Ok(snapshot) => {
                let err = FetchError::Malformed(format!(
                    "expected {} rules, got {}",
                    category,
                    snapshot.category()
                ));
                return self.stale_cycle(cycle_id, &guard, err);
            }
            Err(err) => return self.stale_cycle(cycle_id, &guard, err),
        };

        log::info!(
            "Fetched {} policy v{} ({} active rules)",
            category,
            snapshot.source_version(),
            snapshot.active_count()
        );

        // 2. Cache
        if let Err(e) = self.cache.put(Arc::clone(&snapshot)) {
            log::warn!("Failed to persist {} policy cache: {}", category, e);
        }

        // 3. Rule changes and drift
        for target in guard.state.refresh(&snapshot) {
            log::info!("{} rule '{}' changed scope; enforcing again", category, target);
        }
        if !shutdown.is_triggered() {
            self.check_drift(&mut guard, &snapshot).await;
        }

        // 4. Plan + apply
        let mut actions = plan_actions(&snapshot, &guard.state);
        for action in actions.iter_mut() {
            if shutdown.is_triggered() {
                log::info!("Shutdown requested; leaving remaining {} actions pending", category);
                break;
            }

            let result = match tokio::time::timeout(self.action_timeout, guard.enforcer.apply(action)).await {
                Ok(result) => result,
                Err(_) => Err(EnforcementError::TimedOut),
            };

            match result {
                Ok(()) => {
                    log::debug!("Applied {}", action);
                    action.status = ActionStatus::Applied;
                    if action.kind.enforces() {
                        if let Some(rule) = snapshot.get(&action.target) {
                            guard.state.mark_enforced(rule.clone());
                        }
                    } else {
                        guard.state.release(&action.target);
                    }
                }
                Err(e) => {
                    log::warn!("Failed to apply {}: {}", action, e);
                    action.status = ActionStatus::Failed(e.to_string());
                }
            }
        }

        // 5. Persist state
        if let Some(ref dir) = self.state_dir {
            if let Err(e) = save_state(dir, category, &guard.state) {
                log::warn!("Failed to persist {} device state: {}", category, e);
            }
        }

        // 6. Status
        let not_applied = actions.iter().filter(|a| !a.status.is_applied()).count();
        let status = ComplianceStatus::converged(
            &snapshot,
            not_applied,
            actions.len(),
            pending_violations(&snapshot, &guard.state),
            Utc::now(),
        );
        self.reporter.record(category, status.clone());

        CycleReport {
            cycle_id,
            category,
            actions,
            status,
        }
    }

    /// Fetch failed: status from the cached snapshot only, no enforcement
    fn stale_cycle(&self, cycle_id: Uuid, guard: &CycleGuard, err: FetchError) -> CycleReport {
        let category = guard.category;
        let cached = self.cache.get(category);

        match cached {
            Some(ref snap) => log::warn!(
                "{} fetch failed ({}); using cached policy v{}",
                category,
                err,
                snap.source_version()
            ),
            None => log::warn!("{} fetch failed ({}); no cached policy", category, err),
        }

        let pending = cached
            .as_deref()
            .map(|snap| pending_violations(snap, &guard.state))
            .unwrap_or(0);
        let status = ComplianceStatus::stale(cached.as_deref(), pending, err.reason(), Utc::now());
        self.reporter.record(category, status.clone());

        CycleReport {
            cycle_id,
            category,
            actions: Vec::new(),
            status,
        }
    }

    /// Release targets whose effect vanished from the device so the plan
    /// re-applies them. Errors keep the target as enforced.
    async fn check_drift(&self, guard: &mut CycleGuard, snapshot: &PolicySnapshot) {
        let enforced: Vec<PolicyRule> = guard
            .state
            .rules()
            .filter(|rule| snapshot.is_active(rule.pattern()))
            .cloned()
            .collect();

        for rule in enforced {
            match tokio::time::timeout(self.action_timeout, guard.enforcer.is_enforced(&rule)).await {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    log::warn!("{} '{}' no longer enforced on device; re-applying", guard.category, rule.pattern());
                    guard.state.release(rule.pattern());
                }
                Ok(Err(e)) => {
                    log::debug!("Drift check for '{}' failed: {}", rule.pattern(), e);
                }
                Err(_) => {
                    log::debug!("Drift check for '{}' timed out", rule.pattern());
                }
            }
        }
    }
}
