//! Compliance Reporter
//!
//! Pure aggregation: holds the latest ComplianceStatus per category (one
//! cycle's lifetime, never persisted) and exposes read-only snapshots for
//! upstream reporting.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::logic::policy::{PolicyCategory, PolicySnapshot};

// ============================================================================
// TYPES
// ============================================================================

/// Outcome of the latest cycle of a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncResult {
    Success,
    PartialFailure,
    StaleCache,
}

impl SyncResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncResult::Success => "success",
            SyncResult::PartialFailure => "partial_failure",
            SyncResult::StaleCache => "stale_cache",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceStatus {
    /// Fetch time of the policy currently in force
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_result: SyncResult,
    /// Targets required by policy but not yet enforced
    pub pending_violations: usize,
    pub source_version: Option<String>,
    /// Age of the cached policy when the fetch failed
    pub cache_age_secs: Option<i64>,
    pub reason: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl ComplianceStatus {
    /// Status after a fresh fetch and enforcement pass
    pub fn converged(
        snapshot: &PolicySnapshot,
        not_applied: usize,
        total_actions: usize,
        pending_violations: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let (last_result, reason) = if not_applied == 0 {
            (SyncResult::Success, None)
        } else {
            (
                SyncResult::PartialFailure,
                Some(format!("{} of {} actions not applied", not_applied, total_actions)),
            )
        };

        Self {
            last_sync_at: Some(snapshot.fetched_at()),
            last_result,
            pending_violations,
            source_version: Some(snapshot.source_version().to_string()),
            cache_age_secs: None,
            reason,
            evaluated_at: now,
        }
    }

    /// Status after a failed fetch, computed from the cached snapshot
    pub fn stale(
        cached: Option<&PolicySnapshot>,
        pending_violations: usize,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            last_sync_at: cached.map(|s| s.fetched_at()),
            last_result: SyncResult::StaleCache,
            pending_violations,
            source_version: cached.map(|s| s.source_version().to_string()),
            cache_age_secs: cached.map(|s| s.age_secs(now)),
            reason: Some(reason.to_string()),
            evaluated_at: now,
        }
    }
}

/// Device-level label, as stored by the central authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCompliance {
    Compliant,
    NonCompliant,
    Unknown,
}

impl DeviceCompliance {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCompliance::Compliant => "compliant",
            DeviceCompliance::NonCompliant => "non_compliant",
            DeviceCompliance::Unknown => "unknown",
        }
    }
}

/// Read-only view for upstream telemetry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSnapshot {
    pub device: DeviceCompliance,
    pub categories: BTreeMap<PolicyCategory, ComplianceStatus>,
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// REPORTER
// ============================================================================

pub struct ComplianceReporter {
    statuses: RwLock<BTreeMap<PolicyCategory, ComplianceStatus>>,
    expected: Vec<PolicyCategory>,
}

impl ComplianceReporter {
    /// Reporter expecting a status from each of `categories`
    pub fn new(categories: impl IntoIterator<Item = PolicyCategory>) -> Self {
        Self {
            statuses: RwLock::new(BTreeMap::new()),
            expected: categories.into_iter().collect(),
        }
    }

    /// Replace the latest status of `category`
    pub fn record(&self, category: PolicyCategory, status: ComplianceStatus) {
        log::info!(
            "{} compliance: {} ({} pending{})",
            category,
            status.last_result.as_str(),
            status.pending_violations,
            status
                .reason
                .as_deref()
                .map(|r| format!(", {}", r))
                .unwrap_or_default()
        );
        self.statuses.write().insert(category, status);
    }

    pub fn get(&self, category: PolicyCategory) -> Option<ComplianceStatus> {
        self.statuses.read().get(&category).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.read().is_empty()
    }

    /// Device-level rollup.
    ///
    /// Non-compliant as soon as any category has pending violations;
    /// compliant only when every expected category reported against a known
    /// policy with nothing pending.
    pub fn device_compliance(&self) -> DeviceCompliance {
        rollup(&self.statuses.read(), &self.expected)
    }

    pub fn snapshot(&self) -> ComplianceSnapshot {
        let categories = self.statuses.read().clone();
        ComplianceSnapshot {
            device: rollup(&categories, &self.expected),
            categories,
            generated_at: Utc::now(),
        }
    }
}

impl Default for ComplianceReporter {
    fn default() -> Self {
        Self::new(PolicyCategory::ALL)
    }
}

fn rollup(
    statuses: &BTreeMap<PolicyCategory, ComplianceStatus>,
    expected: &[PolicyCategory],
) -> DeviceCompliance {
    if statuses.values().any(|s| s.pending_violations > 0) {
        return DeviceCompliance::NonCompliant;
    }

    let all_known = expected.iter().all(|c| {
        statuses
            .get(c)
            .map(|s| s.source_version.is_some())
            .unwrap_or(false)
    });

    if all_known {
        DeviceCompliance::Compliant
    } else {
        DeviceCompliance::Unknown
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::policy::RuleEntry;

    fn snapshot(category: PolicyCategory) -> PolicySnapshot {
        PolicySnapshot::new(category, "v1", Utc::now(), vec![RuleEntry::active("x")])
    }

    #[test]
    fn test_converged_status() {
        let snap = snapshot(PolicyCategory::Website);
        let ok = ComplianceStatus::converged(&snap, 0, 2, 0, Utc::now());
        assert_eq!(ok.last_result, SyncResult::Success);
        assert_eq!(ok.source_version.as_deref(), Some("v1"));

        let partial = ComplianceStatus::converged(&snap, 1, 2, 1, Utc::now());
        assert_eq!(partial.last_result, SyncResult::PartialFailure);
        assert_eq!(partial.pending_violations, 1);
    }

    #[test]
    fn test_stale_without_cache() {
        let status = ComplianceStatus::stale(None, 0, "unconfigured", Utc::now());
        assert_eq!(status.last_result, SyncResult::StaleCache);
        assert!(status.last_sync_at.is_none());
        assert_eq!(status.reason.as_deref(), Some("unconfigured"));
    }

    #[test]
    fn test_device_rollup() {
        let reporter = ComplianceReporter::default();
        assert_eq!(reporter.device_compliance(), DeviceCompliance::Unknown);

        let web = snapshot(PolicyCategory::Website);
        reporter.record(
            PolicyCategory::Website,
            ComplianceStatus::converged(&web, 0, 1, 0, Utc::now()),
        );
        // Software never reported yet
        assert_eq!(reporter.device_compliance(), DeviceCompliance::Unknown);

        let sw = snapshot(PolicyCategory::Software);
        reporter.record(
            PolicyCategory::Software,
            ComplianceStatus::stale(Some(&sw), 0, "transport", Utc::now()),
        );
        assert_eq!(reporter.device_compliance(), DeviceCompliance::Compliant);

        reporter.record(
            PolicyCategory::Software,
            ComplianceStatus::converged(&sw, 1, 1, 1, Utc::now()),
        );
        assert_eq!(reporter.device_compliance(), DeviceCompliance::NonCompliant);

        let snap = reporter.snapshot();
        assert_eq!(snap.device, DeviceCompliance::NonCompliant);
        assert_eq!(snap.categories.len(), 2);
    }

    #[test]
    fn test_snapshot_serializes_category_keys() {
        let reporter = ComplianceReporter::default();
        let web = snapshot(PolicyCategory::Website);
        reporter.record(
            PolicyCategory::Website,
            ComplianceStatus::converged(&web, 0, 0, 0, Utc::now()),
        );

        let json = serde_json::to_value(reporter.snapshot()).unwrap();
        assert_eq!(json["categories"]["website"]["last_result"], "success");
        assert_eq!(json["device"], "unknown");
    }
}
