//! Enforcement Module
//!
//! Applies and reverses the effects of policy rules on the device.
//!
//! # Components
//! - `website.rs`: Website enforcer over a `DomainFilter` OS hook
//! - `software.rs`: Software enforcer over an `AppLifecycle` OS hook
//! - `hosts.rs`: Hosts-file domain filter
//! - `browser_policy.rs`: Browser managed-policy domain filter
//! - `packages.rs`: Command-driven app lifecycle hook

pub mod browser_policy;
pub mod hosts;
pub mod packages;
pub mod software;
pub mod website;

pub use browser_policy::BrowserPolicyFilter;
pub use hosts::HostsFileFilter;
pub use packages::CommandAppLifecycle;
pub use software::{AppLifecycle, InstalledApp, SoftwareEnforcer};
pub use website::{DomainFilter, WebsiteEnforcer};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::EnforcementError;
use super::policy::{PolicyCategory, PolicyRule};

// ============================================================================
// ACTION TYPES
// ============================================================================

/// What an action does to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Block,
    Unblock,
    Remove,
}

impl ActionKind {
    /// Kind used to enforce an active rule of `category`
    pub fn enforce_for(category: PolicyCategory) -> Self {
        match category {
            PolicyCategory::Website => ActionKind::Block,
            PolicyCategory::Software => ActionKind::Remove,
        }
    }

    /// Whether a successful application makes the target enforced
    pub fn enforces(&self) -> bool {
        !matches!(self, ActionKind::Unblock)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Block => "block",
            ActionKind::Unblock => "unblock",
            ActionKind::Remove => "remove",
        }
    }
}

/// Lifecycle state of an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Applied,
    Failed(String),
}

impl ActionStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self, ActionStatus::Applied)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ActionStatus::Failed(_))
    }
}

/// One enforcement step produced by the reconciliation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementAction {
    pub category: PolicyCategory,
    /// Domain pattern or app name pattern
    pub target: String,
    /// Install path pattern narrowing a software target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub kind: ActionKind,
    pub status: ActionStatus,
}

impl EnforcementAction {
    pub fn new(category: PolicyCategory, target: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            category,
            target: target.into(),
            scope: None,
            kind,
            status: ActionStatus::Pending,
        }
    }

    /// Action enforcing an active rule
    pub fn enforce(rule: &PolicyRule) -> Self {
        Self {
            category: rule.category(),
            target: rule.pattern().to_string(),
            scope: rule.scope().map(str::to_string),
            kind: ActionKind::enforce_for(rule.category()),
            status: ActionStatus::Pending,
        }
    }

    /// Action releasing a previously enforced rule
    pub fn release(rule: &PolicyRule) -> Self {
        Self {
            category: rule.category(),
            target: rule.pattern().to_string(),
            scope: rule.scope().map(str::to_string),
            kind: ActionKind::Unblock,
            status: ActionStatus::Pending,
        }
    }
}

impl fmt::Display for EnforcementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}:{})", self.kind.as_str(), self.category, self.target)
    }
}

// ============================================================================
// ENFORCEABLE CAPABILITY
// ============================================================================

/// Per-category enforcer.
///
/// `apply` must be idempotent: blocking an already-blocked target or
/// unblocking a target that is not blocked succeeds without side effect.
/// Expected non-fatal conditions (app already uninstalled) are not errors.
#[async_trait]
pub trait Enforceable: Send + Sync {
    fn category(&self) -> PolicyCategory;

    async fn apply(&self, action: &EnforcementAction) -> Result<(), EnforcementError>;

    /// Whether the effect of an enforced rule is still in place on the device
    async fn is_enforced(&self, _rule: &PolicyRule) -> Result<bool, EnforcementError> {
        Ok(true)
    }
}

/// Run a blocking OS hook off the async workers
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, EnforcementError>
where
    F: FnOnce() -> Result<T, EnforcementError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| EnforcementError::Unavailable(format!("hook task failed: {}", e)))?
}

// ============================================================================
// TESTS
// ============================================================================
