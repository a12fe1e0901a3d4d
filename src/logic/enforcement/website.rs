//! Website Enforcement
//!
//! Blocks and unblocks domain patterns through a `DomainFilter` OS hook
//! (hosts file, browser policy, DNS/VPN filter on other platforms).

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{run_blocking, ActionKind, Enforceable, EnforcementAction};
use crate::logic::error::EnforcementError;
use crate::logic::policy::{PolicyCategory, PolicyRule};

// ============================================================================
// DOMAIN PATTERNS
// ============================================================================

static DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\*\.)?([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)*[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$")
        .expect("domain pattern regex is valid")
});

/// Normalise a raw domain pattern: lowercase, no scheme, path, port or trailing dot
pub fn normalize_domain(raw: &str) -> String {
    let mut domain = raw.trim().to_lowercase();

    if let Some(idx) = domain.find("://") {
        domain = domain[idx + 3..].to_string();
    }
    if let Some(idx) = domain.find(['/', '?', '#']) {
        domain.truncate(idx);
    }
    if let Some(idx) = domain.rfind(':') {
        if domain[idx + 1..].chars().all(|c| c.is_ascii_digit()) {
            domain.truncate(idx);
        }
    }

    domain.trim_end_matches('.').to_string()
}

/// Whether `pattern` is a plain domain or a `*.` wildcard domain
pub fn is_valid_domain_pattern(pattern: &str) -> bool {
    pattern.len() <= 253 && DOMAIN_PATTERN.is_match(pattern)
}

/// Base domain of a pattern (`*.x.com` -> `x.com`)
pub fn base_domain(pattern: &str) -> &str {
    pattern.strip_prefix("*.").unwrap_or(pattern)
}

// ============================================================================
// OS HOOK
// ============================================================================

/// Website filtering hook. Calls are blocking and run off the async workers.
pub trait DomainFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_blocked(&self, domain: &str) -> Result<bool, EnforcementError>;

    fn block_domain(&self, domain: &str) -> Result<(), EnforcementError>;

    fn unblock_domain(&self, domain: &str) -> Result<(), EnforcementError>;
}

// ============================================================================
// ENFORCER
// ============================================================================

pub struct WebsiteEnforcer {
    filter: Arc<dyn DomainFilter>,
}

impl WebsiteEnforcer {
    pub fn new(filter: Arc<dyn DomainFilter>) -> Self {
        log::info!("Website enforcer using {} filter", filter.name());
        Self { filter }
    }
}

#[async_trait]
impl Enforceable for WebsiteEnforcer {
    fn category(&self) -> PolicyCategory {
        PolicyCategory::Website
    }

    async fn apply(&self, action: &EnforcementAction) -> Result<(), EnforcementError> {
        let domain = action.target.clone();
        if !is_valid_domain_pattern(&domain) {
            return Err(EnforcementError::InvalidTarget(domain));
        }

        let filter = Arc::clone(&self.filter);
        match action.kind {
            ActionKind::Block => {
                run_blocking(move || {
                    if filter.is_blocked(&domain)? {
                        log::debug!("{} already blocked", domain);
                        return Ok(());
                    }
                    filter.block_domain(&domain)?;
                    log::info!("Blocked domain {}", domain);
                    Ok(())
                })
                .await
            }
            ActionKind::Unblock => {
                run_blocking(move || {
                    if !filter.is_blocked(&domain)? {
                        log::debug!("{} not blocked, nothing to undo", domain);
                        return Ok(());
                    }
                    filter.unblock_domain(&domain)?;
                    log::info!("Unblocked domain {}", domain);
                    Ok(())
                })
                .await
            }
            ActionKind::Remove => Err(EnforcementError::InvalidTarget(format!(
                "remove is not a website action ({})",
                domain
            ))),
        }
    }

    async fn is_enforced(&self, rule: &PolicyRule) -> Result<bool, EnforcementError> {
        let filter = Arc::clone(&self.filter);
        let domain = rule.pattern().to_string();
        run_blocking(move || filter.is_blocked(&domain)).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
