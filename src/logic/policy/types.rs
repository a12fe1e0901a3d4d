//! Policy Types
//!
//! Strongly-typed policy data. Remote responses are parsed into these types at
//! the PolicySource boundary; nothing downstream touches untyped data.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CATEGORY
// ============================================================================

/// One enforcement domain with its own cadence, rule shape and enforcer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCategory {
    Website,
    Software,
}

impl PolicyCategory {
    pub const ALL: [PolicyCategory; 2] = [PolicyCategory::Website, PolicyCategory::Software];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyCategory::Website => "website",
            PolicyCategory::Software => "software",
        }
    }
}

impl fmt::Display for PolicyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RULE
// ============================================================================

/// Raw rule as delivered by a PolicySource, before it joins a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    pub pattern: String,
    /// Secondary constraint (install path pattern for software rules)
    pub scope: Option<String>,
    pub active: bool,
}

impl RuleEntry {
    pub fn active(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            scope: None,
            active: true,
        }
    }

    pub fn inactive(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            scope: None,
            active: false,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// A single fetched rule. Immutable: a new fetch produces new rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    category: PolicyCategory,
    pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    active: bool,
    source_version: String,
}

impl PolicyRule {
    pub fn category(&self) -> PolicyCategory {
        self.category
    }

    /// Identity key within the category (domain pattern or app name pattern)
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn source_version(&self) -> &str {
        &self.source_version
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Immutable, versioned set of rules fetched in one cycle.
///
/// Rules are keyed by pattern: duplicates collapse, with an active entry
/// winning over an inactive one. All rules share the snapshot's category and
/// source version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    category: PolicyCategory,
    rules: BTreeMap<String, PolicyRule>,
    fetched_at: DateTime<Utc>,
    source_version: String,
}

impl PolicySnapshot {
    pub fn new(
        category: PolicyCategory,
        source_version: impl Into<String>,
        fetched_at: DateTime<Utc>,
        entries: impl IntoIterator<Item = RuleEntry>,
    ) -> Self {
        let source_version = source_version.into();
        let mut rules: BTreeMap<String, PolicyRule> = BTreeMap::new();

        for entry in entries {
            let pattern = entry.pattern.trim().to_string();
            if pattern.is_empty() {
                continue;
            }

            if let Some(existing) = rules.get(&pattern) {
                if existing.active || !entry.active {
                    continue;
                }
            }

            rules.insert(pattern.clone(), PolicyRule {
                category,
                pattern,
                scope: entry.scope.filter(|s| !s.trim().is_empty()),
                active: entry.active,
                source_version: source_version.clone(),
            });
        }

        Self {
            category,
            rules,
            fetched_at,
            source_version,
        }
    }

    pub fn category(&self) -> PolicyCategory {
        self.category
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn source_version(&self) -> &str {
        &self.source_version
    }

    /// All rules, active or not
    pub fn rules(&self) -> impl Iterator<Item = &PolicyRule> {
        self.rules.values()
    }

    /// Rules that must be enforced. Inactive rules are treated as absent.
    pub fn active_rules(&self) -> impl Iterator<Item = &PolicyRule> {
        self.rules.values().filter(|r| r.active)
    }

    pub fn get(&self, pattern: &str) -> Option<&PolicyRule> {
        self.rules.get(pattern)
    }

    pub fn is_active(&self, pattern: &str) -> bool {
        self.rules.get(pattern).map(|r| r.active).unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.active_rules().count()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Seconds since this snapshot was fetched
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.fetched_at).num_seconds().max(0)
    }

    /// Check invariants after deserializing from untrusted storage
    pub fn is_consistent(&self) -> bool {
        self.rules.iter().all(|(key, rule)| {
            key == &rule.pattern
                && rule.category == self.category
                && rule.source_version == self.source_version
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_collapse() {
        let snap = PolicySnapshot::new(
            PolicyCategory::Website,
            "v1",
            Utc::now(),
            vec![
                RuleEntry::active("x.com"),
                RuleEntry::active("x.com"),
                RuleEntry::active("y.com"),
            ],
        );
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.active_count(), 2);
    }

    #[test]
    fn test_active_wins_over_inactive_duplicate() {
        let snap = PolicySnapshot::new(
            PolicyCategory::Software,
            "v1",
            Utc::now(),
            vec![RuleEntry::inactive("game"), RuleEntry::active("game")],
        );
        assert!(snap.is_active("game"));

        let snap = PolicySnapshot::new(
            PolicyCategory::Software,
            "v1",
            Utc::now(),
            vec![RuleEntry::active("game"), RuleEntry::inactive("game")],
        );
        assert!(snap.is_active("game"));
    }

    #[test]
    fn test_inactive_excluded_from_active_rules() {
        let snap = PolicySnapshot::new(
            PolicyCategory::Website,
            "v1",
            Utc::now(),
            vec![RuleEntry::active("a.com"), RuleEntry::inactive("b.com")],
        );
        let active: Vec<_> = snap.active_rules().map(|r| r.pattern()).collect();
        assert_eq!(active, vec!["a.com"]);
        assert!(!snap.is_active("b.com"));
        assert!(!snap.is_active("missing.com"));
    }

    #[test]
    fn test_rules_share_snapshot_version() {
        let snap = PolicySnapshot::new(
            PolicyCategory::Website,
            "abc123",
            Utc::now(),
            vec![RuleEntry::active("a.com"), RuleEntry::active(" b.com "), RuleEntry::active("")],
        );
        assert_eq!(snap.len(), 2);
        assert!(snap.get("b.com").is_some());
        assert!(snap.rules().all(|r| r.source_version() == "abc123"));
        assert!(snap.is_consistent());
    }
}
