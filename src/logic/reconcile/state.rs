//! Device State
//!
//! Targets currently enforced on the device for one category, each mapped to
//! the rule it enforces. Mutated only by the reconciliation engine after a
//! successful action.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::DEVICE_STATE_PREFIX;
use crate::logic::error::StoreError;
use crate::logic::policy::{PolicyCategory, PolicyRule, PolicySnapshot};
use crate::logic::storage::{load_json, save_json};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    enforced: BTreeMap<String, PolicyRule>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, target: &str) -> bool {
        self.enforced.contains_key(target)
    }

    pub fn get(&self, target: &str) -> Option<&PolicyRule> {
        self.enforced.get(target)
    }

    /// Enforced targets, sorted
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.enforced.keys().map(String::as_str)
    }

    pub fn rules(&self) -> impl Iterator<Item = &PolicyRule> {
        self.enforced.values()
    }

    pub fn len(&self) -> usize {
        self.enforced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enforced.is_empty()
    }

    pub(crate) fn mark_enforced(&mut self, rule: PolicyRule) {
        self.enforced.insert(rule.pattern().to_string(), rule);
    }

    pub(crate) fn release(&mut self, target: &str) -> Option<PolicyRule> {
        self.enforced.remove(target)
    }

    /// Adopt the snapshot's rule for every target that is still active.
    /// Targets whose scope changed are released so the plan enforces them
    /// again under the new rule. Returns the released targets.
    pub(crate) fn refresh(&mut self, snapshot: &PolicySnapshot) -> Vec<String> {
        let mut released = Vec::new();

        for (target, rule) in self.enforced.iter_mut() {
            let Some(current) = snapshot.get(target).filter(|r| r.is_active()) else {
                continue;
            };
            if current.scope() != rule.scope() {
                released.push(target.clone());
            } else if current != rule {
                *rule = current.clone();
            }
        }

        for target in &released {
            self.enforced.remove(target);
        }
        released
    }

    /// Drop entries that do not belong to `category`
    fn retain_category(&mut self, category: PolicyCategory) {
        self.enforced
            .retain(|key, rule| rule.category() == category && key == rule.pattern());
    }
}

// ============================================================================
// PERSISTENCE
// ============================================================================

pub fn state_path(dir: &Path, category: PolicyCategory) -> PathBuf {
    dir.join(format!("{}{}.json", DEVICE_STATE_PREFIX, category.as_str()))
}

/// Load persisted state; missing or unreadable files yield an empty state
pub fn load_state(dir: &Path, category: PolicyCategory) -> DeviceState {
    match load_json::<DeviceState>(&state_path(dir, category)) {
        Ok(Some(mut state)) => {
            state.retain_category(category);
            log::info!("Restored {} enforced {} targets", state.len(), category);
            state
        }
        Ok(None) => DeviceState::new(),
        Err(e) => {
            log::warn!("Discarding unreadable {} device state: {}", category, e);
            DeviceState::new()
        }
    }
}

pub fn save_state(dir: &Path, category: PolicyCategory, state: &DeviceState) -> Result<(), StoreError> {
    save_json(&state_path(dir, category), state)
}
