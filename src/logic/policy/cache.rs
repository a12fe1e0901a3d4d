//! Policy Cache
//!
//! Durable single-slot store of the last successfully fetched snapshot per
//! category. No history: `put` replaces the slot.
//!
//! Features:
//! - Synchronous reads (`get`) that never observe a torn snapshot
//! - Optional on-disk persistence, reloaded at startup
//! - Corrupt or inconsistent files are ignored (slot starts empty)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::types::{PolicyCategory, PolicySnapshot};
use crate::constants::POLICY_CACHE_PREFIX;
use crate::logic::error::StoreError;
use crate::logic::storage::{load_json, save_json};

// ============================================================================
// POLICY CACHE
// ============================================================================

pub struct PolicyCache {
    slots: RwLock<HashMap<PolicyCategory, Arc<PolicySnapshot>>>,
    dir: Option<PathBuf>,
}

impl PolicyCache {
    /// Cache without persistence
    pub fn in_memory() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            dir: None,
        }
    }

    /// Open a persistent cache rooted at `dir`, loading any existing slots
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let mut slots = HashMap::new();

        for category in PolicyCategory::ALL {
            let path = slot_path(&dir, category);
            match load_json::<PolicySnapshot>(&path) {
                Ok(Some(snapshot)) if snapshot.category() == category && snapshot.is_consistent() => {
                    log::info!(
                        "Loaded cached {} policy v{} ({} rules, fetched {})",
                        category,
                        snapshot.source_version(),
                        snapshot.len(),
                        snapshot.fetched_at()
                    );
                    slots.insert(category, Arc::new(snapshot));
                }
                Ok(Some(_)) => {
                    log::warn!("Ignoring inconsistent {} policy cache at {}", category, path.display());
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Ignoring unreadable {} policy cache: {}", category, e);
                }
            }
        }

        Self {
            slots: RwLock::new(slots),
            dir: Some(dir),
        }
    }

    /// Latest snapshot for `category`; `None` only before the first successful fetch
    pub fn get(&self, category: PolicyCategory) -> Option<Arc<PolicySnapshot>> {
        self.slots.read().get(&category).cloned()
    }

    /// Replace the slot for the snapshot's category.
    ///
    /// The in-memory slot is always swapped; a persistence failure is
    /// returned so the caller can log it.
    pub fn put(&self, snapshot: impl Into<Arc<PolicySnapshot>>) -> Result<(), StoreError> {
        let snapshot = snapshot.into();
        let category = snapshot.category();

        self.slots.write().insert(category, Arc::clone(&snapshot));

        if let Some(ref dir) = self.dir {
            save_json(&slot_path(dir, category), snapshot.as_ref())?;
        }

        Ok(())
    }

    /// Whether this cache writes through to disk
    pub fn is_persistent(&self) -> bool {
        self.dir.is_some()
    }
}

impl Default for PolicyCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn slot_path(dir: &Path, category: PolicyCategory) -> PathBuf {
    dir.join(format!("{}{}.json", POLICY_CACHE_PREFIX, category.as_str()))
}

// ============================================================================
// TESTS
// ============================================================================
