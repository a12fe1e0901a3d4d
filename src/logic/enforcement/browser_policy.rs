//! Browser Policy Filter
//!
//! Blocks domains through a Chrome managed-policy file:
//! `{"URLBlocklist": ["x.com", ...]}`. Other keys in the file are preserved.
//! Chrome's URL blocklist already covers subdomains, so `*.x.com` is written
//! as `x.com`.
//!
//! Several patterns can share one blocklist entry, and the file may hold
//! entries an administrator added. A ledger in the agent data directory
//! records which pattern needs which entry and which entries the agent
//! inserted. An entry is removed only when the agent inserted it and no
//! remaining pattern needs it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::website::{base_domain, DomainFilter};
use crate::constants::BROWSER_POLICY_LEDGER_FILE;
use crate::logic::error::{EnforcementError, StoreError};
use crate::logic::storage::{load_json, save_json, write_atomic};

const BLOCKLIST_KEY: &str = "URLBlocklist";

/// Ownership of blocklist entries
#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    /// Blocked pattern -> blocklist entry it relies on
    patterns: BTreeMap<String, String>,
    /// Entries inserted by the agent
    written: BTreeSet<String>,
}

pub struct BrowserPolicyFilter {
    path: PathBuf,
    ledger_path: PathBuf,
    lock: Mutex<()>,
}

impl BrowserPolicyFilter {
    /// Filter over the policy file at `path`, with its ledger in `data_dir`
    pub fn new(path: impl Into<PathBuf>, data_dir: &Path) -> Self {
        Self {
            path: path.into(),
            ledger_path: data_dir.join(BROWSER_POLICY_LEDGER_FILE),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<Map<String, Value>, EnforcementError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(EnforcementError::from_io(e)),
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => Err(EnforcementError::Unavailable(format!(
                "policy file {} is not a JSON object",
                self.path.display()
            ))),
        }
    }

    fn entries(policy: &Map<String, Value>) -> Vec<String> {
        policy
            .get(BLOCKLIST_KEY)
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn write(&self, mut policy: Map<String, Value>, mut entries: Vec<String>) -> Result<(), EnforcementError> {
        entries.sort();
        entries.dedup();
        policy.insert(
            BLOCKLIST_KEY.to_string(),
            Value::Array(entries.into_iter().map(Value::String).collect()),
        );

        let json = serde_json::to_vec_pretty(&Value::Object(policy))
            .map_err(|e| EnforcementError::Unavailable(e.to_string()))?;
        write_atomic(&self.path, &json).map_err(EnforcementError::from_io)
    }

    fn load_ledger(&self) -> Ledger {
        match load_json(&self.ledger_path) {
            Ok(Some(ledger)) => ledger,
            Ok(None) => Ledger::default(),
            Err(e) => {
                log::warn!("Ignoring unreadable browser policy ledger: {}", e);
                Ledger::default()
            }
        }
    }

    fn save_ledger(&self, ledger: &Ledger) -> Result<(), EnforcementError> {
        save_json(&self.ledger_path, ledger).map_err(|e| match e {
            StoreError::Io(io) => EnforcementError::from_io(io),
            other => EnforcementError::Unavailable(other.to_string()),
        })
    }
}

impl DomainFilter for BrowserPolicyFilter {
    fn name(&self) -> &'static str {
        "browser-policy"
    }

    fn is_blocked(&self, domain: &str) -> Result<bool, EnforcementError> {
        let _guard = self.lock.lock();
        let ledger = self.load_ledger();
        let Some(entry) = ledger.patterns.get(domain) else {
            return Ok(false);
        };
        Ok(Self::entries(&self.read()?).contains(entry))
    }

    fn block_domain(&self, domain: &str) -> Result<(), EnforcementError> {
        let _guard = self.lock.lock();
        let policy = self.read()?;
        let mut entries = Self::entries(&policy);
        let mut ledger = self.load_ledger();
        let entry = base_domain(domain).to_string();
        let present = entries.contains(&entry);

        if present && ledger.patterns.get(domain) == Some(&entry) {
            return Ok(());
        }

        if !present {
            // Patterns relying on a vanished entry block nothing
            ledger.patterns.retain(|_, e| *e != entry);
            ledger.written.insert(entry.clone());
        }

        // Ledger first: a crash before the policy write leaves the pattern
        // reported as not blocked, so the next cycle writes it again
        ledger.patterns.insert(domain.to_string(), entry.clone());
        self.save_ledger(&ledger)?;

        if !present {
            entries.push(entry);
            self.write(policy, entries)?;
        }
        Ok(())
    }

    fn unblock_domain(&self, domain: &str) -> Result<(), EnforcementError> {
        let _guard = self.lock.lock();
        let mut ledger = self.load_ledger();
        let Some(entry) = ledger.patterns.remove(domain) else {
            return Ok(());
        };

        let still_needed = ledger.patterns.values().any(|e| *e == entry);
        if !still_needed && ledger.written.remove(&entry) {
            let policy = self.read()?;
            let mut entries = Self::entries(&policy);
            let before = entries.len();
            entries.retain(|e| *e != entry);
            if entries.len() != before {
                self.write(policy, entries)?;
            }
        }

        self.save_ledger(&ledger)
    }
}
