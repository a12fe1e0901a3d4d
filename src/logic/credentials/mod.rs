//! Credentials Module
//!
//! Endpoint + API key for the policy authority. Collected by the enrollment
//! flow (out of scope here) and read through the `CredentialStore` contract.
//!
//! # Components
//! - `storage.rs`: File-backed store with checksum verification

pub mod storage;

pub use storage::FileCredentialStore;

use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// ============================================================================
// CREDENTIALS
// ============================================================================

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Base URL of the policy authority
    pub endpoint: String,
    /// API key, sent as bearer credential
    pub key: String,
}

impl Credentials {
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim().trim_end_matches('/').to_string();
        Self {
            endpoint,
            key: key.into().trim().to_string(),
        }
    }

    /// Both fields present
    pub fn is_complete(&self) -> bool {
        !self.endpoint.is_empty() && !self.key.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Local persisted credential storage
pub trait CredentialStore: Send + Sync {
    /// `None` when the device has not been enrolled
    fn get_credentials(&self) -> Option<Credentials>;
}

/// In-process store, used for env-only setups and tests
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            inner: RwLock::new(credentials),
        }
    }

    pub fn set(&self, credentials: Option<Credentials>) {
        *self.inner.write() = credentials;
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_credentials(&self) -> Option<Credentials> {
        self.inner.read().clone().filter(Credentials::is_complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_key() {
        let creds = Credentials::new("https://policy.example.org/", "secret-key");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("redacted"));
        assert_eq!(creds.endpoint, "https://policy.example.org");
    }

    #[test]
    fn test_memory_store_filters_incomplete() {
        let store = MemoryCredentialStore::new(Some(Credentials::new("https://x", "")));
        assert!(store.get_credentials().is_none());

        store.set(Some(Credentials::new("https://x", "k")));
        assert!(store.get_credentials().is_some());
    }
}
