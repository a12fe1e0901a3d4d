//! Credential Storage with Checksum Verification
//!
//! Stores the enrollment credentials as JSON in the agent data directory.
//! A SHA-256 checksum over endpoint and key detects truncated or hand-edited
//! files; such files read as "not enrolled".

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{CredentialStore, Credentials};
use crate::constants::CREDENTIALS_FILE;
use crate::logic::error::StoreError;
use crate::logic::storage::{load_json, save_json};

const FORMAT_VERSION: u32 = 1;

/// Stored file format (includes checksum)
#[derive(Debug, Serialize, Deserialize)]
struct CredentialFile {
    endpoint: String,
    key: String,
    checksum: String,
    saved_at: DateTime<Utc>,
    format_version: u32,
}

/// File-backed credential store
pub struct FileCredentialStore {
    file_path: PathBuf,
}

impl FileCredentialStore {
    /// Store rooted in the agent data directory
    pub fn new(data_dir: &Path) -> Self {
        Self {
            file_path: data_dir.join(CREDENTIALS_FILE),
        }
    }

    pub fn exists(&self) -> bool {
        self.file_path.exists()
    }

    /// Load and verify
    pub fn load(&self) -> Result<Option<Credentials>, StoreError> {
        let Some(file) = load_json::<CredentialFile>(&self.file_path)? else {
            return Ok(None);
        };

        if file.checksum != checksum(&file.endpoint, &file.key) {
            return Err(StoreError::Integrity("credential checksum mismatch".to_string()));
        }

        Ok(Some(Credentials::new(file.endpoint, file.key)))
    }

    /// Save credentials (enrollment / re-enrollment)
    pub fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let file = CredentialFile {
            endpoint: credentials.endpoint.clone(),
            key: credentials.key.clone(),
            checksum: checksum(&credentials.endpoint, &credentials.key),
            saved_at: Utc::now(),
            format_version: FORMAT_VERSION,
        };

        save_json(&self.file_path, &file)?;
        log::info!("Credentials saved for endpoint {}", credentials.endpoint);
        Ok(())
    }

    /// Delete stored credentials (un-enrollment)
    pub fn clear(&self) -> Result<(), StoreError> {
        if self.exists() {
            fs::remove_file(&self.file_path)?;
            log::info!("Credentials removed");
        }
        Ok(())
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get_credentials(&self) -> Option<Credentials> {
        match self.load() {
            Ok(creds) => creds.filter(Credentials::is_complete),
            Err(e) => {
                log::warn!("Stored credentials unusable: {}", e);
                None
            }
        }
    }
}

fn checksum(endpoint: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        assert!(store.get_credentials().is_none());

        let creds = Credentials::new("https://policy.example.org", "k-123");
        store.save(&creds).unwrap();

        assert_eq!(store.get_credentials(), Some(creds));

        store.clear().unwrap();
        assert!(!store.exists());
        assert!(store.get_credentials().is_none());
    }

    #[test]
    fn test_tampered_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        store.save(&Credentials::new("https://policy.example.org", "k-123")).unwrap();

        let content = fs::read_to_string(store.file_path()).unwrap();
        fs::write(store.file_path(), content.replace("k-123", "k-999")).unwrap();

        assert!(matches!(store.load(), Err(StoreError::Integrity(_))));
        assert!(store.get_credentials().is_none());
    }
}
