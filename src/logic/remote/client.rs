//! Remote Client
//!
//! HTTP client for the central policy authority.
//!
//! Features:
//! - Blocklist fetch per category (PolicySource)
//! - Device compliance upload (ComplianceSink)
//! - Credentials passed in explicitly and swapped on reload, no globals
//!
//! Every request carries `apikey: <key>` and `Authorization: Bearer <key>`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use super::rows::{content_version, parse_rules};
use crate::logic::compliance::{ComplianceSink, ComplianceSnapshot, DeviceCompliance};
use crate::logic::credentials::{CredentialStore, Credentials};
use crate::logic::error::{ConfigError, FetchError};
use crate::logic::policy::{PolicyCategory, PolicySnapshot, PolicySource};

// ============================================================================
// REQUEST TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct DeviceComplianceUpdate {
    compliance_status: DeviceCompliance,
    last_seen: chrono::DateTime<Utc>,
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct RemoteClient {
    http: reqwest::Client,
    credentials: RwLock<Option<Credentials>>,
}

impl RemoteClient {
    pub fn new(credentials: Option<Credentials>, timeout: Duration) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "{}/{}",
                crate::constants::APP_NAME,
                crate::constants::APP_VERSION
            ))
            .build()
            .map_err(|e| ConfigError::Http(e.to_string()))?;

        Ok(Self {
            http,
            credentials: RwLock::new(credentials.filter(Credentials::is_complete)),
        })
    }

    /// Whether complete credentials are loaded
    pub fn is_configured(&self) -> bool {
        self.credentials.read().is_some()
    }

    pub fn set_credentials(&self, credentials: Option<Credentials>) {
        *self.credentials.write() = credentials.filter(Credentials::is_complete);
    }

    /// Re-read credentials from `store`. Returns true if they changed.
    pub fn reload(&self, store: &dyn CredentialStore) -> bool {
        let fresh = store.get_credentials().filter(Credentials::is_complete);
        let mut current = self.credentials.write();
        if *current == fresh {
            return false;
        }

        match fresh {
            Some(ref c) => log::info!("Credentials reloaded (endpoint {})", c.endpoint),
            None => log::warn!("Credentials removed; policy fetches disabled"),
        }
        *current = fresh;
        true
    }

    fn current(&self) -> Result<Credentials, FetchError> {
        self.credentials.read().clone().ok_or(FetchError::Unconfigured)
    }

    fn get(&self, creds: &Credentials, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("apikey", &creds.key)
            .bearer_auth(&creds.key)
    }

    /// Upload the device-level compliance label
    pub async fn report_compliance(
        &self,
        hostname: &str,
        status: DeviceCompliance,
    ) -> Result<(), FetchError> {
        let creds = self.current()?;
        let url = format!("{}/rest/v1/devices", creds.endpoint);
        let body = DeviceComplianceUpdate {
            compliance_status: status,
            last_seen: Utc::now(),
        };

        let response = self
            .http
            .patch(&url)
            .query(&[("hostname", format!("eq.{}", hostname))])
            .header("apikey", &creds.key)
            .header("Prefer", "return=minimal")
            .bearer_auth(&creds.key)
            .json(&body)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if response.status().is_success() {
            log::debug!("Reported {} as {}", hostname, status.as_str());
            Ok(())
        } else {
            Err(FetchError::from_status(response.status().as_u16()))
        }
    }
}

/// Blocklist URL of `category`
pub fn rules_url(endpoint: &str, category: PolicyCategory, active_only: bool) -> String {
    let table = match category {
        PolicyCategory::Website => "website_blocklist?select=domain_pattern,is_active",
        PolicyCategory::Software => "software_blocklist?select=name_pattern,path_pattern,is_active",
    };
    let filter = if active_only { "&is_active=eq.true" } else { "" };
    format!("{}/rest/v1/{}{}", endpoint, table, filter)
}

#[async_trait]
impl PolicySource for RemoteClient {
    async fn fetch_rules(
        &self,
        category: PolicyCategory,
        active_only: bool,
    ) -> Result<PolicySnapshot, FetchError> {
        let creds = self.current()?;
        let url = rules_url(&creds.endpoint, category, active_only);

        let response = self
            .get(&creds, &url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let entries = parse_rules(category, &body)?;
        let version = content_version(&entries);

        Ok(PolicySnapshot::new(category, version, Utc::now(), entries))
    }
}

#[async_trait]
impl ComplianceSink for RemoteClient {
    async fn upload(&self, hostname: &str, snapshot: &ComplianceSnapshot) -> Result<(), FetchError> {
        self.report_compliance(hostname, snapshot.device).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::credentials::MemoryCredentialStore;

    fn client(creds: Option<Credentials>) -> RemoteClient {
        RemoteClient::new(creds, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_rules_urls() {
        assert_eq!(
            rules_url("https://p.example", PolicyCategory::Website, true),
            "https://p.example/rest/v1/website_blocklist?select=domain_pattern,is_active&is_active=eq.true"
        );
        assert_eq!(
            rules_url("https://p.example", PolicyCategory::Software, false),
            "https://p.example/rest/v1/software_blocklist?select=name_pattern,path_pattern,is_active"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_never_sends() {
        let client = client(None);
        assert!(!client.is_configured());
        assert_eq!(
            client.fetch_rules(PolicyCategory::Website, true).await,
            Err(FetchError::Unconfigured)
        );
        assert_eq!(
            client.report_compliance("host", DeviceCompliance::Unknown).await,
            Err(FetchError::Unconfigured)
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 on loopback: nothing listens, connection is refused
        let client = client(Some(Credentials::new("http://127.0.0.1:9", "k")));
        assert!(matches!(
            client.fetch_rules(PolicyCategory::Software, true).await,
            Err(FetchError::Transport(_))
        ));
    }

    #[test]
    fn test_reload_swaps_credentials() {
        let client = client(None);
        let store = MemoryCredentialStore::new(Some(Credentials::new("https://a", "k1")));

        assert!(client.reload(&store));
        assert!(client.is_configured());
        assert!(!client.reload(&store));

        store.set(None);
        assert!(client.reload(&store));
        assert!(!client.is_configured());
    }

    /// Store that hands out whatever it holds, complete or not
    struct RawStore(Option<Credentials>);

    impl CredentialStore for RawStore {
        fn get_credentials(&self) -> Option<Credentials> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_reload_ignores_partial_credentials() {
        let client = client(None);

        assert!(!client.reload(&RawStore(Some(Credentials::new("http://127.0.0.1:9", "")))));
        assert!(!client.is_configured());
        assert_eq!(
            client.fetch_rules(PolicyCategory::Website, true).await,
            Err(FetchError::Unconfigured)
        );
    }
}
