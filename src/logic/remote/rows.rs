//! Blocklist Rows
//!
//! JSON rows returned by the blocklist tables, converted into typed rule
//! entries right at the boundary. Website patterns are normalised and
//! validated here; rows that cannot be enforced are dropped with a warning.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::logic::enforcement::website::{is_valid_domain_pattern, normalize_domain};
use crate::logic::error::FetchError;
use crate::logic::policy::{PolicyCategory, RuleEntry};

#[derive(Debug, Deserialize)]
pub struct WebsiteRow {
    pub domain_pattern: String,
    /// Missing or null means active
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SoftwareRow {
    pub name_pattern: String,
    #[serde(default)]
    pub path_pattern: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Parse a response body of `category` into rule entries
pub fn parse_rules(category: PolicyCategory, body: &str) -> Result<Vec<RuleEntry>, FetchError> {
    match category {
        PolicyCategory::Website => {
            let rows: Vec<WebsiteRow> =
                serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
            Ok(rows.into_iter().filter_map(website_entry).collect())
        }
        PolicyCategory::Software => {
            let rows: Vec<SoftwareRow> =
                serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
            Ok(rows.into_iter().filter_map(software_entry).collect())
        }
    }
}

fn website_entry(row: WebsiteRow) -> Option<RuleEntry> {
    let domain = normalize_domain(&row.domain_pattern);
    if !is_valid_domain_pattern(&domain) {
        log::warn!("Skipping invalid domain pattern '{}'", row.domain_pattern);
        return None;
    }

    Some(RuleEntry {
        pattern: domain,
        scope: None,
        active: row.is_active.unwrap_or(true),
    })
}

fn software_entry(row: SoftwareRow) -> Option<RuleEntry> {
    let name = row.name_pattern.trim();
    // A bare wildcard would match every installed app
    if name.replace('*', "").trim().is_empty() {
        log::warn!("Skipping software pattern '{}' that matches everything", row.name_pattern);
        return None;
    }

    Some(RuleEntry {
        pattern: name.to_string(),
        scope: row.path_pattern.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
        active: row.is_active.unwrap_or(true),
    })
}

/// Content version of a rule set: first 16 hex chars of SHA-256 over the
/// sorted active patterns (and scopes). Order of rows does not matter.
pub fn content_version(entries: &[RuleEntry]) -> String {
    let mut keys: Vec<String> = entries
        .iter()
        .filter(|e| e.active)
        .map(|e| match e.scope {
            Some(ref scope) => format!("{}\t{}", e.pattern, scope),
            None => e.pattern.clone(),
        })
        .collect();
    keys.sort();
    keys.dedup();

    let mut hasher = Sha256::new();
    for key in &keys {
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_website_rows() {
        let body = r#"[
            {"domain_pattern": "HTTPS://Gambling.example/"},
            {"domain_pattern": "*.ads.net", "is_active": true},
            {"domain_pattern": "old.org", "is_active": false},
            {"domain_pattern": "not a domain"}
        ]"#;

        let entries = parse_rules(PolicyCategory::Website, body).unwrap();
        assert_eq!(
            entries,
            vec![
                RuleEntry::active("gambling.example"),
                RuleEntry::active("*.ads.net"),
                RuleEntry::inactive("old.org"),
            ]
        );
    }

    #[test]
    fn test_parse_software_rows() {
        let body = r#"[
            {"name_pattern": "steam*", "path_pattern": "/usr/games*"},
            {"name_pattern": "TikTok", "path_pattern": null, "is_active": null},
            {"name_pattern": "*"}
        ]"#;

        let entries = parse_rules(PolicyCategory::Software, body).unwrap();
        assert_eq!(
            entries,
            vec![
                RuleEntry::active("steam*").with_scope("/usr/games*"),
                RuleEntry::active("TikTok"),
            ]
        );
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(
            parse_rules(PolicyCategory::Website, r#"{"error": "nope"}"#),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(
            parse_rules(PolicyCategory::Software, r#"[{"path_pattern": "/x"}]"#),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn test_content_version_ignores_order_and_inactive() {
        let a = vec![RuleEntry::active("x.com"), RuleEntry::active("y.com")];
        let b = vec![
            RuleEntry::active("y.com"),
            RuleEntry::inactive("z.com"),
            RuleEntry::active("x.com"),
        ];
        assert_eq!(content_version(&a), content_version(&b));
        assert_eq!(content_version(&a).len(), 16);
        assert_ne!(content_version(&a), content_version(&[RuleEntry::active("x.com")]));
    }
}
