//! Software Enforcement
//!
//! Removes installed apps matching blocked name patterns through an
//! `AppLifecycle` OS hook.
//!
//! Pattern semantics:
//! - pattern containing `*`: case-insensitive substring match after removing `*`
//! - otherwise: case-insensitive equality
//! - optional scope (install path pattern) matches the install location the
//!   same way; no scope matches any location

use std::sync::Arc;

use async_trait::async_trait;

use super::{run_blocking, ActionKind, Enforceable, EnforcementAction};
use crate::logic::error::EnforcementError;
use crate::logic::policy::{PolicyCategory, PolicyRule};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledApp {
    pub name: String,
    pub location: Option<String>,
}

impl InstalledApp {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// App lifecycle hook. Calls are blocking and run off the async workers.
pub trait AppLifecycle: Send + Sync {
    fn list_installed(&self) -> Result<Vec<InstalledApp>, EnforcementError>;

    fn uninstall(&self, app: &InstalledApp) -> Result<(), EnforcementError>;
}

// ============================================================================
// MATCHING
// ============================================================================

/// Match a single value against a blocklist pattern
pub fn pattern_matches(pattern: &str, value: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let value = value.to_lowercase();

    if pattern.contains('*') {
        value.contains(&pattern.replace('*', ""))
    } else {
        value == pattern
    }
}

/// Whether an installed app falls under a rule's name pattern and scope
pub fn app_matches(name_pattern: &str, scope: Option<&str>, app: &InstalledApp) -> bool {
    if !pattern_matches(name_pattern, &app.name) {
        return false;
    }

    match scope {
        None => true,
        Some(path_pattern) => app
            .location
            .as_deref()
            .map(|loc| pattern_matches(path_pattern, loc))
            .unwrap_or(false),
    }
}

fn matching_apps(
    apps: &dyn AppLifecycle,
    name_pattern: &str,
    scope: Option<&str>,
) -> Result<Vec<InstalledApp>, EnforcementError> {
    Ok(apps
        .list_installed()?
        .into_iter()
        .filter(|app| app_matches(name_pattern, scope, app))
        .collect())
}

// ============================================================================
// ENFORCER
// ============================================================================

pub struct SoftwareEnforcer {
    apps: Arc<dyn AppLifecycle>,
}

impl SoftwareEnforcer {
    pub fn new(apps: Arc<dyn AppLifecycle>) -> Self {
        Self { apps }
    }
}

#[async_trait]
impl Enforceable for SoftwareEnforcer {
    fn category(&self) -> PolicyCategory {
        PolicyCategory::Software
    }

    async fn apply(&self, action: &EnforcementAction) -> Result<(), EnforcementError> {
        match action.kind {
            // Nothing to reinstall; releasing the pattern only stops future removals
            ActionKind::Unblock => Ok(()),
            ActionKind::Remove | ActionKind::Block => {
                let apps = Arc::clone(&self.apps);
                let pattern = action.target.clone();
                let scope = action.scope.clone();

                run_blocking(move || {
                    let matches = matching_apps(apps.as_ref(), &pattern, scope.as_deref())?;
                    if matches.is_empty() {
                        log::debug!("No installed app matches '{}'", pattern);
                        return Ok(());
                    }

                    let mut first_error = None;
                    let mut failed = 0;
                    for app in &matches {
                        match apps.uninstall(app) {
                            Ok(()) => log::info!("Removed blocked app {} (pattern '{}')", app.name, pattern),
                            Err(e) => {
                                log::warn!("Failed to remove {}: {}", app.name, e);
                                failed += 1;
                                first_error.get_or_insert(e);
                            }
                        }
                    }

                    match first_error {
                        None => Ok(()),
                        Some(e) if matches.len() == 1 => Err(e),
                        Some(e) => Err(EnforcementError::Unavailable(format!(
                            "{} of {} matching apps not removed: {}",
                            failed,
                            matches.len(),
                            e
                        ))),
                    }
                })
                .await
            }
        }
    }

    async fn is_enforced(&self, rule: &PolicyRule) -> Result<bool, EnforcementError> {
        let apps = Arc::clone(&self.apps);
        let pattern = rule.pattern().to_string();
        let scope = rule.scope().map(str::to_string);
        run_blocking(move || {
            Ok(matching_apps(apps.as_ref(), &pattern, scope.as_deref())?.is_empty())
        })
        .await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::test_support::MemoryApps;

    #[test]
    fn test_pattern_semantics() {
        assert!(pattern_matches("TikTok", "tiktok"));
        assert!(!pattern_matches("TikTok", "tiktok lite"));
        assert!(pattern_matches("*tok*", "TikTok Lite"));
        assert!(pattern_matches("steam*", "Steam Client"));
    }

    #[test]
    fn test_scope_requires_location() {
        let app = InstalledApp::new("Game").at("/opt/games/game");
        assert!(app_matches("game", None, &app));
        assert!(app_matches("game", Some("*/opt/games*"), &app));
        assert!(!app_matches("game", Some("*/usr/*"), &app));
        assert!(!app_matches("game", Some("*/opt/*"), &InstalledApp::new("Game")));
    }

    #[tokio::test]
    async fn test_remove_uninstalls_matches() {
        let apps = Arc::new(MemoryApps::with(vec![
            InstalledApp::new("Steam"),
            InstalledApp::new("Steam Beta"),
            InstalledApp::new("Firefox"),
        ]));
        let enforcer = SoftwareEnforcer::new(apps.clone());

        let action = EnforcementAction::new(PolicyCategory::Software, "steam*", ActionKind::Remove);
        enforcer.apply(&action).await.unwrap();

        assert_eq!(apps.names(), vec!["Firefox".to_string()]);
    }

    #[tokio::test]
    async fn test_already_uninstalled_is_applied() {
        let apps = Arc::new(MemoryApps::with(vec![InstalledApp::new("Firefox")]));
        let enforcer = SoftwareEnforcer::new(apps.clone());

        let action = EnforcementAction::new(PolicyCategory::Software, "steam", ActionKind::Remove);
        assert!(enforcer.apply(&action).await.is_ok());
        assert_eq!(apps.uninstall_calls(), 0);
    }

    #[tokio::test]
    async fn test_uninstall_failure_reported() {
        let apps = Arc::new(MemoryApps::with(vec![InstalledApp::new("Steam")]));
        apps.deny_uninstall(true);
        let enforcer = SoftwareEnforcer::new(apps.clone());

        let action = EnforcementAction::new(PolicyCategory::Software, "steam", ActionKind::Remove);
        assert!(matches!(
            enforcer.apply(&action).await,
            Err(EnforcementError::PermissionDenied(_))
        ));
    }
}
