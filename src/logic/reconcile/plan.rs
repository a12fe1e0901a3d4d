//! Action Planning
//!
//! `to_unblock = enforced - active`, `to_block = active - enforced`, keyed by
//! target within one category. Unblocks come first, each group sorted by
//! target.

use super::state::DeviceState;
use crate::logic::enforcement::EnforcementAction;
use crate::logic::policy::PolicySnapshot;

/// Minimal action set converging `state` to `snapshot`
pub fn plan_actions(snapshot: &PolicySnapshot, state: &DeviceState) -> Vec<EnforcementAction> {
    let to_unblock = state
        .rules()
        .filter(|rule| !snapshot.is_active(rule.pattern()))
        .map(EnforcementAction::release);

    let to_block = snapshot
        .active_rules()
        .filter(|rule| !state.contains(rule.pattern()))
        .map(EnforcementAction::enforce);

    to_unblock.chain(to_block).collect()
}

/// Targets required by `snapshot` that are not yet enforced
pub fn pending_violations(snapshot: &PolicySnapshot, state: &DeviceState) -> usize {
    snapshot
        .active_rules()
        .filter(|rule| !state.contains(rule.pattern()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::enforcement::ActionKind;
    use crate::logic::policy::{PolicyCategory, RuleEntry};
    use chrono::Utc;

    fn snapshot(category: PolicyCategory, entries: Vec<RuleEntry>) -> PolicySnapshot {
        PolicySnapshot::new(category, "v", Utc::now(), entries)
    }

    fn state_with(category: PolicyCategory, targets: &[&str]) -> DeviceState {
        let snap = snapshot(category, targets.iter().map(|t| RuleEntry::active(*t)).collect());
        let mut state = DeviceState::new();
        for rule in snap.active_rules() {
            state.mark_enforced(rule.clone());
        }
        state
    }

    fn summary(actions: &[EnforcementAction]) -> Vec<(ActionKind, &str)> {
        actions.iter().map(|a| (a.kind, a.target.as_str())).collect()
    }

    #[test]
    fn test_diff_produces_exact_action_set() {
        let state = state_with(PolicyCategory::Website, &["a", "b"]);
        let snap = snapshot(
            PolicyCategory::Website,
            vec![RuleEntry::active("b"), RuleEntry::active("c")],
        );

        let actions = plan_actions(&snap, &state);
        assert_eq!(summary(&actions), vec![(ActionKind::Unblock, "a"), (ActionKind::Block, "c")]);
        assert_eq!(pending_violations(&snap, &state), 1);
    }

    #[test]
    fn test_inactive_rule_treated_as_absent() {
        let state = state_with(PolicyCategory::Website, &["a"]);
        let snap = snapshot(PolicyCategory::Website, vec![RuleEntry::inactive("a")]);

        let actions = plan_actions(&snap, &state);
        assert_eq!(summary(&actions), vec![(ActionKind::Unblock, "a")]);
    }

    #[test]
    fn test_software_uses_remove() {
        let snap = snapshot(
            PolicyCategory::Software,
            vec![RuleEntry::active("steam").with_scope("/usr/games*")],
        );

        let actions = plan_actions(&snap, &DeviceState::new());
        assert_eq!(summary(&actions), vec![(ActionKind::Remove, "steam")]);
        assert_eq!(actions[0].scope.as_deref(), Some("/usr/games*"));
    }

    #[test]
    fn test_converged_state_plans_nothing() {
        let state = state_with(PolicyCategory::Website, &["a", "b"]);
        let snap = snapshot(
            PolicyCategory::Website,
            vec![RuleEntry::active("a"), RuleEntry::active("b")],
        );
        assert!(plan_actions(&snap, &state).is_empty());
        assert_eq!(pending_violations(&snap, &state), 0);
    }
}
