//! Deferred-rule resolution over layered policy scopes.

use std::collections::HashSet;

use sockwarden_core::rules::{PolicySettings, Rule, RuleAction};

use crate::decision::UxDecision;

/// Booleans and missing defaults become action objects; an object with no
/// action means `error`.
pub fn normalize_default(raw: Option<&Rule>) -> Rule {
    match raw {
        None | Some(Rule::Enabled(true)) => Rule::action(RuleAction::Error),
        Some(Rule::Enabled(false)) => Rule::action(RuleAction::Ignore),
        Some(Rule::Action { action: None }) => Rule::action(RuleAction::Error),
        Some(rule) => rule.clone(),
    }
}

/// Flattens every entry's `deferTo` chain into the rules seen for `issue_type`.
/// A scope without a rule for the type contributes `None`, which defers.
pub fn rule_chains(settings: &PolicySettings, issue_type: &str) -> Vec<Vec<Option<Rule>>> {
    settings
        .entries
        .iter()
        .map(|entry| {
            let mut chain = Vec::new();
            let mut visited = HashSet::new();
            let mut target = entry.start.clone();
            while let Some(name) = target {
                if !visited.insert(name.clone()) {
                    tracing::warn!(scope = %name, "policy deferTo chain loops; stopping");
                    break;
                }
                let Some(scope) = entry.settings.get(&name) else {
                    break;
                };
                chain.push(scope.issue_rules.get(issue_type).cloned());
                target = scope.defer_to.clone();
            }
            chain
        })
        .collect()
}

/// OR-merges each entry's first non-deferring rule (or the default when an
/// entry defers all the way down).
pub fn resolve(chains: &[Vec<Option<Rule>>], default_rule: &Rule) -> UxDecision {
    let default_ux = UxDecision::from_rule(default_rule);
    if chains.is_empty() {
        return default_ux;
    }
    chains
        .iter()
        .map(|chain| {
            chain
                .iter()
                .flatten()
                .find(|rule| !rule.defers())
                .map(UxDecision::from_rule)
                .unwrap_or(default_ux)
        })
        .fold(UxDecision::IGNORE, UxDecision::merge)
}

/// Resolves one finding type against a settings snapshot.
pub fn resolve_issue(settings: &PolicySettings, issue_type: &str) -> UxDecision {
    let default_rule = normalize_default(settings.defaults.issue_rules.get(issue_type));
    resolve(&rule_chains(settings, issue_type), &default_rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use sockwarden_core::rules::{PolicyEntry, PolicyScope};

    fn act(action: RuleAction) -> Option<Rule> {
        Some(Rule::action(action))
    }

    #[test]
    fn any_error_entry_blocks() {
        let chains = vec![vec![act(RuleAction::Warn)], vec![act(RuleAction::Error)]];
        let ux = resolve(&chains, &Rule::action(RuleAction::Ignore));
        assert_eq!(ux, UxDecision::ERROR);
    }

    #[test]
    fn defer_falls_through_to_default() {
        let chains = vec![vec![act(RuleAction::Defer)]];
        let ux = resolve(&chains, &Rule::action(RuleAction::Warn));
        assert_eq!(ux, UxDecision::WARN);
    }

    #[test]
    fn empty_chain_uses_default() {
        let ux = resolve(&[vec![]], &Rule::action(RuleAction::Ignore));
        assert_eq!(ux, UxDecision::IGNORE);
        let ux = resolve(&[vec![None, None]], &Rule::action(RuleAction::Warn));
        assert_eq!(ux, UxDecision::WARN);
    }

    #[test]
    fn booleans_match_their_action_forms() {
        let default = Rule::action(RuleAction::Warn);
        assert_eq!(
            resolve(&[vec![Some(Rule::Enabled(true))]], &default),
            resolve(&[vec![act(RuleAction::Error)]], &default)
        );
        assert_eq!(
            resolve(&[vec![Some(Rule::Enabled(false))]], &default),
            resolve(&[vec![act(RuleAction::Ignore)]], &default)
        );
        assert_eq!(
            normalize_default(Some(&Rule::Enabled(true))),
            Rule::action(RuleAction::Error)
        );
        assert_eq!(
            normalize_default(Some(&Rule::Enabled(false))),
            Rule::action(RuleAction::Ignore)
        );
    }

    #[test]
    fn missing_and_unknown_actions_block() {
        assert_eq!(
            resolve(&[vec![Some(Rule::Action { action: None })]], &Rule::Enabled(false)),
            UxDecision::ERROR
        );
        assert_eq!(
            resolve(&[vec![act(RuleAction::Monitor)]], &Rule::Enabled(false)),
            UxDecision::ERROR
        );
    }

    #[test]
    fn unknown_type_with_empty_settings_is_strictest() {
        let settings = PolicySettings::default();
        assert_eq!(resolve_issue(&settings, "someNewIssue"), UxDecision::ERROR);
    }

    #[test]
    fn organization_rule_shadows_default() {
        let mut settings = PolicySettings::default();
        settings
            .defaults
            .issue_rules
            .insert("unpopularPackage".into(), Rule::action(RuleAction::Warn));
        let mut scopes = BTreeMap::new();
        let mut org = PolicyScope::default();
        org.issue_rules
            .insert("unpopularPackage".into(), Rule::action(RuleAction::Ignore));
        scopes.insert("organization".to_string(), org);
        settings.entries.push(PolicyEntry {
            start: Some("organization".into()),
            settings: scopes,
        });
        assert_eq!(resolve_issue(&settings, "unpopularPackage"), UxDecision::IGNORE);
    }

    #[test]
    fn chains_follow_defer_to_and_stop_on_loops() {
        let mut scopes = BTreeMap::new();
        let mut org = PolicyScope::default();
        org.defer_to = Some("repository".into());
        org.issue_rules.insert("malware".into(), Rule::action(RuleAction::Defer));
        let mut repo = PolicyScope::default();
        repo.defer_to = Some("organization".into());
        repo.issue_rules.insert("malware".into(), Rule::action(RuleAction::Warn));
        scopes.insert("organization".to_string(), org);
        scopes.insert("repository".to_string(), repo);
        let settings = PolicySettings {
            entries: vec![PolicyEntry {
                start: Some("organization".into()),
                settings: scopes,
            }],
            ..PolicySettings::default()
        };

        let chains = rule_chains(&settings, "malware");
        assert_eq!(chains, vec![vec![act(RuleAction::Defer), act(RuleAction::Warn)]]);
        assert_eq!(resolve_issue(&settings, "malware"), UxDecision::WARN);
    }

    #[test]
    fn chain_stops_at_missing_scope() {
        let mut scopes = BTreeMap::new();
        let mut org = PolicyScope::default();
        org.defer_to = Some("gone".into());
        scopes.insert("organization".to_string(), org);
        let settings = PolicySettings {
            entries: vec![PolicyEntry {
                start: Some("organization".into()),
                settings: scopes,
            }],
            ..PolicySettings::default()
        };
        assert_eq!(rule_chains(&settings, "malware"), vec![vec![None]]);
    }
}
