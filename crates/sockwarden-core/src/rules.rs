//! Policy settings as delivered by the organization-settings service and the
//! local `[policy]` overlay. Resolution lives in the `policy-engine` crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Error,
    Warn,
    Ignore,
    Defer,
    Monitor,
    #[serde(other)]
    Unknown,
}

/// A rule is either the legacy boolean form or an object with an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    Enabled(bool),
    Action {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<RuleAction>,
    },
}

impl Rule {
    pub fn action(action: RuleAction) -> Self {
        Rule::Action {
            action: Some(action),
        }
    }

    pub fn defers(&self) -> bool {
        matches!(
            self,
            Rule::Action {
                action: Some(RuleAction::Defer)
            }
        )
    }
}

pub type IssueRules = BTreeMap<String, Rule>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyScope {
    #[serde(rename = "deferTo", alias = "defer_to", default)]
    pub defer_to: Option<String>,
    #[serde(rename = "issueRules", alias = "issue_rules", default)]
    pub issue_rules: IssueRules,
}

/// One configuration source: a named scope to start from and the scopes it can defer through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyEntry {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub settings: BTreeMap<String, PolicyScope>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDefaults {
    #[serde(rename = "issueRules", alias = "issue_rules", default)]
    pub issue_rules: IssueRules,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySettings {
    #[serde(default)]
    pub defaults: PolicyDefaults,
    #[serde(default)]
    pub entries: Vec<PolicyEntry>,
}

impl PolicySettings {
    /// Applies a local overlay: default rules override per type, entries are appended.
    pub fn overlay(mut self, local: &PolicySettings) -> Self {
        for (issue_type, rule) in &local.defaults.issue_rules {
            self.defaults
                .issue_rules
                .insert(issue_type.clone(), rule.clone());
        }
        self.entries.extend(local.entries.iter().cloned());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_remote_settings_shape() {
        let json = r#"{
            "defaults": { "issueRules": { "malware": true, "installScripts": { "action": "warn" } } },
            "entries": [{
                "start": "organization",
                "settings": {
                    "organization": { "deferTo": "repository", "issueRules": { "malware": { "action": "defer" } } },
                    "repository": { "deferTo": null, "issueRules": { "malware": { "action": "ignore" } } }
                }
            }]
        }"#;
        let settings: PolicySettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.defaults.issue_rules["malware"], Rule::Enabled(true));
        assert_eq!(
            settings.defaults.issue_rules["installScripts"],
            Rule::action(RuleAction::Warn)
        );
        let org = &settings.entries[0].settings["organization"];
        assert_eq!(org.defer_to.as_deref(), Some("repository"));
        assert!(org.issue_rules["malware"].defers());
    }

    #[test]
    fn unknown_actions_and_missing_actions_parse() {
        let rule: Rule = serde_json::from_str(r#"{ "action": "quarantine" }"#).unwrap();
        assert_eq!(rule, Rule::action(RuleAction::Unknown));
        let rule: Rule = serde_json::from_str("{}").unwrap();
        assert_eq!(rule, Rule::Action { action: None });
    }

    #[test]
    fn overlay_overrides_defaults_and_appends_entries() {
        let mut remote = PolicySettings::default();
        remote
            .defaults
            .issue_rules
            .insert("malware".into(), Rule::action(RuleAction::Warn));
        remote.entries.push(PolicyEntry::default());

        let mut local = PolicySettings::default();
        local
            .defaults
            .issue_rules
            .insert("malware".into(), Rule::Enabled(true));
        local.entries.push(PolicyEntry {
            start: Some("user".into()),
            settings: BTreeMap::new(),
        });

        let merged = remote.overlay(&local);
        assert_eq!(merged.defaults.issue_rules["malware"], Rule::Enabled(true));
        assert_eq!(merged.entries.len(), 2);
        assert_eq!(merged.entries[1].start.as_deref(), Some("user"));
    }
}
