use std::collections::HashMap;
use std::sync::Mutex;

use sockwarden_core::rules::PolicySettings;

mod decision;
pub mod resolve;

pub use decision::UxDecision;
pub use resolve::{normalize_default, resolve, resolve_issue, rule_chains};

/// Memoized rule resolution for one settings snapshot.
///
/// Rules are scoped by finding type, not by package, so the cache key is the
/// type alone: each type is resolved at most once per snapshot.
#[derive(Debug)]
pub struct UxLookup {
    settings: PolicySettings,
    cache: Mutex<HashMap<String, UxDecision>>,
}

impl UxLookup {
    pub fn new(settings: PolicySettings) -> Self {
        Self {
            settings,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &PolicySettings {
        &self.settings
    }

    pub fn lookup(&self, issue_type: &str) -> UxDecision {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(decision) = cache.get(issue_type) {
            return *decision;
        }
        let decision = resolve_issue(&self.settings, issue_type);
        tracing::debug!(
            issue_type,
            block = decision.block,
            display = decision.display,
            "resolved issue rule"
        );
        cache.insert(issue_type.to_string(), decision);
        decision
    }

    /// Number of finding types resolved so far.
    pub fn resolved_types(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sockwarden_core::rules::{Rule, RuleAction};

    fn lookup_with_default(issue_type: &str, rule: Rule) -> UxLookup {
        let mut settings = PolicySettings::default();
        settings.defaults.issue_rules.insert(issue_type.to_string(), rule);
        UxLookup::new(settings)
    }

    #[test]
    fn memoizes_per_type() {
        let lookup = lookup_with_default("installScripts", Rule::action(RuleAction::Warn));
        assert_eq!(lookup.lookup("installScripts"), UxDecision::WARN);
        assert_eq!(lookup.lookup("installScripts"), UxDecision::WARN);
        assert_eq!(lookup.resolved_types(), 1);
        assert_eq!(lookup.lookup("malware"), UxDecision::ERROR);
        assert_eq!(lookup.resolved_types(), 2);
    }

    #[test]
    fn boolean_defaults() {
        let lookup = lookup_with_default("telemetry", Rule::Enabled(false));
        assert_eq!(lookup.lookup("telemetry"), UxDecision::IGNORE);
        let lookup = lookup_with_default("telemetry", Rule::Enabled(true));
        assert_eq!(lookup.lookup("telemetry"), UxDecision::ERROR);
    }
}
