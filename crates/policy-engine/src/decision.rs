use serde::{Deserialize, Serialize};

use sockwarden_core::rules::{Rule, RuleAction};

/// The resolved block/display verdict for one finding type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UxDecision {
    pub block: bool,
    pub display: bool,
}

impl UxDecision {
    pub const ERROR: UxDecision = UxDecision {
        block: true,
        display: true,
    };
    pub const WARN: UxDecision = UxDecision {
        block: false,
        display: true,
    };
    pub const IGNORE: UxDecision = UxDecision {
        block: false,
        display: false,
    };

    /// Converts a rule that does not defer. Unknown or missing actions are errors.
    pub fn from_rule(rule: &Rule) -> Self {
        match rule {
            Rule::Enabled(true) => UxDecision::ERROR,
            Rule::Enabled(false) => UxDecision::IGNORE,
            Rule::Action {
                action: Some(RuleAction::Warn),
            } => UxDecision::WARN,
            Rule::Action {
                action: Some(RuleAction::Ignore),
            } => UxDecision::IGNORE,
            Rule::Action { .. } => UxDecision::ERROR,
        }
    }

    /// Maximal strength: either side blocking or displaying wins.
    pub fn merge(self, other: UxDecision) -> UxDecision {
        UxDecision {
            block: self.block || other.block,
            display: self.display || other.display,
        }
    }

    pub fn label(&self) -> &'static str {
        match (self.block, self.display) {
            (true, _) => "error",
            (false, true) => "warn",
            (false, false) => "ignore",
        }
    }
}
