pub mod abort;
pub mod config;
pub mod env;
pub mod error;
pub mod logging;
pub mod pkgid;
pub mod rules;
pub mod types;

pub use abort::{abort_pair, AbortHandle, AbortSignal};
pub use config::{Config, ConfigPaths};
pub use error::SockwardenError;
pub use pkgid::{pkgid_parts, PkgId};
pub use rules::{IssueRules, PolicyEntry, PolicyScope, PolicySettings, Rule, RuleAction};
pub use types::{ExitOutcome, InstallEffect};
