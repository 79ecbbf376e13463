use serde::{Deserialize, Serialize};

use crate::pkgid::{pkgid_parts, PkgId};

/// One installable change from a dry-run diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallEffect {
    /// Previous pkgid when an installed package changes version; `None` for additions.
    pub existing: Option<String>,
    pub pkgid: String,
    pub repository_url: String,
    /// Resolved tarball location of the new version.
    pub resolved: String,
}

impl InstallEffect {
    pub fn parts(&self) -> PkgId {
        pkgid_parts(&self.pkgid)
    }

    pub fn is_from(&self, registry_origin: &str) -> bool {
        self.repository_url.trim_end_matches('/') == registry_origin.trim_end_matches('/')
    }
}

/// How a wrapped process finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitOutcome {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            signal: None,
        }
    }

    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}
