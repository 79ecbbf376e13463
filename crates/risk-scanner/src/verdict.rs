use serde::{Deserialize, Serialize};

use sockwarden_core::pkgid::PkgId;

/// Finding type used when the scanner has no data for a package at all.
pub const MISSING_ISSUE: &str = "missingDependency";

/// One issue type reported for one package version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub issue_type: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Finding {
    pub fn of_type(issue_type: impl Into<String>) -> Self {
        Self {
            issue_type: issue_type.into(),
            severity: None,
            category: None,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageReport {
    #[serde(default)]
    pub issues: Vec<Finding>,
}

/// One line of the batch scan response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PackageVerdict {
    Missing {
        eco: String,
        pkg: String,
        ver: String,
    },
    Success {
        eco: String,
        pkg: String,
        ver: String,
        value: PackageReport,
    },
}

impl PackageVerdict {
    pub fn package(&self) -> PkgId {
        match self {
            PackageVerdict::Missing { pkg, ver, .. } | PackageVerdict::Success { pkg, ver, .. } => {
                PkgId::new(pkg.clone(), ver.clone())
            }
        }
    }

    pub fn issues(&self) -> &[Finding] {
        match self {
            PackageVerdict::Missing { .. } => &[],
            PackageVerdict::Success { value, .. } => &value.issues,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, PackageVerdict::Missing { .. })
    }
}
