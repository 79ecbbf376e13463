use std::fmt;

use serde::{Deserialize, Serialize};

/// A `name@version` package identifier split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PkgId {
    pub name: String,
    pub version: String,
}

impl PkgId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PkgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Splits at the last `@` so scoped names (`@scope/name@1.0.0`) stay intact.
/// A lone leading `@` is part of the name, not a separator.
pub fn pkgid_parts(pkgid: &str) -> PkgId {
    match pkgid.rfind('@') {
        Some(index) if index > 0 => PkgId::new(&pkgid[..index], &pkgid[index + 1..]),
        _ => PkgId::new(pkgid, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_scoped_names_at_last_at() {
        let parts = pkgid_parts("@scope/name@1.2.3");
        assert_eq!(parts.name, "@scope/name");
        assert_eq!(parts.version, "1.2.3");
    }

    #[test]
    fn splits_plain_names() {
        assert_eq!(pkgid_parts("lodash@4.17.21"), PkgId::new("lodash", "4.17.21"));
        assert_eq!(pkgid_parts("left-pad@1.0.0-beta.1").version, "1.0.0-beta.1");
    }

    #[test]
    fn versionless_ids() {
        assert_eq!(pkgid_parts("@scope/name"), PkgId::new("@scope/name", ""));
        assert_eq!(pkgid_parts("react"), PkgId::new("react", ""));
    }

    #[test]
    fn display_round_trips_scoped() {
        let id = PkgId::new("@types/node", "20.1.0");
        assert_eq!(pkgid_parts(&id.to_string()), id);
    }
}
