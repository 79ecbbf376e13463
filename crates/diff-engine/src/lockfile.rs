//! npm lockfiles (v2/v3 `packages` maps) and diffing two of them into a
//! `DiffTree`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::overrides::{find_specific_override_set, OverrideId, Overrides};
use crate::tree::{DiffAction, DiffNode, DiffTree, NodeId, TreeNode};

pub const PROJECT_LOCKFILES: [&str; 2] = ["npm-shrinkwrap.json", "package-lock.json"];
pub const HIDDEN_LOCKFILE: &str = "node_modules/.package-lock.json";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Lockfile {
    #[serde(default)]
    pub packages: BTreeMap<String, LockEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LockEntry {
    pub name: Option<String>,
    pub version: Option<String>,
    pub resolved: Option<String>,
    #[serde(default)]
    pub link: bool,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "optionalDependencies")]
    pub optional_dependencies: BTreeMap<String, String>,
}

impl Lockfile {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parse lockfile")
    }

    /// `Ok(None)` when the file does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("parse {}", path.display()))
            .map(Some)
    }

    /// The committed lockfile, shrinkwrap first.
    pub fn read_project(dir: &Path) -> Result<Option<Self>> {
        for name in PROJECT_LOCKFILES {
            if let Some(lock) = Self::read(&dir.join(name))? {
                return Ok(Some(lock));
            }
        }
        Ok(None)
    }

    /// What is installed now, per npm's hidden lockfile; empty if none.
    pub fn read_installed(dir: &Path) -> Result<Self> {
        Ok(Self::read(&dir.join(HIDDEN_LOCKFILE))?.unwrap_or_default())
    }

    fn node(&self, location: &str) -> Option<TreeNode> {
        let entry = self.packages.get(location)?;
        let version = entry.version.clone()?;
        Some(TreeNode {
            name: entry
                .name
                .clone()
                .unwrap_or_else(|| name_from_location(location).to_string()),
            version,
            location: location.to_string(),
            resolved: entry.resolved.clone(),
        })
    }

    fn installed_locations(&self) -> impl Iterator<Item = &str> {
        self.packages
            .iter()
            .filter(|(location, entry)| location.contains("node_modules/") && !entry.link)
            .map(|(location, _)| location.as_str())
    }

    /// Where `name`, required from `from`, is found by node's lookup:
    /// the nearest `node_modules/<name>` walking up.
    pub fn resolve_dependency(&self, from: &str, name: &str) -> Option<String> {
        let mut base = Some(from);
        while let Some(dir) = base {
            let candidate = if dir.is_empty() {
                format!("node_modules/{name}")
            } else {
                format!("{dir}/node_modules/{name}")
            };
            if self.packages.contains_key(&candidate) {
                return Some(candidate);
            }
            base = if dir.is_empty() {
                None
            } else {
                Some(parent_location(dir).unwrap_or(""))
            };
        }
        None
    }
}

/// `node_modules/a/node_modules/@s/b` -> `@s/b`.
pub fn name_from_location(location: &str) -> &str {
    location
        .rsplit_once("node_modules/")
        .map(|(_, name)| name)
        .unwrap_or(location)
}

/// Enclosing package location, `None` for top-level packages.
pub fn parent_location(location: &str) -> Option<&str> {
    location.rfind("/node_modules/").map(|index| &location[..index])
}

/// Package names from the root down to `location`.
fn package_path(location: &str) -> Vec<&str> {
    match location.strip_prefix("node_modules/") {
        Some(rest) => rest.split("/node_modules/").collect(),
        None => Vec::new(),
    }
}

/// Diffs two lockfiles by install location. Nested locations hang under
/// their enclosing package so the tree mirrors `node_modules`.
pub fn diff_lockfiles(actual: &Lockfile, ideal: &Lockfile) -> DiffTree {
    let mut locations: Vec<&str> = actual
        .installed_locations()
        .chain(ideal.installed_locations())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    locations.sort_by_key(|location| (location.matches("node_modules/").count(), *location));

    let mut tree = DiffTree::new();
    let mut ids: HashMap<&str, NodeId> = HashMap::new();
    for location in locations {
        let before = actual.node(location);
        let after = ideal.node(location);
        let action = match (&before, &after) {
            (None, Some(_)) => Some(DiffAction::Add),
            (Some(_), None) => Some(DiffAction::Remove),
            (Some(a), Some(b)) if a.version != b.version || a.resolved != b.resolved => {
                Some(DiffAction::Change)
            }
            _ => None,
        };
        let parent = parent_location(location)
            .and_then(|parent| ids.get(parent).copied())
            .unwrap_or(DiffTree::ROOT);
        let id = tree.add(
            parent,
            DiffNode {
                action,
                actual: before,
                ideal: after,
                children: Vec::new(),
            },
        );
        ids.insert(location, id);
    }
    tree
}

/// Packages reached by dependents whose override sets conflict, so that
/// no override applies to them.
pub fn override_conflicts(lock: &Lockfile, overrides: &Overrides) -> Vec<String> {
    if overrides.is_empty() {
        return Vec::new();
    }
    let mut in_effect: HashMap<String, OverrideId> = HashMap::new();
    let mut conflicts = BTreeSet::new();

    for (location, entry) in &lock.packages {
        if entry.link {
            continue;
        }
        let dependent = package_path(location);
        for name in entry.dependencies.keys().chain(entry.optional_dependencies.keys()) {
            let Some(target) = lock.resolve_dependency(location, name) else { continue };
            let set = overrides.for_path(dependent.iter().copied().chain([name.as_str()]));
            match in_effect.get(&target).copied() {
                None => {
                    in_effect.insert(target, set);
                }
                Some(previous) => match find_specific_override_set(overrides, previous, set) {
                    Some(winner) => {
                        in_effect.insert(target, winner);
                    }
                    None => {
                        conflicts.insert(name_from_location(&target).to_string());
                    }
                },
            }
        }
    }
    conflicts.into_iter().collect()
}
