//! Flattening a diff tree into the installable changes worth scanning.

use std::collections::VecDeque;

use semver::Version;

use sockwarden_core::error::SockwardenError;
use sockwarden_core::InstallEffect;

use crate::tree::{DiffAction, DiffTree, NodeId};

/// Breadth-first over the tree, visiting at most `limit` nodes.
///
/// Removals are skipped. A change is kept only when the version itself
/// moves, in which case `existing` records the replaced pkgid. A node with
/// no resolved location, or replacing one without, is dropped. Children are
/// always visited whatever happens to their parent.
pub fn collect_effects(
    tree: &DiffTree,
    limit: usize,
) -> Result<Vec<InstallEffect>, SockwardenError> {
    let mut effects = Vec::new();
    let mut queue: VecDeque<NodeId> = tree.node(DiffTree::ROOT).children.iter().copied().collect();
    let mut visits = 0usize;

    while let Some(id) = queue.pop_front() {
        visits += 1;
        if visits > limit {
            return Err(SockwardenError::WalkLimitExceeded(limit));
        }
        let node = tree.node(id);
        queue.extend(node.children.iter().copied());

        let Some(action) = node.action else { continue };
        if action == DiffAction::Remove {
            continue;
        }
        let Some(ideal) = node.ideal.as_ref() else { continue };

        let mut existing = None;
        if action == DiffAction::Change {
            let Some(actual) = node.actual.as_ref() else { continue };
            if !versions_differ(&actual.version, &ideal.version) {
                continue;
            }
            existing = Some(actual.pkgid());
        }

        let Some(resolved) = ideal.resolved.as_ref() else { continue };
        if let Some(actual) = node.actual.as_ref() {
            if actual.resolved.is_none() {
                continue;
            }
        }

        effects.push(InstallEffect {
            existing,
            pkgid: ideal.pkgid(),
            repository_url: to_repo_url(resolved),
            resolved: resolved.clone(),
        });
    }

    Ok(effects)
}

/// Semantic comparison; unparseable versions fall back to exact text.
pub fn versions_differ(actual: &str, ideal: &str) -> bool {
    match (Version::parse(actual), Version::parse(ideal)) {
        (Ok(a), Ok(b)) => a != b,
        _ => actual != ideal,
    }
}

/// Registry origin of a resolved tarball URL: fragment and query dropped,
/// then the `/<name>/-/<file>.tgz` suffix.
pub fn to_repo_url(resolved: &str) -> String {
    let end = resolved.find(['#', '?']).unwrap_or(resolved.len());
    let base = &resolved[..end];
    let Some(tarball) = base.find("/-/") else {
        return base.to_string();
    };
    let mut segments: Vec<&str> = base[..tarball].split('/').collect();
    segments.pop();
    if segments.last().map(|segment| segment.starts_with('@')).unwrap_or(false) {
        segments.pop();
    }
    segments.join("/")
}
