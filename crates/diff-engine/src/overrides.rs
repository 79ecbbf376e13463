//! `overrides` from a project manifest, as an arena of nested sets.
//!
//! A set is in effect for a package reached through a chain of dependents;
//! when two dependents reach the same hoisted package with different sets,
//! the more specific one wins, and sets where neither contains the other
//! conflict.

use std::collections::BTreeMap;

use serde_json::Value;

pub type OverrideId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideSet {
    pub parent: Option<OverrideId>,
    pub children: BTreeMap<String, OverrideId>,
    /// Package selector, such as `foo` or `foo@^1`. Empty at the root.
    pub key: String,
    /// Replacement version, if this level overrides anything itself.
    pub value: Option<String>,
}

impl OverrideSet {
    /// The package name this selector targets.
    pub fn name(&self) -> &str {
        selector_name(&self.key)
    }
}

#[derive(Debug, Clone)]
pub struct Overrides {
    sets: Vec<OverrideSet>,
}

impl Overrides {
    pub const ROOT: OverrideId = 0;

    pub fn empty() -> Self {
        Self {
            sets: vec![OverrideSet {
                parent: None,
                children: BTreeMap::new(),
                key: String::new(),
                value: None,
            }],
        }
    }

    /// Builds from a manifest's `overrides` value. A string applies to the
    /// selector directly; an object nests, with `"."` naming the selector's
    /// own replacement.
    pub fn from_manifest(manifest: &Value) -> Self {
        let mut overrides = Self::empty();
        if let Some(Value::Object(map)) = manifest.get("overrides") {
            overrides.insert_children(Self::ROOT, map);
        }
        overrides
    }

    fn insert_children(&mut self, parent: OverrideId, map: &serde_json::Map<String, Value>) {
        for (key, value) in map {
            if key == "." {
                continue;
            }
            let id = self.sets.len();
            self.sets.push(OverrideSet {
                parent: Some(parent),
                children: BTreeMap::new(),
                key: key.clone(),
                value: None,
            });
            self.sets[parent].children.insert(key.clone(), id);
            match value {
                Value::String(version) => self.sets[id].value = Some(version.clone()),
                Value::Object(nested) => {
                    self.sets[id].value =
                        nested.get(".").and_then(Value::as_str).map(str::to_string);
                    self.insert_children(id, nested);
                }
                _ => {}
            }
        }
    }

    /// Adds a child set by hand.
    pub fn push(&mut self, parent: OverrideId, key: &str, value: Option<&str>) -> OverrideId {
        let id = self.sets.len();
        self.sets.push(OverrideSet {
            parent: Some(parent),
            children: BTreeMap::new(),
            key: key.to_string(),
            value: value.map(str::to_string),
        });
        self.sets[parent].children.insert(key.to_string(), id);
        id
    }

    pub fn get(&self, id: OverrideId) -> &OverrideSet {
        &self.sets[id]
    }

    pub fn is_empty(&self) -> bool {
        self.sets.len() == 1
    }

    /// The set in effect for a package reached through `path` (package
    /// names from the root dependent downward).
    pub fn for_path<'a>(&self, path: impl IntoIterator<Item = &'a str>) -> OverrideId {
        let mut current = Self::ROOT;
        for name in path {
            let next = self.sets[current]
                .children
                .values()
                .copied()
                .find(|child| self.sets[*child].name() == name);
            if let Some(next) = next {
                current = next;
            }
        }
        current
    }

    fn ancestry(&self, id: OverrideId) -> impl Iterator<Item = OverrideId> + '_ {
        std::iter::successors(Some(id), move |current| self.sets[*current].parent)
    }

    /// Structural equality: same selector and replacement, same nested
    /// sets below, and equal parents above.
    pub fn is_equal(&self, first: OverrideId, second: OverrideId) -> bool {
        if first == second {
            return true;
        }
        if !self.same_subtree(first, second) {
            return false;
        }
        match (self.sets[first].parent, self.sets[second].parent) {
            (None, None) => true,
            (Some(a), Some(b)) => self.is_equal(a, b),
            _ => false,
        }
    }

    fn same_subtree(&self, first: OverrideId, second: OverrideId) -> bool {
        let (a, b) = (&self.sets[first], &self.sets[second]);
        a.key == b.key
            && a.value == b.value
            && a.children.len() == b.children.len()
            && a.children.iter().all(|(key, child)| {
                b.children
                    .get(key)
                    .map(|other| self.same_subtree(*child, *other))
                    .unwrap_or(false)
            })
    }
}

/// Whichever set has the other among its ancestors, or `None` when neither
/// contains the other.
pub fn find_specific_override_set(
    overrides: &Overrides,
    first: OverrideId,
    second: OverrideId,
) -> Option<OverrideId> {
    if overrides.ancestry(second).any(|id| overrides.is_equal(id, first)) {
        return Some(second);
    }
    if overrides.ancestry(first).any(|id| overrides.is_equal(id, second)) {
        return Some(first);
    }
    tracing::debug!(
        first = %overrides.get(first).key,
        second = %overrides.get(second).key,
        "conflicting override sets"
    );
    None
}

pub fn do_override_sets_conflict(
    overrides: &Overrides,
    first: OverrideId,
    second: OverrideId,
) -> bool {
    find_specific_override_set(overrides, first, second).is_none()
}

/// `foo@^1` -> `foo`, `@scope/foo@1` -> `@scope/foo`.
pub fn selector_name(key: &str) -> &str {
    match key.rfind('@') {
        Some(index) if index > 0 => &key[..index],
        _ => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Overrides {
        Overrides::from_manifest(&json!({
            "overrides": {
                "foo": { ".": "1.0.0", "bar": "2.0.0" },
                "baz@^3": "3.1.0"
            }
        }))
    }

    #[test]
    fn parses_nested_overrides() {
        let overrides = sample();
        let foo = overrides.for_path(["foo"]);
        assert_eq!(overrides.get(foo).value.as_deref(), Some("1.0.0"));
        let bar = overrides.for_path(["foo", "bar"]);
        assert_eq!(overrides.get(bar).value.as_deref(), Some("2.0.0"));
        assert_eq!(overrides.get(bar).parent, Some(foo));
        let baz = overrides.for_path(["baz"]);
        assert_eq!(overrides.get(baz).name(), "baz");
        assert_eq!(overrides.for_path(["unrelated"]), Overrides::ROOT);
    }

    #[test]
    fn descendant_is_more_specific() {
        let overrides = sample();
        let foo = overrides.for_path(["foo"]);
        let bar = overrides.for_path(["foo", "bar"]);
        assert_eq!(find_specific_override_set(&overrides, foo, bar), Some(bar));
        assert_eq!(find_specific_override_set(&overrides, bar, foo), Some(bar));
        assert_eq!(find_specific_override_set(&overrides, Overrides::ROOT, foo), Some(foo));
        assert!(!do_override_sets_conflict(&overrides, foo, bar));
    }

    #[test]
    fn siblings_conflict() {
        let overrides = sample();
        let foo = overrides.for_path(["foo"]);
        let baz = overrides.for_path(["baz"]);
        assert_eq!(find_specific_override_set(&overrides, foo, baz), None);
        assert!(do_override_sets_conflict(&overrides, foo, baz));
    }

    #[test]
    fn structurally_equal_sets_match() {
        let mut overrides = Overrides::empty();
        let a = overrides.push(Overrides::ROOT, "a", Some("1.0.0"));
        let b = overrides.push(Overrides::ROOT, "b", None);
        let a_copy = overrides.push(b, "a", Some("1.0.0"));
        assert!(!overrides.is_equal(a, a_copy));
        assert!(overrides.is_equal(a, a));
        assert_eq!(find_specific_override_set(&overrides, Overrides::ROOT, a_copy), Some(a_copy));
    }

    #[test]
    fn selector_names() {
        assert_eq!(selector_name("foo@^1"), "foo");
        assert_eq!(selector_name("@scope/foo@1"), "@scope/foo");
        assert_eq!(selector_name("@scope/foo"), "@scope/foo");
    }
}
