//! Arena-indexed diff tree: what a resolver says would change on disk.

use std::fmt;

use serde::{Deserialize, Serialize};

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiffAction {
    Add,
    Change,
    Remove,
}

impl fmt::Display for DiffAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiffAction::Add => "add",
            DiffAction::Change => "change",
            DiffAction::Remove => "remove",
        };
        f.write_str(label)
    }
}

/// A package at one install location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    pub version: String,
    pub location: String,
    pub resolved: Option<String>,
}

impl TreeNode {
    pub fn pkgid(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiffNode {
    /// `None` for nodes that only carry changed descendants.
    pub action: Option<DiffAction>,
    pub actual: Option<TreeNode>,
    pub ideal: Option<TreeNode>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct DiffTree {
    nodes: Vec<DiffNode>,
}

impl Default for DiffTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffTree {
    pub const ROOT: NodeId = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![DiffNode::default()],
        }
    }

    /// Appends `node` under `parent` and returns its id.
    pub fn add(&mut self, parent: NodeId, node: DiffNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        id
    }

    /// Adds an edge between existing nodes. Cycles are representable.
    pub fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent].children.push(child);
    }

    pub fn node(&self, id: NodeId) -> &DiffNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Nodes carrying an action, in arena order.
    pub fn changes(&self) -> impl Iterator<Item = &DiffNode> {
        self.nodes.iter().filter(|node| node.action.is_some())
    }
}
