//! Branch and leaf node shapes for the persistent index tree. See
//! `spec.md` §3.3 and §6 for the logical blob shapes this mirrors.

use serde::{Deserialize, Serialize};

use crate::comparator::Index;
use crate::flake::Flake;

/// A node reference: either a storage key or the empty-subtree sentinel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRef {
    Empty,
    Key(String),
}

impl NodeRef {
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeRef::Empty)
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            NodeRef::Key(k) => Some(k),
            NodeRef::Empty => None,
        }
    }
}

/// A child's summary as held by its parent branch: same shape as a node
/// minus its resolved contents (`children`/`flakes`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChildSummary {
    pub id: NodeRef,
    pub first: Option<Flake>,
    /// Exclusive right boundary: the smallest flake strictly greater than
    /// everything in the subtree, or `None` for the rightmost child.
    pub rhs: Option<Flake>,
    pub size: u64,
    pub leftmost: bool,
}

impl ChildSummary {
    pub fn empty(leftmost: bool) -> ChildSummary {
        ChildSummary {
            id: NodeRef::Empty,
            first: None,
            rhs: None,
            size: 0,
            leftmost,
        }
    }
}

/// Context shared by every node belonging to the same index tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeMeta {
    pub comparator: Index,
    pub network: String,
    pub ledger_id: String,
    pub block: u64,
    pub t: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Leaf {
    pub summary: ChildSummary,
    pub meta: NodeMeta,
    pub flakes: Vec<Flake>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Branch {
    pub summary: ChildSummary,
    pub meta: NodeMeta,
    pub children: Vec<ChildSummary>,
}

#[derive(Clone, Debug)]
pub enum ResolvedNode {
    Leaf(Leaf),
    Branch(Branch),
}

impl ResolvedNode {
    pub fn summary(&self) -> &ChildSummary {
        match self {
            ResolvedNode::Leaf(l) => &l.summary,
            ResolvedNode::Branch(b) => &b.summary,
        }
    }

    pub fn byte_weight(&self, approx_flake_bytes: u64, approx_child_bytes: u64) -> u64 {
        match self {
            ResolvedNode::Leaf(l) => l.flakes.len() as u64 * approx_flake_bytes,
            ResolvedNode::Branch(b) => b.children.len() as u64 * approx_child_bytes,
        }
    }
}
