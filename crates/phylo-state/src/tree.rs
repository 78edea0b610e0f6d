//! Rooted binary tree state node with double-buffered heights and topology.

use phylo_core::errors::ErrorInfo;
use phylo_core::PhyloError;
use serde::{Deserialize, Serialize};

/// Sentinel marking the root's parent slot and a leaf's child slots.
pub const NO_NODE: usize = usize::MAX;

/// Rooted binary tree over `2 * leaf_count - 1` nodes.
///
/// Leaves occupy indices `[0, leaf_count)` and carry immutable taxon labels;
/// internal nodes occupy the rest. Every node has a height, and a branch
/// length is derived as `height(parent) - height(child)`; the structural
/// invariant `height(child) <= height(parent)` must hold on every edge of an
/// accepted state. Heights, parent links and child links each have a stored
/// twin: `store` copies current into stored and `restore` swaps the arrays
/// back, so a rejected topology edit rolls back without reconstruction.
#[derive(Debug, Clone)]
pub struct Tree {
    labels: Vec<String>,
    heights: Vec<f64>,
    stored_heights: Vec<f64>,
    parents: Vec<usize>,
    stored_parents: Vec<usize>,
    children: Vec<[usize; 2]>,
    stored_children: Vec<[usize; 2]>,
    root: usize,
    stored_root: usize,
    dirty: Vec<bool>,
}

/// Equality covers the live topology and heights only. The stored twins are
/// scratch whose content depends on the store/restore history (`restore`
/// swaps rather than copies), and dirty marks are iteration bookkeeping.
impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
            && self.heights == other.heights
            && self.parents == other.parents
            && self.children == other.children
            && self.root == other.root
    }
}

/// Serializable checkpoint record for a tree (parents use `-1` for the root).
///
/// Child slot order is part of the record: topology moves draw left/right
/// children by slot, so a resumed run must see the exact slot arrays the
/// checkpointed run had, not a canonical reconstruction from the parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeRecord {
    /// Taxon labels for the leaves, in leaf index order.
    pub labels: Vec<String>,
    /// Parent index per node, `-1` for the root.
    pub parents: Vec<i64>,
    /// Height per node.
    pub heights: Vec<f64>,
    /// Child slots per node in stored order, `-1` for leaf slots.
    pub children: Vec<[i64; 2]>,
}

impl Tree {
    /// Builds a tree from leaf labels, a parent array and a height array.
    ///
    /// `parents.len()` and `heights.len()` must equal `2 * labels.len() - 1`,
    /// with `NO_NODE` marking the root's parent slot. Child links are derived
    /// and the structural invariants validated.
    pub fn from_arrays(
        labels: Vec<String>,
        parents: Vec<usize>,
        heights: Vec<f64>,
    ) -> Result<Self, PhyloError> {
        let leaf_count = labels.len();
        if leaf_count < 2 {
            return Err(PhyloError::Tree(ErrorInfo::new(
                "too-few-taxa",
                "a tree needs at least two leaves",
            )));
        }
        let node_count = 2 * leaf_count - 1;
        if parents.len() != node_count || heights.len() != node_count {
            return Err(PhyloError::Tree(
                ErrorInfo::new("array-length", "parent/height arrays must cover every node")
                    .with_context("expected", node_count.to_string())
                    .with_context("parents", parents.len().to_string())
                    .with_context("heights", heights.len().to_string()),
            ));
        }

        let mut children = vec![[NO_NODE; 2]; node_count];
        let mut root = NO_NODE;
        for (node, &parent) in parents.iter().enumerate() {
            if parent == NO_NODE {
                if root != NO_NODE {
                    return Err(PhyloError::Tree(ErrorInfo::new(
                        "multiple-roots",
                        "more than one node without a parent",
                    )));
                }
                root = node;
                continue;
            }
            if parent < leaf_count || parent >= node_count {
                return Err(PhyloError::Tree(
                    ErrorInfo::new("bad-parent", "parent index is not an internal node")
                        .with_context("node", node.to_string())
                        .with_context("parent", parent.to_string()),
                ));
            }
            let slots = &mut children[parent];
            if slots[0] == NO_NODE {
                slots[0] = node;
            } else if slots[1] == NO_NODE {
                slots[1] = node;
            } else {
                return Err(PhyloError::Tree(
                    ErrorInfo::new("multifurcation", "internal node has more than two children")
                        .with_context("node", parent.to_string()),
                ));
            }
        }
        if root == NO_NODE {
            return Err(PhyloError::Tree(ErrorInfo::new(
                "no-root",
                "every node has a parent",
            )));
        }

        let tree = Self {
            labels,
            stored_heights: heights.clone(),
            heights,
            stored_parents: parents.clone(),
            parents,
            stored_children: children.clone(),
            children,
            root,
            stored_root: root,
            dirty: vec![false; node_count],
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.labels.len()
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.heights.len()
    }

    /// True when `node` is a leaf.
    pub fn is_leaf(&self, node: usize) -> bool {
        node < self.labels.len()
    }

    /// Taxon label of a leaf.
    pub fn label(&self, leaf: usize) -> &str {
        &self.labels[leaf]
    }

    /// Index of the root node.
    pub fn root(&self) -> usize {
        self.root
    }

    /// Height of `node`.
    pub fn height(&self, node: usize) -> f64 {
        self.heights[node]
    }

    /// Sets the height of `node` and marks it dirty.
    pub fn set_height(&mut self, node: usize, height: f64) {
        self.heights[node] = height;
        self.dirty[node] = true;
    }

    /// Parent of `node`, or `None` for the root.
    pub fn parent(&self, node: usize) -> Option<usize> {
        match self.parents[node] {
            NO_NODE => None,
            parent => Some(parent),
        }
    }

    /// Children of an internal node, or `None` for a leaf.
    pub fn children(&self, node: usize) -> Option<[usize; 2]> {
        if self.is_leaf(node) {
            None
        } else {
            Some(self.children[node])
        }
    }

    /// Length of the branch above `node` (zero for the root).
    pub fn branch_length(&self, node: usize) -> f64 {
        match self.parent(node) {
            Some(parent) => self.heights[parent] - self.heights[node],
            None => 0.0,
        }
    }

    /// Replaces `old_child` with `new_child` under `parent`, rewiring the
    /// child's parent link and marking all three nodes dirty.
    pub fn replace_child(
        &mut self,
        parent: usize,
        old_child: usize,
        new_child: usize,
    ) -> Result<(), PhyloError> {
        let slots = &mut self.children[parent];
        let slot = slots.iter().position(|&c| c == old_child).ok_or_else(|| {
            PhyloError::Tree(
                ErrorInfo::new("not-a-child", "node is not a child of the given parent")
                    .with_context("parent", parent.to_string())
                    .with_context("child", old_child.to_string()),
            )
        })?;
        slots[slot] = new_child;
        self.parents[new_child] = parent;
        self.dirty[parent] = true;
        self.dirty[old_child] = true;
        self.dirty[new_child] = true;
        Ok(())
    }

    /// Post-order traversal (children before parents) from the root.
    pub fn post_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.node_count());
        let mut stack = vec![(self.root, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded || self.is_leaf(node) {
                order.push(node);
            } else {
                stack.push((node, true));
                let [left, right] = self.children[node];
                stack.push((right, false));
                stack.push((left, false));
            }
        }
        order
    }

    /// True when `node` changed since the last accept/restore.
    pub fn is_node_dirty(&self, node: usize) -> bool {
        self.dirty[node]
    }

    /// Marks a single node dirty.
    pub fn mark_node_dirty(&mut self, node: usize) {
        self.dirty[node] = true;
    }

    /// True when any node is dirty.
    pub fn any_dirty(&self) -> bool {
        self.dirty.iter().any(|&d| d)
    }

    /// Sets every node's dirty mark, used by the verification pass.
    pub fn set_all_dirty(&mut self, dirty: bool) {
        self.dirty.iter_mut().for_each(|d| *d = dirty);
    }

    /// Snapshots heights, parent links, child links and the root index.
    pub fn store(&mut self) {
        self.stored_heights.copy_from_slice(&self.heights);
        self.stored_parents.copy_from_slice(&self.parents);
        self.stored_children.copy_from_slice(&self.children);
        self.stored_root = self.root;
    }

    /// Swaps current and stored buffers, undoing all edits since `store`.
    pub fn restore(&mut self) {
        std::mem::swap(&mut self.heights, &mut self.stored_heights);
        std::mem::swap(&mut self.parents, &mut self.stored_parents);
        std::mem::swap(&mut self.children, &mut self.stored_children);
        std::mem::swap(&mut self.root, &mut self.stored_root);
        self.dirty.iter_mut().for_each(|d| *d = false);
    }

    /// Keeps the current topology and heights and clears dirty marks.
    pub fn accept(&mut self) {
        self.dirty.iter_mut().for_each(|d| *d = false);
    }

    /// Checks parent/child mutual consistency and the height invariant.
    pub fn validate(&self) -> Result<(), PhyloError> {
        for node in 0..self.node_count() {
            if let Some(parent) = self.parent(node) {
                if !self.children[parent].contains(&node) {
                    return Err(PhyloError::Tree(
                        ErrorInfo::new("orphaned-node", "parent does not list node as a child")
                            .with_context("node", node.to_string())
                            .with_context("parent", parent.to_string()),
                    ));
                }
                if self.heights[node] > self.heights[parent] {
                    return Err(PhyloError::Tree(
                        ErrorInfo::new("negative-branch", "child is older than its parent")
                            .with_context("node", node.to_string())
                            .with_context("child_height", self.heights[node].to_string())
                            .with_context("parent_height", self.heights[parent].to_string()),
                    ));
                }
            }
            if !self.is_leaf(node) {
                for &child in &self.children[node] {
                    if child == NO_NODE {
                        return Err(PhyloError::Tree(
                            ErrorInfo::new("missing-child", "internal node has fewer than two children")
                                .with_context("node", node.to_string()),
                        ));
                    }
                    if self.parents[child] != node {
                        return Err(PhyloError::Tree(
                            ErrorInfo::new("broken-link", "child does not point back at parent")
                                .with_context("node", node.to_string())
                                .with_context("child", child.to_string()),
                        ));
                    }
                }
            }
        }
        if self.parents[self.root] != NO_NODE {
            return Err(PhyloError::Tree(ErrorInfo::new(
                "bad-root",
                "root node has a parent",
            )));
        }
        Ok(())
    }

    /// Extracts a checkpoint record for the current topology and heights.
    pub fn to_record(&self) -> TreeRecord {
        let encode = |n: usize| if n == NO_NODE { -1 } else { n as i64 };
        TreeRecord {
            labels: self.labels.clone(),
            parents: self.parents.iter().map(|&p| encode(p)).collect(),
            heights: self.heights.clone(),
            children: self
                .children
                .iter()
                .map(|&[a, b]| [encode(a), encode(b)])
                .collect(),
        }
    }

    /// Reconstructs a tree from a checkpoint record, preserving child slot
    /// order exactly as checkpointed.
    pub fn from_record(record: &TreeRecord) -> Result<Self, PhyloError> {
        let leaf_count = record.labels.len();
        if leaf_count < 2 {
            return Err(PhyloError::Tree(ErrorInfo::new(
                "too-few-taxa",
                "a tree needs at least two leaves",
            )));
        }
        let node_count = 2 * leaf_count - 1;
        if record.parents.len() != node_count
            || record.heights.len() != node_count
            || record.children.len() != node_count
        {
            return Err(PhyloError::Tree(
                ErrorInfo::new("array-length", "record arrays must cover every node")
                    .with_context("expected", node_count.to_string())
                    .with_context("parents", record.parents.len().to_string())
                    .with_context("heights", record.heights.len().to_string())
                    .with_context("children", record.children.len().to_string()),
            ));
        }
        let decode = |n: i64| if n < 0 { NO_NODE } else { n as usize };
        let parents: Vec<usize> = record.parents.iter().map(|&p| decode(p)).collect();
        let children: Vec<[usize; 2]> = record
            .children
            .iter()
            .map(|&[a, b]| [decode(a), decode(b)])
            .collect();
        let root = parents.iter().position(|&p| p == NO_NODE).ok_or_else(|| {
            PhyloError::Tree(ErrorInfo::new("no-root", "every node has a parent"))
        })?;
        let tree = Self {
            labels: record.labels.clone(),
            stored_heights: record.heights.clone(),
            heights: record.heights.clone(),
            stored_parents: parents.clone(),
            parents,
            stored_children: children.clone(),
            children,
            root,
            stored_root: root,
            dirty: vec![false; node_count],
        };
        tree.validate()?;
        Ok(tree)
    }
}
