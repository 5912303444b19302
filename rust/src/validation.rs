//! Invariant checking and debugging utilities.
//!
//! The checker walks the tree under read locks and audits the structural
//! invariants: strict key order within and across nodes, capacity and
//! minimum-fill bounds, child/separator arity, parent back-references, and
//! the leaf sibling chain against an independent in-order walk. It is meant
//! for tests and quiescent trees; running it against a tree under heavy
//! mutation will observe each node at a different instant.

use crate::error::TreeError;
use crate::node::{branch_min_keys, leaf_min_keys};
use crate::types::{BPlusTree, NodeId, NodeRef, NULL_NODE};

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Check all tree invariants. Returns true when every one holds.
    pub fn check_invariants(&self) -> bool {
        self.check_invariants_detailed().is_ok()
    }

    /// Check all tree invariants with error reporting.
    pub fn check_invariants_detailed(&self) -> Result<(), String> {
        let root = self.root_ref();
        let entries = self.check_node(root, None, None, true, NULL_NODE)?;

        if entries != self.len() {
            return Err(format!(
                "tree walk found {} entries but len() reports {}",
                entries,
                self.len()
            ));
        }

        self.check_sibling_chain(root)?;
        self.check_arena_consistency()
    }

    /// Alias for `check_invariants_detailed`.
    pub fn validate(&self) -> Result<(), String> {
        self.check_invariants_detailed()
    }

    /// Sizes of all leaves in sibling-chain order (for tests/debugging).
    pub fn leaf_sizes(&self) -> Vec<usize> {
        let Ok((_, mut guard)) = self.leftmost_leaf_read() else {
            return Vec::new();
        };
        let mut sizes = Vec::new();
        loop {
            sizes.push(guard.len());
            let next = guard.next;
            if next == NULL_NODE {
                return sizes;
            }
            let Some(handle) = self.leaf_arena.get(next) else {
                return sizes;
            };
            guard = handle.read_arc();
        }
    }

    /// Recursively audit one node and its subtree. Returns the entry count.
    fn check_node(
        &self,
        node: NodeRef,
        min: Option<&K>,
        max: Option<&K>,
        is_root: bool,
        expected_parent: NodeId,
    ) -> Result<usize, String> {
        let recorded_parent = match node {
            NodeRef::Leaf(id) => self.leaf_arena.parent_of(id),
            NodeRef::Branch(id) => self.branch_arena.parent_of(id),
        };
        if recorded_parent != expected_parent {
            return Err(format!(
                "node {} records parent {} but is reached from {}",
                node.id(),
                recorded_parent,
                expected_parent
            ));
        }

        match node {
            NodeRef::Leaf(id) => {
                let leaf = self
                    .leaf_handle(id)
                    .map_err(|e| e.to_string())?
                    .read_arc();

                if leaf.keys.len() != leaf.records.len() {
                    return Err(format!(
                        "leaf {}: {} keys but {} records",
                        id,
                        leaf.keys.len(),
                        leaf.records.len()
                    ));
                }
                if leaf.len() > self.order - 1 {
                    return Err(format!("leaf {} exceeds capacity: {}", id, leaf.len()));
                }
                if !is_root && leaf.len() < leaf_min_keys(self.order) {
                    return Err(format!("leaf {} below minimum fill: {}", id, leaf.len()));
                }
                check_sorted(&leaf.keys, min, max).map_err(|e| format!("leaf {}: {}", id, e))?;
                Ok(leaf.len())
            }
            NodeRef::Branch(id) => {
                let branch = self
                    .branch_handle(id)
                    .map_err(|e| e.to_string())?
                    .read_arc();

                if branch.keys.len() + 1 != branch.children.len() {
                    return Err(format!(
                        "branch {}: {} keys but {} children",
                        id,
                        branch.keys.len(),
                        branch.children.len()
                    ));
                }
                if branch.len() > self.order - 1 {
                    return Err(format!("branch {} exceeds capacity: {}", id, branch.len()));
                }
                if is_root {
                    if branch.is_empty() {
                        return Err(format!("branch root {} has no separator", id));
                    }
                } else if branch.len() < branch_min_keys(self.order) {
                    return Err(format!("branch {} below minimum fill: {}", id, branch.len()));
                }
                check_sorted(&branch.keys, min, max)
                    .map_err(|e| format!("branch {}: {}", id, e))?;

                let mut entries = 0;
                for (i, child) in branch.children.iter().enumerate() {
                    let child_min = if i == 0 { min } else { Some(&branch.keys[i - 1]) };
                    let child_max = if i == branch.keys.len() {
                        max
                    } else {
                        Some(&branch.keys[i])
                    };
                    entries += self.check_node(*child, child_min, child_max, false, id)?;
                }
                Ok(entries)
            }
        }
    }

    /// The chain must visit exactly the leaves of an in-order walk, in the
    /// same sequence, with keys strictly ascending across the whole walk.
    fn check_sibling_chain(&self, root: NodeRef) -> Result<(), String> {
        let mut walk_ids = Vec::new();
        self.collect_leaf_ids(root, &mut walk_ids)
            .map_err(|e| e.to_string())?;

        let mut chain_ids = Vec::new();
        let mut cursor = *walk_ids
            .first()
            .ok_or_else(|| "tree has no leaves".to_string())?;
        loop {
            chain_ids.push(cursor);
            let leaf = self
                .leaf_handle(cursor)
                .map_err(|e| e.to_string())?
                .read_arc();
            if leaf.next == NULL_NODE {
                break;
            }
            cursor = leaf.next;
        }

        if walk_ids != chain_ids {
            return Err(format!(
                "in-order walk visits {:?} but sibling chain visits {:?}",
                walk_ids, chain_ids
            ));
        }

        let keys = self.keys();
        for pair in keys.windows(2) {
            if pair[0] >= pair[1] {
                return Err("sibling chain keys are not strictly ascending".to_string());
            }
        }
        Ok(())
    }

    fn collect_leaf_ids(&self, node: NodeRef, out: &mut Vec<NodeId>) -> Result<(), TreeError> {
        match node {
            NodeRef::Leaf(id) => {
                out.push(id);
                Ok(())
            }
            NodeRef::Branch(id) => {
                let branch = self.branch_handle(id)?.read_arc();
                for child in &branch.children {
                    self.collect_leaf_ids(*child, out)?;
                }
                Ok(())
            }
        }
    }

    /// Every arena slot must be reachable from the root and vice versa.
    fn check_arena_consistency(&self) -> Result<(), String> {
        let (leaves, branches) = self.count_nodes_in_tree().map_err(|e| e.to_string())?;
        if leaves != self.leaf_arena.allocated_count() {
            return Err(format!(
                "{} leaves in tree but {} allocated",
                leaves,
                self.leaf_arena.allocated_count()
            ));
        }
        if branches != self.branch_arena.allocated_count() {
            return Err(format!(
                "{} branches in tree but {} allocated",
                branches,
                self.branch_arena.allocated_count()
            ));
        }
        Ok(())
    }
}

fn check_sorted<K: Ord>(keys: &[K], min: Option<&K>, max: Option<&K>) -> Result<(), String> {
    for pair in keys.windows(2) {
        if pair[0] >= pair[1] {
            return Err("keys not strictly ascending".to_string());
        }
    }
    if let (Some(min), Some(first)) = (min, keys.first()) {
        if first < min {
            return Err("first key below subtree lower bound".to_string());
        }
    }
    if let (Some(max), Some(last)) = (max, keys.last()) {
        if last >= max {
            return Err("last key reaches subtree upper bound".to_string());
        }
    }
    Ok(())
}
