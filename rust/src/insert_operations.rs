//! INSERT operations for the B+ tree.
//!
//! Insertion descends in write mode, rejects duplicates inside the locked
//! leaf before any structural work, and otherwise places the entry at its
//! sorted slot. A full leaf splits; the separator climbs the retained spine,
//! splitting full branches on the way, until a parent absorbs it or a new
//! root is installed. Guards on already-split nodes are held until the level
//! above has been rewired, so no reader is ever routed by a parent that does
//! not yet know about both halves.

use std::sync::atomic::Ordering;

use log::{debug, trace};

use crate::descent::{WriteDescent, WriteIntent};
use crate::error::{ModifyResult, TreeError, TreeResult};
use crate::types::{BPlusTree, BranchNode, BranchWriteGuard, NodeId, NodeRef, Record};

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Insert a key-value pair.
    ///
    /// The tree takes ownership of both. Duplicate keys are rejected without
    /// side effects; the original value stays in place.
    ///
    /// # Errors
    ///
    /// * `TreeError::DuplicateKey` when the key is already present
    /// * `TreeError::ArenaExhausted` when the id space is exhausted; the
    ///   tree is left exactly as it was
    ///
    /// # Examples
    ///
    /// ```
    /// use crabtree::{BPlusTree, TreeError};
    ///
    /// let tree = BPlusTree::new(4).unwrap();
    /// tree.insert(3, "c").unwrap();
    /// assert!(matches!(tree.insert(3, "x"), Err(TreeError::DuplicateKey)));
    /// assert_eq!(tree.get(&3), Some("c"));
    /// ```
    pub fn insert(&self, key: K, value: V) -> ModifyResult<()> {
        let mut descent = self.descend_write(&key, WriteIntent::Insert)?;
        let index = match descent.leaf.search(self.search, &key) {
            Ok(_) => return Err(TreeError::DuplicateKey),
            Err(index) => index,
        };

        if !descent.leaf.is_full(self.order) {
            descent.leaf.insert_at(index, key, Record::new(value));
        } else {
            self.split_leaf_and_insert(descent, index, key, value)?;
        }
        self.len.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Split the full target leaf around the incoming entry and push the
    /// separator up the spine.
    fn split_leaf_and_insert(
        &self,
        descent: WriteDescent<K, V>,
        index: usize,
        key: K,
        value: V,
    ) -> TreeResult<()> {
        let WriteDescent {
            spine,
            leaf_id,
            mut leaf,
        } = descent;

        // Fail before touching anything if the id space cannot cover the
        // whole cascade; insertion stays all-or-nothing.
        let full_parents = spine
            .iter()
            .filter(|(_, guard)| guard.is_full(self.order))
            .count();
        self.leaf_arena.ensure_capacity(1)?;
        self.branch_arena.ensure_capacity(full_parents + 1)?;

        let right = leaf.split_after_insert(index, key, Record::new(value), self.order);
        let right_id = self.leaf_arena.allocate(right)?;
        // Write-locked before it becomes reachable through the sibling chain,
        // held until its parent slot is installed.
        let right_handle = self.leaf_handle(right_id)?;
        let right_guard = right_handle.write_arc();
        leaf.next = right_id;
        self.leaf_arena
            .set_parent(right_id, self.leaf_arena.parent_of(leaf_id));

        let separator = right_guard
            .first_key()
            .cloned()
            .ok_or_else(|| TreeError::corrupted("leaf split", "empty right sibling"))?;
        trace!("leaf {} split, new sibling {}", leaf_id, right_id);

        self.propagate_split(spine, NodeRef::Leaf(leaf_id), separator, NodeRef::Leaf(right_id))
        // The leaf and sibling guards release here, after the spine settled.
    }

    /// Install `(left, separator, right)` into the lowest retained ancestor,
    /// splitting full ancestors on the way up.
    fn propagate_split(
        &self,
        mut spine: Vec<(NodeId, BranchWriteGuard<K, V>)>,
        mut left: NodeRef,
        mut separator: K,
        mut right: NodeRef,
    ) -> TreeResult<()> {
        // Guards on already-split levels; released only once the loop exits
        // with the top of the cascade rewired.
        let mut settled: Vec<BranchWriteGuard<K, V>> = Vec::new();

        loop {
            let Some((parent_id, mut parent)) = spine.pop() else {
                // No ancestor retained: `left` is the old root.
                return self.install_new_root(left, separator, right);
            };

            let left_index = parent.position_of(left).ok_or_else(|| {
                TreeError::corrupted(
                    "split propagation",
                    format!("child {} not under branch {}", left.id(), parent_id),
                )
            })?;

            if !parent.is_full(self.order) {
                parent.insert_child_at(left_index, separator, right);
                return Ok(());
            }

            // The parent is full too: split it and keep climbing.
            let (new_branch, promoted) =
                parent.split_after_insert(left_index, separator, right, self.order);
            let new_id = self.branch_arena.allocate(new_branch)?;
            let new_handle = self.branch_handle(new_id)?;
            let new_guard = new_handle.write_arc();
            for child in &new_guard.children {
                self.set_parent_ref(*child, new_id);
            }
            self.branch_arena
                .set_parent(new_id, self.branch_arena.parent_of(parent_id));
            trace!("branch {} split, new sibling {}", parent_id, new_id);

            settled.push(parent);
            settled.push(new_guard);
            left = NodeRef::Branch(parent_id);
            separator = promoted;
            right = NodeRef::Branch(new_id);
        }
    }

    /// Grow the tree by one level: a fresh branch with one separator and two
    /// children becomes the root. The caller still holds the old root's
    /// write lock, so the single-word publication is ordered after the
    /// split it reflects.
    fn install_new_root(&self, left: NodeRef, separator: K, right: NodeRef) -> TreeResult<()> {
        let root = BranchNode::with_data(vec![separator], vec![left, right]);
        let root_id = self.branch_arena.allocate(root)?;
        self.set_parent_ref(left, root_id);
        self.set_parent_ref(right, root_id);
        *self.root.write() = NodeRef::Branch(root_id);
        debug!("root split, tree grew under new root {}", root_id);
        Ok(())
    }

    /// Rewire a node's upward link, whichever arena it lives in.
    pub(crate) fn set_parent_ref(&self, node: NodeRef, parent: NodeId) {
        match node {
            NodeRef::Leaf(id) => self.leaf_arena.set_parent(id, parent),
            NodeRef::Branch(id) => self.branch_arena.set_parent(id, parent),
        }
    }
}
