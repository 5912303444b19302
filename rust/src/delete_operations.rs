//! DELETE operations for the B+ tree.
//!
//! Removal descends in write mode and takes the entry out of its leaf. A
//! non-root node that falls below minimum fill is repaired under the parent
//! lock retained by the descent: first by borrowing an entry from a sibling
//! that can spare one (right sibling preferred, then left), otherwise by
//! coalescing with a sibling (again right first) and deleting the separator
//! from the parent, which may cascade and ultimately shrink the tree by one
//! level. An empty leaf root is kept as-is.

use std::sync::atomic::Ordering;

use log::{debug, trace};

use crate::descent::{WriteDescent, WriteIntent};
use crate::error::{ModifyResult, TreeError, TreeResult};
use crate::types::{BPlusTree, BranchWriteGuard, NodeId, NodeRef, NULL_NODE};

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Remove a key, handing its value back to the caller.
    ///
    /// # Errors
    ///
    /// `TreeError::KeyNotFound` when the key is absent; the tree is
    /// unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use crabtree::BPlusTree;
    ///
    /// let tree = BPlusTree::new(4).unwrap();
    /// tree.insert(1, String::from("one")).unwrap();
    /// assert_eq!(tree.remove(&1).unwrap(), "one");
    /// assert_eq!(tree.get(&1), None);
    /// assert!(tree.remove(&1).is_err());
    /// ```
    pub fn remove(&self, key: &K) -> ModifyResult<V> {
        let mut descent = self.descend_write(key, WriteIntent::Remove)?;
        let index = descent
            .leaf
            .search(self.search, key)
            .map_err(|_| TreeError::KeyNotFound)?;

        let (_key, record) = descent.leaf.remove_at(index);
        let value = record.into_value();
        self.len.fetch_sub(1, Ordering::Relaxed);

        // An empty spine means the leaf either tolerates the removal or is
        // the root, which may empty out entirely and stays a leaf.
        if !descent.spine.is_empty() && descent.leaf.is_underfull(self.order) {
            self.rebalance_leaf(descent)?;
        }
        Ok(value)
    }

    /// Restore minimum fill at the leaf level, then repair any damage done
    /// to the ancestors.
    ///
    /// Range scans travel the sibling chain left to right holding two leaf
    /// locks, so leaf locks here must be acquired in chain order as well:
    /// left sibling, then the node, then the right sibling. The node's own
    /// lock is given up first to restore that order; the parent's write
    /// lock keeps every other writer away from all three leaves in the gap,
    /// and readers passing through see a valid (merely underfull) leaf.
    fn rebalance_leaf(&self, descent: WriteDescent<K, V>) -> TreeResult<()> {
        let WriteDescent {
            mut spine,
            leaf_id,
            leaf,
        } = descent;
        let (parent_id, mut parent) = spine
            .pop()
            .ok_or_else(|| TreeError::corrupted("rebalance", "underflow without a parent"))?;
        let position = parent.position_of(NodeRef::Leaf(leaf_id)).ok_or_else(|| {
            TreeError::corrupted(
                "rebalance",
                format!("leaf {} not under branch {}", leaf_id, parent_id),
            )
        })?;

        let leaf_handle = self.leaf_handle(leaf_id)?;
        drop(leaf);

        let mut left = match position {
            0 => None,
            _ => {
                let left_id = parent.children[position - 1].id();
                Some((left_id, self.leaf_handle(left_id)?.write_arc()))
            }
        };
        let mut leaf = leaf_handle.write_arc();
        let mut right = match position < parent.len() {
            false => None,
            true => {
                let right_id = parent.children[position + 1].id();
                Some((right_id, self.leaf_handle(right_id)?.write_arc()))
            }
        };

        // Redistribute out of the right sibling first, then the left.
        if let Some((right_id, right_guard)) = right.as_mut() {
            if right_guard.can_donate(self.order) {
                let (key, record) = right_guard.borrow_first();
                leaf.accept_from_right(key, record);
                let separator = right_guard
                    .first_key()
                    .cloned()
                    .ok_or_else(|| TreeError::corrupted("rebalance", "drained right sibling"))?;
                parent.replace_key(position, separator);
                trace!("leaf {} borrowed from right sibling {}", leaf_id, right_id);
                return Ok(());
            }
        }
        if let Some((left_id, left_guard)) = left.as_mut() {
            if left_guard.can_donate(self.order) {
                let (key, record) = left_guard.borrow_last();
                leaf.accept_from_left(key, record);
                let separator = leaf
                    .first_key()
                    .cloned()
                    .ok_or_else(|| TreeError::corrupted("rebalance", "empty leaf after borrow"))?;
                parent.replace_key(position - 1, separator);
                trace!("leaf {} borrowed from left sibling {}", leaf_id, left_id);
                return Ok(());
            }
        }

        // Neither sibling can spare an entry: coalesce, right sibling first.
        if let Some((right_id, mut right_guard)) = right {
            leaf.merge_from(&mut right_guard);
            parent.remove_separator(position);
            drop(right_guard);
            self.leaf_arena.deallocate(right_id);
            trace!("leaf {} absorbed right sibling {}", leaf_id, right_id);
        } else if let Some((left_id, mut left_guard)) = left {
            left_guard.merge_from(&mut leaf);
            parent.remove_separator(position - 1);
            drop(leaf);
            self.leaf_arena.deallocate(leaf_id);
            trace!("leaf {} absorbed into left sibling {}", leaf_id, left_id);
        } else {
            return Err(TreeError::corrupted(
                "rebalance",
                format!("leaf {} has no siblings under branch {}", leaf_id, parent_id),
            ));
        }

        self.rebalance_branches(parent_id, parent, spine)
    }

    /// Walk the retained spine upward, repairing each branch that lost a
    /// separator to a coalesce below it.
    fn rebalance_branches(
        &self,
        mut node_id: NodeId,
        mut node: BranchWriteGuard<K, V>,
        mut spine: Vec<(NodeId, BranchWriteGuard<K, V>)>,
    ) -> TreeResult<()> {
        loop {
            let Some((parent_id, mut parent)) = spine.pop() else {
                // Top of the retained spine. Only the root can be drained
                // empty here; when its last separator is gone its sole
                // child takes over and the tree shrinks a level.
                if node.is_empty() {
                    let heir = node.children[0];
                    self.set_parent_ref(heir, NULL_NODE);
                    *self.root.write() = heir;
                    self.branch_arena.deallocate(node_id);
                    debug!("root {} collapsed, new root {:?}", node_id, heir);
                }
                return Ok(());
            };

            if !node.is_underfull(self.order) {
                return Ok(());
            }

            let position = parent.position_of(NodeRef::Branch(node_id)).ok_or_else(|| {
                TreeError::corrupted(
                    "rebalance",
                    format!("branch {} not under branch {}", node_id, parent_id),
                )
            })?;

            let mut right = None;
            if position < parent.len() {
                let right_id = parent.children[position + 1].id();
                let mut right_guard = self.branch_handle(right_id)?.write_arc();
                if right_guard.can_donate(self.order) {
                    // Rotate the separator down and the sibling's first
                    // entry up through the parent.
                    let (key, child) = right_guard.pop_first();
                    let separator = parent.replace_key(position, key);
                    node.push_entry(separator, child);
                    self.set_parent_ref(child, node_id);
                    trace!("branch {} borrowed from right sibling {}", node_id, right_id);
                    return Ok(());
                }
                right = Some((right_id, right_guard));
            }
            let mut left = None;
            if position > 0 {
                let left_id = parent.children[position - 1].id();
                let mut left_guard = self.branch_handle(left_id)?.write_arc();
                if left_guard.can_donate(self.order) {
                    let (key, child) = left_guard.pop_last();
                    let separator = parent.replace_key(position - 1, key);
                    node.unshift_entry(separator, child);
                    self.set_parent_ref(child, node_id);
                    trace!("branch {} borrowed from left sibling {}", node_id, left_id);
                    return Ok(());
                }
                left = Some((left_id, left_guard));
            }

            if let Some((right_id, mut right_guard)) = right {
                let separator = parent.remove_separator(position);
                for child in &right_guard.children {
                    self.set_parent_ref(*child, node_id);
                }
                node.merge_from(separator, &mut right_guard);
                drop(right_guard);
                self.branch_arena.deallocate(right_id);
                trace!("branch {} absorbed right sibling {}", node_id, right_id);
            } else if let Some((left_id, mut left_guard)) = left {
                let separator = parent.remove_separator(position - 1);
                for child in &node.children {
                    self.set_parent_ref(*child, left_id);
                }
                left_guard.merge_from(separator, &mut node);
                self.branch_arena.deallocate(node_id);
                trace!("branch {} absorbed into left sibling {}", node_id, left_id);
            } else {
                return Err(TreeError::corrupted(
                    "rebalance",
                    format!("branch {} has no siblings under {}", node_id, parent_id),
                ));
            }

            node_id = parent_id;
            node = parent;
        }
    }
}
