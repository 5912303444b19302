//! Node-level operations for leaves and branches.
//!
//! Everything here works on a single node whose lock the caller already
//! holds: ordered insert and remove at an index, split layouts, and the
//! borrow/merge helpers used by deletion rebalancing. Split points and
//! minimum-fill counts use integer arithmetic on the tree order `B`
//! (maximum children per branch, `B - 1` keys per node):
//!
//! - leaf split point: `(B + 1) / 2`, leaf minimum: `B / 2`
//! - branch split point: `B / 2`, branch minimum: `(B - 1) / 2`

use crate::search::SearchPolicy;
use crate::types::{BranchNode, LeafNode, NodeRef, Record, NULL_NODE};

/// Minimum entries for a non-root leaf of a tree with the given order.
pub(crate) fn leaf_min_keys(order: usize) -> usize {
    order / 2
}

/// Minimum separators for a non-root branch of a tree with the given order.
pub(crate) fn branch_min_keys(order: usize) -> usize {
    (order - 1) / 2
}

// ============================================================================
// LEAF NODE OPERATIONS
// ============================================================================

impl<K: Ord + Clone, V> LeafNode<K, V> {
    /// Locate `key` in this leaf. `Ok(i)` when present, `Err(i)` with the
    /// insertion index otherwise.
    pub(crate) fn search(&self, policy: SearchPolicy, key: &K) -> Result<usize, usize> {
        policy.locate(&self.keys, key)
    }

    /// Get the record stored for `key`, if any.
    pub(crate) fn get(&self, policy: SearchPolicy, key: &K) -> Option<&Record<V>> {
        self.search(policy, key).ok().map(|i| &self.records[i])
    }

    /// Number of entries in this leaf.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if this leaf holds no entries.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// First key, if any.
    pub(crate) fn first_key(&self) -> Option<&K> {
        self.keys.first()
    }

    /// Returns true if the leaf is at capacity for the given order.
    pub(crate) fn is_full(&self, order: usize) -> bool {
        self.keys.len() >= order - 1
    }

    /// Returns true if a non-root leaf is below minimum fill.
    pub(crate) fn is_underfull(&self, order: usize) -> bool {
        self.keys.len() < leaf_min_keys(order)
    }

    /// Returns true if this leaf can hand an entry to a sibling.
    pub(crate) fn can_donate(&self, order: usize) -> bool {
        self.keys.len() > leaf_min_keys(order)
    }

    /// Insert an entry at `index`, shifting later entries right.
    pub(crate) fn insert_at(&mut self, index: usize, key: K, record: Record<V>) {
        self.keys.insert(index, key);
        self.records.insert(index, record);
    }

    /// Remove the entry at `index`, shifting later entries left.
    pub(crate) fn remove_at(&mut self, index: usize) -> (K, Record<V>) {
        let key = self.keys.remove(index);
        let record = self.records.remove(index);
        (key, record)
    }

    /// Insert the new entry into the full layout and split it off.
    ///
    /// The leaf must be at capacity. After the insert the layout holds
    /// `order` entries; the first `(order + 1) / 2` stay here and the rest
    /// move into the returned right sibling, which inherits this leaf's
    /// `next` link. The caller relinks `self.next` once the new leaf has an
    /// arena id, and promotes the right sibling's first key as separator.
    pub(crate) fn split_after_insert(
        &mut self,
        index: usize,
        key: K,
        record: Record<V>,
        order: usize,
    ) -> LeafNode<K, V> {
        debug_assert!(self.is_full(order));
        self.insert_at(index, key, record);

        let split = (order + 1) / 2;
        let right_keys = self.keys.split_off(split);
        let right_records = self.records.split_off(split);

        LeafNode {
            keys: right_keys,
            records: right_records,
            next: self.next,
        }
    }

    // ------------------------------------------------------------------------
    // Borrowing and merging helpers for deletion rebalancing
    // ------------------------------------------------------------------------

    /// Give up the last entry (this leaf is the left sibling).
    pub(crate) fn borrow_last(&mut self) -> (K, Record<V>) {
        (self.keys.pop().unwrap(), self.records.pop().unwrap())
    }

    /// Give up the first entry (this leaf is the right sibling).
    pub(crate) fn borrow_first(&mut self) -> (K, Record<V>) {
        (self.keys.remove(0), self.records.remove(0))
    }

    /// Accept a borrowed entry at the front (moved in from the left sibling).
    pub(crate) fn accept_from_left(&mut self, key: K, record: Record<V>) {
        self.keys.insert(0, key);
        self.records.insert(0, record);
    }

    /// Accept a borrowed entry at the back (moved in from the right sibling).
    pub(crate) fn accept_from_right(&mut self, key: K, record: Record<V>) {
        self.keys.push(key);
        self.records.push(record);
    }

    /// Absorb the right sibling's entries and take over its `next` link.
    pub(crate) fn merge_from(&mut self, other: &mut LeafNode<K, V>) {
        self.keys.append(&mut other.keys);
        self.records.append(&mut other.records);
        self.next = other.next;
        other.next = NULL_NODE;
    }
}

// ============================================================================
// BRANCH NODE OPERATIONS
// ============================================================================

impl<K: Ord + Clone, V> BranchNode<K, V> {
    /// Number of separator keys in this branch.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if this branch holds no separators.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns true if the branch is at capacity for the given order.
    pub(crate) fn is_full(&self, order: usize) -> bool {
        self.keys.len() >= order - 1
    }

    /// Returns true if a non-root branch is below minimum fill.
    pub(crate) fn is_underfull(&self, order: usize) -> bool {
        self.keys.len() < branch_min_keys(order)
    }

    /// Returns true if this branch can hand an entry to a sibling.
    pub(crate) fn can_donate(&self, order: usize) -> bool {
        self.keys.len() > branch_min_keys(order)
    }

    /// Index of the child subtree that covers `key`. Keys equal to a
    /// separator route right, matching the separator's origin as the first
    /// key of the right-hand split half.
    pub(crate) fn child_index(&self, policy: SearchPolicy, key: &K) -> usize {
        match policy.locate(&self.keys, key) {
            Ok(index) => index + 1,
            Err(index) => index,
        }
    }

    /// The child subtree that covers `key`.
    pub(crate) fn child_for(&self, policy: SearchPolicy, key: &K) -> NodeRef {
        self.children[self.child_index(policy, key)]
    }

    /// Position of `child` in the pointer array, if present.
    pub(crate) fn position_of(&self, child: NodeRef) -> Option<usize> {
        self.children.iter().position(|c| *c == child)
    }

    /// Insert `separator` and the right-hand `child` after position
    /// `left_index`. The caller has verified there is room.
    pub(crate) fn insert_child_at(&mut self, left_index: usize, separator: K, child: NodeRef) {
        self.keys.insert(left_index, separator);
        self.children.insert(left_index + 1, child);
    }

    /// Insert into the full layout and split it off.
    ///
    /// After the insert the layout holds `order` keys and `order + 1`
    /// children. The key at `order / 2` is promoted upward; keys and
    /// children to its left stay here, those to its right move into the
    /// returned node. The caller rewires the moved children's parent links.
    pub(crate) fn split_after_insert(
        &mut self,
        left_index: usize,
        separator: K,
        child: NodeRef,
        order: usize,
    ) -> (BranchNode<K, V>, K) {
        debug_assert!(self.is_full(order));
        self.insert_child_at(left_index, separator, child);

        let split = order / 2;
        let right_keys = self.keys.split_off(split + 1);
        let right_children = self.children.split_off(split + 1);
        let promoted = self.keys.pop().unwrap();

        (BranchNode::with_data(right_keys, right_children), promoted)
    }

    // ------------------------------------------------------------------------
    // Borrowing and merging helpers for deletion rebalancing
    // ------------------------------------------------------------------------

    /// Remove the separator at `index` together with the child to its right,
    /// returning the separator. Used when that child was coalesced away.
    pub(crate) fn remove_separator(&mut self, index: usize) -> K {
        let separator = self.keys.remove(index);
        self.children.remove(index + 1);
        separator
    }

    /// Swap the separator at `index` for a new one, returning the old key.
    pub(crate) fn replace_key(&mut self, index: usize, key: K) -> K {
        std::mem::replace(&mut self.keys[index], key)
    }

    /// Give up the last separator and child (this branch is the left sibling).
    pub(crate) fn pop_last(&mut self) -> (K, NodeRef) {
        (self.keys.pop().unwrap(), self.children.pop().unwrap())
    }

    /// Give up the first separator and child (this branch is the right sibling).
    pub(crate) fn pop_first(&mut self) -> (K, NodeRef) {
        (self.keys.remove(0), self.children.remove(0))
    }

    /// Accept a rotated-down separator and child at the back.
    pub(crate) fn push_entry(&mut self, separator: K, child: NodeRef) {
        self.keys.push(separator);
        self.children.push(child);
    }

    /// Accept a rotated-down separator and child at the front.
    pub(crate) fn unshift_entry(&mut self, separator: K, child: NodeRef) {
        self.keys.insert(0, separator);
        self.children.insert(0, child);
    }

    /// Absorb the right sibling, with the separator pulled down from the
    /// shared parent between the two key runs.
    pub(crate) fn merge_from(&mut self, separator: K, other: &mut BranchNode<K, V>) {
        self.keys.push(separator);
        self.keys.append(&mut other.keys);
        self.children.append(&mut other.children);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    fn leaf(entries: &[i32]) -> LeafNode<i32, String> {
        let mut node = LeafNode::new(8);
        for &k in entries {
            let at = node.len();
            node.insert_at(at, k, Record::new(format!("v{}", k)));
        }
        node
    }

    #[test]
    fn leaf_insert_keeps_order() {
        let mut node = leaf(&[10, 30]);
        let at = node.search(SearchPolicy::Binary, &20).unwrap_err();
        node.insert_at(at, 20, Record::new("v20".into()));
        assert_eq!(node.keys, vec![10, 20, 30]);
        assert_eq!(node.get(SearchPolicy::Linear, &20).unwrap().value(), "v20");
    }

    #[test]
    fn leaf_split_balances_even_order() {
        // Order 4: a full leaf has 3 entries; the overflow layout of 4
        // splits 2/2.
        let mut node = leaf(&[1, 2, 4]);
        let right = node.split_after_insert(2, 3, Record::new("v3".into()), 4);
        assert_eq!(node.keys, vec![1, 2]);
        assert_eq!(right.keys, vec![3, 4]);
        assert!(!node.is_underfull(4));
        assert!(!right.is_underfull(4));
    }

    #[test]
    fn leaf_split_smallest_order() {
        // Order 3: overflow layout of 3 splits 2/1; minimum fill is 1.
        let mut node = leaf(&[1, 3]);
        let right = node.split_after_insert(1, 2, Record::new("v2".into()), 3);
        assert_eq!(node.keys, vec![1, 2]);
        assert_eq!(right.keys, vec![3]);
        assert!(!right.is_underfull(3));
    }

    #[test]
    fn leaf_split_odd_order() {
        let mut node = leaf(&[1, 2, 3, 5]);
        let right = node.split_after_insert(3, 4, Record::new("v4".into()), 5);
        assert_eq!(node.keys, vec![1, 2, 3]);
        assert_eq!(right.keys, vec![4, 5]);
    }

    #[test]
    fn leaf_split_inherits_next_link() {
        let mut node = leaf(&[1, 2, 4]);
        node.next = 17;
        let right = node.split_after_insert(2, 3, Record::new("v3".into()), 4);
        assert_eq!(right.next, 17);
    }

    #[test]
    fn leaf_borrow_and_accept() {
        let mut left = leaf(&[1, 2, 3]);
        let mut node = leaf(&[5]);
        let (k, rec) = left.borrow_last();
        node.accept_from_left(k, rec);
        assert_eq!(left.keys, vec![1, 2]);
        assert_eq!(node.keys, vec![3, 5]);

        let mut right = leaf(&[7, 8, 9]);
        let (k, rec) = right.borrow_first();
        node.accept_from_right(k, rec);
        assert_eq!(node.keys, vec![3, 5, 7]);
        assert_eq!(right.keys, vec![8, 9]);
    }

    #[test]
    fn leaf_merge_takes_chain_link() {
        let mut left = leaf(&[1, 2]);
        let mut right = leaf(&[3, 4]);
        right.next = 42;
        left.merge_from(&mut right);
        assert_eq!(left.keys, vec![1, 2, 3, 4]);
        assert_eq!(left.next, 42);
        assert!(right.is_empty());
    }

    fn branch(keys: &[i32], first_child: NodeId) -> BranchNode<i32, String> {
        let children = (0..=keys.len() as NodeId)
            .map(|i| NodeRef::Leaf(first_child + i))
            .collect();
        BranchNode::with_data(keys.to_vec(), children)
    }

    #[test]
    fn child_index_routes_equal_keys_right() {
        let node = branch(&[5, 10], 0);
        assert_eq!(node.child_index(SearchPolicy::Binary, &3), 0);
        assert_eq!(node.child_index(SearchPolicy::Binary, &5), 1);
        assert_eq!(node.child_index(SearchPolicy::Binary, &7), 1);
        assert_eq!(node.child_index(SearchPolicy::Binary, &10), 2);
        assert_eq!(node.child_index(SearchPolicy::Binary, &15), 2);
        assert_eq!(node.child_index(SearchPolicy::Linear, &10), 2);
    }

    #[test]
    fn branch_split_promotes_middle_key() {
        // Order 4: full branch has 3 keys; the overflow layout of 4 keys
        // leaves 2, promotes 1, moves 1.
        let mut node = branch(&[10, 20, 40], 0);
        let (right, promoted) =
            node.split_after_insert(2, 30, NodeRef::Leaf(9), 4);
        assert_eq!(promoted, 30);
        assert_eq!(node.keys, vec![10, 20]);
        assert_eq!(node.children.len(), 3);
        assert_eq!(right.keys, vec![40]);
        assert_eq!(right.children, vec![NodeRef::Leaf(9), NodeRef::Leaf(3)]);
    }

    #[test]
    fn branch_rotation_helpers() {
        let mut node = branch(&[10, 20], 0);
        let (k, c) = node.pop_first();
        assert_eq!(k, 10);
        assert_eq!(c, NodeRef::Leaf(0));
        node.push_entry(30, NodeRef::Leaf(7));
        assert_eq!(node.keys, vec![20, 30]);

        node.unshift_entry(5, NodeRef::Leaf(8));
        assert_eq!(node.keys, vec![5, 20, 30]);
        let (k, c) = node.pop_last();
        assert_eq!(k, 30);
        assert_eq!(c, NodeRef::Leaf(7));
    }

    #[test]
    fn branch_merge_pulls_separator_down() {
        let mut left = branch(&[10], 0);
        let mut right = branch(&[30], 10);
        left.merge_from(20, &mut right);
        assert_eq!(left.keys, vec![10, 20, 30]);
        assert_eq!(left.children.len(), 4);
    }

    #[test]
    fn remove_separator_drops_right_child() {
        let mut node = branch(&[10, 20], 0);
        let sep = node.remove_separator(0);
        assert_eq!(sep, 10);
        assert_eq!(node.keys, vec![20]);
        assert_eq!(node.children, vec![NodeRef::Leaf(0), NodeRef::Leaf(2)]);
    }
}
