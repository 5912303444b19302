//! Core types and data structures for the concurrent B+ tree.
//!
//! This module contains the fundamental data structures, type definitions,
//! and constants used throughout the tree implementation. Every node lives in
//! an arena slot behind its own read-write lock; traversal code holds
//! arc-owning guards so hand-over-hand lock transfers need no lifetime
//! gymnastics.

use std::sync::atomic::AtomicUsize;

use lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

use crate::arena::NodeArena;
use crate::search::SearchPolicy;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Minimum order (branching factor) for any tree.
pub const MIN_ORDER: usize = 3;

// ============================================================================
// TYPE DEFINITIONS
// ============================================================================

/// Node ID type for arena-based allocation.
pub type NodeId = u32;

/// Sentinel id meaning "no node" (absent sibling, absent parent).
pub const NULL_NODE: NodeId = u32::MAX;

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

/// A thread-safe B+ tree keyed by ordered keys, mapping to opaque values.
///
/// All values are stored in leaf nodes, which are chained by a sibling link
/// in ascending key order, so range scans stream along the leaf level
/// without touching the upper tree. Each node carries its own read-write
/// lock; operations descend with hand-over-hand lock coupling, so readers
/// proceed in parallel throughout the tree and writers serialize only on the
/// nodes they actually change.
///
/// # Type Parameters
///
/// * `K` - Key type; the total order of `Ord` drives routing and scans
/// * `V` - Value type, opaque to the tree; dropped when an entry is removed
///
/// # Examples
///
/// ```
/// use crabtree::BPlusTree;
///
/// let tree = BPlusTree::new(4).unwrap();
/// tree.insert(1, "one").unwrap();
/// tree.insert(2, "two").unwrap();
///
/// assert_eq!(tree.get(&2), Some("two"));
/// assert_eq!(tree.len(), 2);
/// assert_eq!(tree.find_range(&1, &2, 16), vec!["one", "two"]);
/// ```
///
/// # Concurrency
///
/// All operations take `&self`; share the tree between threads with an
/// `Arc`. Point reads and writes on the same key are linearizable because
/// they meet at the same leaf lock. A range scan sees each leaf at the
/// moment its lock was held, not a whole-tree snapshot.
#[derive(Debug)]
pub struct BPlusTree<K, V> {
    /// Branching factor: maximum children per branch, `order - 1` keys per node.
    pub(crate) order: usize,
    /// Intra-node search strategy, fixed at construction.
    pub(crate) search: SearchPolicy,
    /// The current root. Replaced only while the old root's write lock is held.
    pub(crate) root: RwLock<NodeRef>,
    /// Arena storage for leaf nodes.
    pub(crate) leaf_arena: NodeArena<LeafNode<K, V>>,
    /// Arena storage for branch nodes.
    pub(crate) branch_arena: NodeArena<BranchNode<K, V>>,
    /// Entry count, maintained on successful insert/remove.
    pub(crate) len: AtomicUsize,
}

/// Single-field wrapper around a caller value, stored at a leaf slot.
///
/// Exists to decouple future per-entry metadata from the value itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<V> {
    value: V,
}

impl<V> Record<V> {
    /// Wrap a value for storage in a leaf.
    pub fn new(value: V) -> Self {
        Self { value }
    }

    /// Borrow the wrapped value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Mutably borrow the wrapped value.
    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    /// Unwrap, handing ownership of the value back to the caller.
    pub fn into_value(self) -> V {
        self.value
    }
}

/// Leaf node containing keys and their records.
#[derive(Debug)]
pub struct LeafNode<K, V> {
    /// Sorted list of keys.
    pub(crate) keys: Vec<K>,
    /// Records corresponding to keys, index for index.
    pub(crate) records: Vec<Record<V>>,
    /// Next leaf in the sibling chain, `NULL_NODE` at the rightmost leaf.
    pub(crate) next: NodeId,
}

/// Internal (branch) node containing separator keys and child pointers.
#[derive(Debug)]
pub struct BranchNode<K, V> {
    /// Sorted list of separator keys.
    pub(crate) keys: Vec<K>,
    /// Children; always exactly one more than `keys`.
    pub(crate) children: Vec<NodeRef>,
    pub(crate) _marker: std::marker::PhantomData<V>,
}

// ============================================================================
// NODE REFERENCES AND GUARDS
// ============================================================================

/// Node reference that can be either a leaf or a branch node.
///
/// Plain arena id plus the arena it belongs to; `Copy` so branch children
/// and the root slot are single-word values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Leaf(NodeId),
    Branch(NodeId),
}

impl NodeRef {
    /// Return the raw node id.
    pub fn id(&self) -> NodeId {
        match *self {
            NodeRef::Leaf(id) => id,
            NodeRef::Branch(id) => id,
        }
    }

    /// Returns true if this reference points to a leaf node.
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeRef::Leaf(_))
    }
}

/// Arc-owning read guard over a leaf; keeps the node alive while held.
pub(crate) type LeafReadGuard<K, V> = ArcRwLockReadGuard<RawRwLock, LeafNode<K, V>>;
/// Arc-owning write guard over a leaf.
pub(crate) type LeafWriteGuard<K, V> = ArcRwLockWriteGuard<RawRwLock, LeafNode<K, V>>;
/// Arc-owning read guard over a branch.
pub(crate) type BranchReadGuard<K, V> = ArcRwLockReadGuard<RawRwLock, BranchNode<K, V>>;
/// Arc-owning write guard over a branch.
pub(crate) type BranchWriteGuard<K, V> = ArcRwLockWriteGuard<RawRwLock, BranchNode<K, V>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ref_accessors() {
        let leaf = NodeRef::Leaf(7);
        let branch = NodeRef::Branch(7);
        assert_eq!(leaf.id(), 7);
        assert_eq!(branch.id(), 7);
        assert!(leaf.is_leaf());
        assert!(!branch.is_leaf());
        assert_ne!(leaf, branch);
    }

    #[test]
    fn record_round_trip() {
        let mut rec = Record::new(String::from("payload"));
        assert_eq!(rec.value(), "payload");
        rec.value_mut().push('!');
        assert_eq!(rec.into_value(), "payload!");
    }
}
