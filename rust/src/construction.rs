//! Construction and initialization for the tree and its nodes.
//!
//! This module contains order validation, arena initialization, and the
//! node constructors. A fresh tree always has a root: an empty leaf, which
//! it keeps even when the last entry is removed.

use std::marker::PhantomData;
use std::sync::atomic::AtomicUsize;

use parking_lot::RwLock;

use crate::arena::NodeArena;
use crate::error::{InitResult, TreeError};
use crate::search::SearchPolicy;
use crate::types::{BPlusTree, BranchNode, LeafNode, NodeRef, MIN_ORDER, NULL_NODE};

/// Default order for trees built without an explicit one.
pub const DEFAULT_ORDER: usize = 16;

impl<K, V> BPlusTree<K, V> {
    /// Create a B+ tree with the specified order (branching factor).
    ///
    /// The order is the maximum number of children per branch node; every
    /// node holds at most `order - 1` keys.
    ///
    /// # Arguments
    ///
    /// * `order` - Branching factor, minimum 3
    ///
    /// # Returns
    ///
    /// `Ok(BPlusTree)` when the order is valid, `Err(TreeError::InvalidOrder)`
    /// otherwise.
    ///
    /// # Examples
    ///
    /// ```
    /// use crabtree::BPlusTree;
    ///
    /// let tree = BPlusTree::<i32, String>::new(16).unwrap();
    /// assert!(tree.is_empty());
    /// assert!(BPlusTree::<i32, String>::new(2).is_err());
    /// ```
    pub fn new(order: usize) -> InitResult<Self> {
        Self::with_search_policy(order, SearchPolicy::default())
    }

    /// Create a B+ tree with the default order.
    pub fn with_default_order() -> InitResult<Self> {
        Self::new(DEFAULT_ORDER)
    }

    /// Create a B+ tree with an explicit intra-node search strategy.
    ///
    /// Linear and binary search locate identical slots; the policy only
    /// trades constant factors and is fixed for the tree's lifetime.
    pub fn with_search_policy(order: usize, search: SearchPolicy) -> InitResult<Self> {
        if order < MIN_ORDER {
            return Err(TreeError::invalid_order(order));
        }

        // The root starts life as an empty leaf.
        let leaf_arena = NodeArena::new();
        let root_id = leaf_arena.allocate(LeafNode::new(order))?;

        Ok(Self {
            order,
            search,
            root: RwLock::new(NodeRef::Leaf(root_id)),
            leaf_arena,
            branch_arena: NodeArena::new(),
            len: AtomicUsize::new(0),
        })
    }
}

impl<K, V> LeafNode<K, V> {
    /// Creates an empty leaf with slot capacity reserved for the order.
    pub(crate) fn new(order: usize) -> Self {
        Self {
            keys: Vec::with_capacity(order.saturating_sub(1)),
            records: Vec::with_capacity(order.saturating_sub(1)),
            next: NULL_NODE,
        }
    }

    /// Creates a leaf from prepared entry vectors.
    pub(crate) fn with_data(keys: Vec<K>, records: Vec<crate::types::Record<V>>, next: crate::types::NodeId) -> Self {
        debug_assert_eq!(keys.len(), records.len());
        Self { keys, records, next }
    }
}

impl<K, V> BranchNode<K, V> {
    /// Creates a branch from prepared key and child vectors.
    pub(crate) fn with_data(keys: Vec<K>, children: Vec<NodeRef>) -> Self {
        debug_assert_eq!(keys.len() + 1, children.len());
        Self {
            keys,
            children,
            _marker: PhantomData,
        }
    }
}

impl<K: Ord + Clone, V> Default for BPlusTree<K, V> {
    /// Create a B+ tree with the default order.
    fn default() -> Self {
        Self::with_default_order().unwrap()
    }
}
