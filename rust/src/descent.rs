//! Lock-coupled descent from the root to a target leaf.
//!
//! Readers descend with classic hand-over-hand coupling: the child's read
//! lock is acquired before the current node's is released, so at most two
//! locks are held at any instant and readers stream past each other freely.
//!
//! Writers descend with write locks and the same coupling, except that an
//! ancestor's lock is retained while the child below it could still split
//! (insert) or underflow (remove) into it. The retained ancestors form the
//! "spine" handed to the structural mutators: every lock a split or merge
//! will touch is already held, in root-to-leaf order, which keeps all lock
//! acquisition in one fixed direction.
//!
//! The root reference is re-read after the first lock is taken; if a
//! concurrent structural change replaced the root in between, the descent
//! drops the stale lock and retries from the new root.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{TreeError, TreeResult};
use crate::node::{branch_min_keys, leaf_min_keys};
use crate::types::{
    BPlusTree, BranchNode, BranchWriteGuard, LeafNode, LeafReadGuard, LeafWriteGuard, NodeId,
    NodeRef,
};

/// What a write descent is about to do; decides when an ancestor is safe to
/// release early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteIntent {
    Insert,
    Remove,
}

/// Result of a write-mode descent: the write-locked target leaf plus the
/// retained ancestors, ordered root-first. The spine is empty whenever the
/// leaf cannot propagate a structural change upward.
pub(crate) struct WriteDescent<K, V> {
    pub(crate) spine: Vec<(NodeId, BranchWriteGuard<K, V>)>,
    pub(crate) leaf_id: NodeId,
    pub(crate) leaf: LeafWriteGuard<K, V>,
}

/// One step of a read-mode descent.
enum ReadStep<K, V> {
    Leaf(NodeId, LeafReadGuard<K, V>),
    Branch(NodeId, crate::types::BranchReadGuard<K, V>),
}

/// Which child a read descent follows at each branch.
#[derive(Clone, Copy)]
enum ReadTarget<'a, K> {
    Key(&'a K),
    Leftmost,
    Rightmost,
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Snapshot the current root reference.
    pub(crate) fn root_ref(&self) -> NodeRef {
        *self.root.read()
    }

    /// Fetch a leaf handle, treating a dead id as corruption.
    pub(crate) fn leaf_handle(&self, id: NodeId) -> TreeResult<Arc<RwLock<LeafNode<K, V>>>> {
        self.leaf_arena
            .get(id)
            .ok_or_else(|| TreeError::corrupted("leaf lookup", format!("missing node {}", id)))
    }

    /// Fetch a branch handle, treating a dead id as corruption.
    pub(crate) fn branch_handle(&self, id: NodeId) -> TreeResult<Arc<RwLock<BranchNode<K, V>>>> {
        self.branch_arena
            .get(id)
            .ok_or_else(|| TreeError::corrupted("branch lookup", format!("missing node {}", id)))
    }

    fn lock_read(&self, node: NodeRef) -> TreeResult<ReadStep<K, V>> {
        Ok(match node {
            NodeRef::Leaf(id) => ReadStep::Leaf(id, self.leaf_handle(id)?.read_arc()),
            NodeRef::Branch(id) => ReadStep::Branch(id, self.branch_handle(id)?.read_arc()),
        })
    }

    /// Lock the root in read mode, retrying if the root was replaced
    /// between reading the reference and acquiring the lock. A root that
    /// collapsed away entirely (dead arena slot) also triggers a retry.
    fn lock_root_read(&self) -> TreeResult<ReadStep<K, V>> {
        loop {
            let root_ref = self.root_ref();
            let step = match self.lock_read(root_ref) {
                Ok(step) => step,
                Err(error) => {
                    if self.root_ref() != root_ref {
                        continue;
                    }
                    return Err(error);
                }
            };
            if self.root_ref() == root_ref {
                return Ok(step);
            }
        }
    }

    fn descend_read(&self, target: ReadTarget<'_, K>) -> TreeResult<(NodeId, LeafReadGuard<K, V>)> {
        let mut step = self.lock_root_read()?;
        loop {
            match step {
                ReadStep::Leaf(id, guard) => return Ok((id, guard)),
                ReadStep::Branch(id, guard) => {
                    let child = match target {
                        ReadTarget::Key(key) => guard.child_for(self.search, key),
                        ReadTarget::Leftmost => guard.children[0],
                        ReadTarget::Rightmost => *guard.children.last().ok_or_else(|| {
                            TreeError::corrupted("descent", format!("branch {} has no children", id))
                        })?,
                    };
                    // Child locked before the current guard is released.
                    let next = self.lock_read(child)?;
                    drop(guard);
                    step = next;
                }
            }
        }
    }

    /// Descend in read mode to the leaf that would contain `key`.
    pub(crate) fn find_leaf_read(&self, key: &K) -> TreeResult<(NodeId, LeafReadGuard<K, V>)> {
        self.descend_read(ReadTarget::Key(key))
    }

    /// Descend in read mode to the leftmost leaf.
    pub(crate) fn leftmost_leaf_read(&self) -> TreeResult<(NodeId, LeafReadGuard<K, V>)> {
        self.descend_read(ReadTarget::Leftmost)
    }

    /// Descend in read mode to the rightmost leaf.
    pub(crate) fn rightmost_leaf_read(&self) -> TreeResult<(NodeId, LeafReadGuard<K, V>)> {
        self.descend_read(ReadTarget::Rightmost)
    }

    /// Descend in write mode to the leaf that would contain `key`,
    /// retaining every ancestor the coming mutation could reach.
    pub(crate) fn descend_write(
        &self,
        key: &K,
        intent: WriteIntent,
    ) -> TreeResult<WriteDescent<K, V>> {
        'retry: loop {
            let root_ref = self.root_ref();
            match root_ref {
                NodeRef::Leaf(id) => {
                    let handle = match self.leaf_handle(id) {
                        Ok(handle) => handle,
                        // The slot died because the root moved on; retry.
                        Err(_) if self.root_ref() != root_ref => continue 'retry,
                        Err(error) => return Err(error),
                    };
                    let leaf = handle.write_arc();
                    if self.root_ref() != root_ref {
                        continue 'retry;
                    }
                    // A root leaf has no ancestors to retain.
                    return Ok(WriteDescent {
                        spine: Vec::new(),
                        leaf_id: id,
                        leaf,
                    });
                }
                NodeRef::Branch(id) => {
                    let handle = match self.branch_handle(id) {
                        Ok(handle) => handle,
                        Err(_) if self.root_ref() != root_ref => continue 'retry,
                        Err(error) => return Err(error),
                    };
                    let guard = handle.write_arc();
                    if self.root_ref() != root_ref {
                        continue 'retry;
                    }

                    let mut spine: Vec<(NodeId, BranchWriteGuard<K, V>)> = Vec::new();
                    let mut cur_id = id;
                    let mut cur = guard;
                    loop {
                        match cur.child_for(self.search, key) {
                            NodeRef::Leaf(leaf_id) => {
                                let leaf = self.leaf_handle(leaf_id)?.write_arc();
                                if self.leaf_is_safe(&leaf, intent) {
                                    spine.clear();
                                    drop(cur);
                                } else {
                                    spine.push((cur_id, cur));
                                }
                                return Ok(WriteDescent {
                                    spine,
                                    leaf_id,
                                    leaf,
                                });
                            }
                            NodeRef::Branch(child_id) => {
                                let child = self.branch_handle(child_id)?.write_arc();
                                if self.branch_is_safe(&child, intent) {
                                    spine.clear();
                                    drop(cur);
                                } else {
                                    spine.push((cur_id, cur));
                                }
                                cur_id = child_id;
                                cur = child;
                            }
                        }
                    }
                }
            }
        }
    }

    /// A leaf is safe when the pending mutation cannot escape it: an insert
    /// still fits, or a removal leaves it at minimum fill or better.
    fn leaf_is_safe(&self, leaf: &LeafNode<K, V>, intent: WriteIntent) -> bool {
        match intent {
            WriteIntent::Insert => !leaf.is_full(self.order),
            WriteIntent::Remove => leaf.len() > leaf_min_keys(self.order),
        }
    }

    /// Same criterion one level up: a branch absorbs a child split without
    /// splitting itself, or a child merge without underflowing.
    fn branch_is_safe(&self, branch: &BranchNode<K, V>, intent: WriteIntent) -> bool {
        match intent {
            WriteIntent::Insert => !branch.is_full(self.order),
            WriteIntent::Remove => branch.len() > branch_min_keys(self.order),
        }
    }
}
