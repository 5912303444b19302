//! Slot-based node arena with stable ids and per-slot parent links.
//!
//! Nodes are addressed by `NodeId` throughout the tree: branch children, the
//! leaf sibling chain, and parent back-references are all ids, never owning
//! pointers, so the node graph stays cycle-free. The arena owns every node
//! behind an `Arc<RwLock<T>>`; callers clone the `Arc` out under a brief
//! arena read lock and then synchronize on the node's own lock. Freed slots
//! go on a free list and are reused by later allocations.
//!
//! A freshly allocated node has no parent; the parent link lives next to the
//! slot (not inside the node's lock) because split propagation rewires the
//! parents of moved children while holding only the splitting nodes' locks.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{TreeError, TreeResult};
use crate::types::{NodeId, NULL_NODE};

/// Statistics for an arena, mainly for tests and debugging.
#[derive(Debug, Clone, Copy)]
pub struct ArenaStats {
    /// Number of live slots.
    pub allocated_count: usize,
    /// Number of freed slots awaiting reuse.
    pub free_count: usize,
    /// Total slots ever created (live + free).
    pub total_slots: usize,
}

#[derive(Debug)]
struct Slot<T> {
    node: Arc<RwLock<T>>,
    /// Upward link; `NULL_NODE` for the root. Atomic so structural mutators
    /// can rewire it without holding the child's lock.
    parent: AtomicU32,
}

#[derive(Debug)]
struct ArenaInner<T> {
    slots: Vec<Option<Slot<T>>>,
    free_list: Vec<usize>,
}

/// Arena allocator for tree nodes.
#[derive(Debug)]
pub struct NodeArena<T> {
    inner: RwLock<ArenaInner<T>>,
}

impl<T> NodeArena<T> {
    /// Create a new empty arena.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ArenaInner {
                slots: Vec::new(),
                free_list: Vec::new(),
            }),
        }
    }

    /// Allocate a node and return its id. The node is born parentless; it is
    /// not reachable from the tree until the caller wires it in under the
    /// appropriate node locks.
    pub fn allocate(&self, node: T) -> TreeResult<NodeId> {
        let mut inner = self.inner.write();
        let slot = Slot {
            node: Arc::new(RwLock::new(node)),
            parent: AtomicU32::new(NULL_NODE),
        };
        let index = match inner.free_list.pop() {
            Some(free_index) => {
                inner.slots[free_index] = Some(slot);
                free_index
            }
            None => {
                let index = inner.slots.len();
                if index >= NULL_NODE as usize {
                    return Err(TreeError::ArenaExhausted);
                }
                inner.slots.push(Some(slot));
                index
            }
        };
        Ok(index as NodeId)
    }

    /// Check that `additional` allocations can succeed, without performing
    /// them. Lets structural mutations fail before touching any node.
    pub fn ensure_capacity(&self, additional: usize) -> TreeResult<()> {
        let inner = self.inner.read();
        let headroom = inner.free_list.len() + (NULL_NODE as usize - inner.slots.len());
        if headroom < additional {
            return Err(TreeError::ArenaExhausted);
        }
        Ok(())
    }

    /// Release a slot, returning the node handle. The node itself is dropped
    /// once the last outstanding guard or handle goes away.
    pub fn deallocate(&self, id: NodeId) -> Option<Arc<RwLock<T>>> {
        if id == NULL_NODE {
            return None;
        }
        let mut inner = self.inner.write();
        let index = id as usize;
        let slot = inner.slots.get_mut(index)?.take()?;
        inner.free_list.push(index);
        Some(slot.node)
    }

    /// Clone out the handle for a node.
    pub fn get(&self, id: NodeId) -> Option<Arc<RwLock<T>>> {
        if id == NULL_NODE {
            return None;
        }
        let inner = self.inner.read();
        inner
            .slots
            .get(id as usize)
            .and_then(|slot| slot.as_ref())
            .map(|slot| Arc::clone(&slot.node))
    }

    /// Check if an id refers to a live slot.
    pub fn contains(&self, id: NodeId) -> bool {
        if id == NULL_NODE {
            return false;
        }
        let inner = self.inner.read();
        matches!(inner.slots.get(id as usize), Some(Some(_)))
    }

    /// Read a node's parent id; `NULL_NODE` for the root or a dead slot.
    pub fn parent_of(&self, id: NodeId) -> NodeId {
        if id == NULL_NODE {
            return NULL_NODE;
        }
        let inner = self.inner.read();
        match inner.slots.get(id as usize).and_then(|slot| slot.as_ref()) {
            Some(slot) => slot.parent.load(Ordering::Acquire),
            None => NULL_NODE,
        }
    }

    /// Rewire a node's parent id.
    pub fn set_parent(&self, id: NodeId, parent: NodeId) {
        if id == NULL_NODE {
            return;
        }
        let inner = self.inner.read();
        if let Some(slot) = inner.slots.get(id as usize).and_then(|slot| slot.as_ref()) {
            slot.parent.store(parent, Ordering::Release);
        }
    }

    /// Number of live slots.
    pub fn allocated_count(&self) -> usize {
        let inner = self.inner.read();
        inner.slots.len() - inner.free_list.len()
    }

    /// Number of freed slots awaiting reuse.
    pub fn free_count(&self) -> usize {
        self.inner.read().free_list.len()
    }

    /// Returns true if no slots are live.
    pub fn is_empty(&self) -> bool {
        self.allocated_count() == 0
    }

    /// Get arena statistics.
    pub fn stats(&self) -> ArenaStats {
        let inner = self.inner.read();
        ArenaStats {
            allocated_count: inner.slots.len() - inner.free_list.len(),
            free_count: inner.free_list.len(),
            total_slots: inner.slots.len(),
        }
    }

    /// Drop every slot. Callers must hold no node guards from this arena.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.slots.clear();
        inner.free_list.clear();
    }
}

impl<T> Default for NodeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_get_deallocate() {
        let arena: NodeArena<i32> = NodeArena::new();
        let a = arena.allocate(42).unwrap();
        let b = arena.allocate(84).unwrap();

        assert_eq!(*arena.get(a).unwrap().read(), 42);
        assert_eq!(*arena.get(b).unwrap().read(), 84);
        assert!(arena.contains(a));
        assert!(!arena.contains(NULL_NODE));
        assert_eq!(arena.allocated_count(), 2);

        let node = arena.deallocate(a).unwrap();
        assert_eq!(*node.read(), 42);
        assert!(!arena.contains(a));
        assert_eq!(arena.free_count(), 1);
    }

    #[test]
    fn freed_slots_are_reused() {
        let arena: NodeArena<&str> = NodeArena::new();
        let a = arena.allocate("first").unwrap();
        arena.deallocate(a).unwrap();
        let b = arena.allocate("second").unwrap();
        assert_eq!(a, b);
        assert_eq!(*arena.get(b).unwrap().read(), "second");
        assert_eq!(arena.stats().total_slots, 1);
    }

    #[test]
    fn parent_links_default_to_null() {
        let arena: NodeArena<i32> = NodeArena::new();
        let id = arena.allocate(1).unwrap();
        assert_eq!(arena.parent_of(id), NULL_NODE);

        arena.set_parent(id, 9);
        assert_eq!(arena.parent_of(id), 9);

        arena.deallocate(id).unwrap();
        assert_eq!(arena.parent_of(id), NULL_NODE);
    }

    #[test]
    fn guards_outlive_deallocation() {
        let arena: NodeArena<i32> = NodeArena::new();
        let id = arena.allocate(7).unwrap();
        let handle = arena.get(id).unwrap();
        let guard = handle.read();
        arena.deallocate(id).unwrap();
        // The slot is gone but the node stays alive under the guard.
        assert_eq!(*guard, 7);
    }

    #[test]
    fn ensure_capacity_reports_headroom() {
        let arena: NodeArena<i32> = NodeArena::new();
        assert!(arena.ensure_capacity(16).is_ok());
    }
}
