//! Tree-level structure management: size, clearing, node counting.

use std::sync::atomic::Ordering;

use crate::error::{ModifyResult, TreeResult};
use crate::types::{BPlusTree, LeafNode, NodeRef};

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Number of entries in the tree.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Returns true if the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The tree's branching factor.
    pub fn order(&self) -> usize {
        self.order
    }

    /// The intra-node search strategy fixed at construction.
    pub fn search_policy(&self) -> crate::search::SearchPolicy {
        self.search
    }

    /// Drop every entry, leaving an empty leaf root.
    ///
    /// Exclusive access (`&mut self`) guarantees no guards are outstanding.
    pub fn clear(&mut self) -> ModifyResult<()> {
        self.leaf_arena.clear();
        self.branch_arena.clear();
        let root_id = self.leaf_arena.allocate(LeafNode::new(self.order))?;
        *self.root.get_mut() = NodeRef::Leaf(root_id);
        *self.len.get_mut() = 0;
        Ok(())
    }

    /// Count leaf and branch nodes reachable from the root.
    pub fn count_nodes_in_tree(&self) -> TreeResult<(usize, usize)> {
        self.count_nodes_from(self.root_ref())
    }

    fn count_nodes_from(&self, node: NodeRef) -> TreeResult<(usize, usize)> {
        match node {
            NodeRef::Leaf(_) => Ok((1, 0)),
            NodeRef::Branch(id) => {
                let guard = self.branch_handle(id)?.read_arc();
                let mut leaves = 0;
                let mut branches = 1;
                for child in &guard.children {
                    let (l, b) = self.count_nodes_from(*child)?;
                    leaves += l;
                    branches += b;
                }
                Ok((leaves, branches))
            }
        }
    }

    /// Height of the tree: 1 for a lone leaf root.
    pub fn height(&self) -> TreeResult<usize> {
        let mut height = 1;
        let mut node = self.root_ref();
        while let NodeRef::Branch(id) = node {
            node = self.branch_handle(id)?.read_arc().children[0];
            height += 1;
        }
        Ok(height)
    }
}
