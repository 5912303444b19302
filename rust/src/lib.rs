//! A thread-safe B+ tree index with per-node read-write locks.
//!
//! This crate provides an in-memory ordered index built around a B+ tree:
//! point lookup, duplicate-rejecting insertion, deletion with rebalancing,
//! and bounded range scans, all safe to call from many threads through a
//! shared reference. Traversal uses hand-over-hand lock coupling, so readers
//! run in parallel throughout the tree and writers serialize only on the
//! nodes they change.
//!
//! A second container, [`DocList`], is a doubly-linked list of opaque
//! documents with predicate-driven find/update/delete behind a single
//! container-level lock.
//!
//! Both structures can be written to and restored from a little-endian
//! binary dump using caller-supplied [`Codec`]s.
//!
//! ```
//! use crabtree::BPlusTree;
//!
//! let tree = BPlusTree::new(4).unwrap();
//! tree.insert(1, "one").unwrap();
//! tree.insert(2, "two").unwrap();
//! tree.insert(3, "three").unwrap();
//!
//! assert_eq!(tree.get(&2), Some("two"));
//! assert_eq!(tree.find_range(&1, &2, 8), vec!["one", "two"]);
//! assert_eq!(tree.remove(&1).unwrap(), "one");
//! ```

mod arena;
mod codec;
mod construction;
mod delete_operations;
mod descent;
mod doclist;
mod dump;
mod error;
mod get_operations;
mod insert_operations;
mod node;
mod range_queries;
mod search;
mod tree_structure;
mod types;
mod validation;

pub use arena::{ArenaStats, NodeArena};
pub use codec::{Codec, I32Codec, StrCodec};
pub use construction::DEFAULT_ORDER;
pub use doclist::DocList;
pub use dump::{LIST_MAGIC, LIST_VERSION, TREE_MAGIC, TREE_VERSION};
pub use error::{InitResult, KeyResult, ModifyResult, TreeError, TreeResult};
pub use search::SearchPolicy;
pub use types::{BPlusTree, NodeId, NodeRef, Record, MIN_ORDER, NULL_NODE};
