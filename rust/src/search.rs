//! Intra-node key search strategies.
//!
//! The tree's routing and leaf lookups are defined purely by the key order;
//! how a slot is located inside one node is a strategy choice. Linear scan
//! wins on small nodes that fit a cache line or two, binary search wins on
//! large orders. Both return the same positions, so the choice never changes
//! tree semantics.

use std::cmp::Ordering;

/// Strategy for locating a key within a node's sorted key slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchPolicy {
    /// Scan keys front to back. Best for small orders.
    Linear,
    /// Standard binary search. Best for large orders.
    #[default]
    Binary,
}

impl SearchPolicy {
    /// Locate `key` in `keys`, mirroring the `slice::binary_search` contract:
    /// `Ok(i)` when the key sits at index `i`, `Err(i)` with the insertion
    /// index that keeps the slice sorted otherwise.
    pub(crate) fn locate<K: Ord>(self, keys: &[K], key: &K) -> Result<usize, usize> {
        match self {
            SearchPolicy::Binary => keys.binary_search(key),
            SearchPolicy::Linear => {
                for (i, slot) in keys.iter().enumerate() {
                    match key.cmp(slot) {
                        Ordering::Equal => return Ok(i),
                        Ordering::Less => return Err(i),
                        Ordering::Greater => {}
                    }
                }
                Err(keys.len())
            }
        }
    }
}
