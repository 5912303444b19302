//! Range queries and ordered snapshots over the leaf sibling chain.
//!
//! A scan descends once to the leaf covering the lower bound, then walks the
//! chain with hand-over-hand read coupling: the successor leaf is locked
//! before the current one is released, so at most two leaves are locked at
//! any instant and writers are never starved behind a long scan. The result
//! is a concatenation of per-leaf snapshots, not a whole-tree snapshot.

use crate::types::{BPlusTree, NULL_NODE};

impl<K: Ord + Clone, V: Clone> BPlusTree<K, V> {
    /// Collect the values of all keys in `[start, end]` (inclusive both
    /// ends), in ascending key order, truncated to `max_results`.
    ///
    /// Returns an empty vector when `start > end`.
    ///
    /// # Examples
    ///
    /// ```
    /// use crabtree::BPlusTree;
    ///
    /// let tree = BPlusTree::new(4).unwrap();
    /// for (k, v) in [(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e"), (6, "f")] {
    ///     tree.insert(k, v).unwrap();
    /// }
    /// assert_eq!(tree.find_range(&2, &5, 10), vec!["b", "c", "d", "e"]);
    /// assert_eq!(tree.find_range(&10, &20, 10), Vec::<&str>::new());
    /// assert_eq!(tree.find_range(&5, &1, 10), Vec::<&str>::new());
    /// ```
    pub fn find_range(&self, start: &K, end: &K, max_results: usize) -> Vec<V> {
        if start > end || max_results == 0 {
            return Vec::new();
        }
        let Ok((_, mut guard)) = self.find_leaf_read(start) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        // Advance to the first slot at or above the lower bound.
        let mut index = match guard.search(self.search, start) {
            Ok(i) => i,
            Err(i) => i,
        };
        loop {
            while index < guard.len() && out.len() < max_results {
                if guard.keys[index] > *end {
                    return out;
                }
                out.push(guard.records[index].value().clone());
                index += 1;
            }
            if out.len() >= max_results {
                return out;
            }
            let next = guard.next;
            if next == NULL_NODE {
                return out;
            }
            let Some(handle) = self.leaf_arena.get(next) else {
                return out;
            };
            // Successor locked before the current leaf is released.
            guard = handle.read_arc();
            index = 0;
        }
    }

    /// Collect the entries whose keys lie in `[start, end]` (inclusive both
    /// ends), in ascending key order, truncated to `max_results`.
    ///
    /// The pair-returning sibling of [`find_range`](Self::find_range);
    /// returns an empty vector when `start > end`.
    pub fn slice(&self, start: &K, end: &K, max_results: usize) -> Vec<(K, V)> {
        if start > end || max_results == 0 {
            return Vec::new();
        }
        let Ok((_, mut guard)) = self.find_leaf_read(start) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut index = match guard.search(self.search, start) {
            Ok(i) => i,
            Err(i) => i,
        };
        loop {
            while index < guard.len() && out.len() < max_results {
                if guard.keys[index] > *end {
                    return out;
                }
                out.push((
                    guard.keys[index].clone(),
                    guard.records[index].value().clone(),
                ));
                index += 1;
            }
            if out.len() >= max_results {
                return out;
            }
            let next = guard.next;
            if next == NULL_NODE {
                return out;
            }
            let Some(handle) = self.leaf_arena.get(next) else {
                return out;
            };
            // Successor locked before the current leaf is released.
            guard = handle.read_arc();
            index = 0;
        }
    }

    /// Snapshot every entry in key order.
    pub fn items(&self) -> Vec<(K, V)> {
        let Ok((_, mut guard)) = self.leftmost_leaf_read() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        loop {
            for i in 0..guard.len() {
                out.push((guard.keys[i].clone(), guard.records[i].value().clone()));
            }
            let next = guard.next;
            if next == NULL_NODE {
                return out;
            }
            let Some(handle) = self.leaf_arena.get(next) else {
                return out;
            };
            guard = handle.read_arc();
        }
    }

    /// Snapshot every value in key order.
    pub fn values(&self) -> Vec<V> {
        self.items().into_iter().map(|(_, v)| v).collect()
    }

    /// The smallest entry, if any.
    pub fn first(&self) -> Option<(K, V)> {
        let (_, guard) = self.leftmost_leaf_read().ok()?;
        let key = guard.keys.first()?.clone();
        let value = guard.records.first()?.value().clone();
        Some((key, value))
    }

    /// The largest entry, if any.
    pub fn last(&self) -> Option<(K, V)> {
        let (_, guard) = self.rightmost_leaf_read().ok()?;
        let key = guard.keys.last()?.clone();
        let value = guard.records.last()?.value().clone();
        Some((key, value))
    }
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Snapshot every key in ascending order by walking the sibling chain.
    pub fn keys(&self) -> Vec<K> {
        let Ok((_, mut guard)) = self.leftmost_leaf_read() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        loop {
            out.extend(guard.keys.iter().cloned());
            let next = guard.next;
            if next == NULL_NODE {
                return out;
            }
            let Some(handle) = self.leaf_arena.get(next) else {
                return out;
            };
            guard = handle.read_arc();
        }
    }
}
