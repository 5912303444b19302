//! GET operations for the B+ tree.
//!
//! Point lookups descend in read mode, so any number of them proceed in
//! parallel. The value is cloned out while the leaf's read lock is held;
//! what a lookup observes is the leaf's state at that instant.

use crate::error::{KeyResult, TreeError, TreeResult};
use crate::types::BPlusTree;

impl<K: Ord + Clone, V: Clone> BPlusTree<K, V> {
    /// Get the value associated with a key, or `None` when absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use crabtree::BPlusTree;
    ///
    /// let tree = BPlusTree::new(16).unwrap();
    /// tree.insert(1, "one").unwrap();
    /// assert_eq!(tree.get(&1), Some("one"));
    /// assert_eq!(tree.get(&2), None);
    /// ```
    pub fn get(&self, key: &K) -> Option<V> {
        let (_, leaf) = self.find_leaf_read(key).ok()?;
        leaf.get(self.search, key).map(|record| record.value().clone())
    }

    /// Get the value for a key, reporting absence as an error.
    pub fn get_item(&self, key: &K) -> KeyResult<V> {
        self.get(key).ok_or(TreeError::KeyNotFound)
    }

    /// Look up several keys, failing fast on the first absent one.
    pub fn get_many(&self, keys: &[K]) -> TreeResult<Vec<V>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).ok_or(TreeError::KeyNotFound)?);
        }
        Ok(values)
    }
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Check whether a key is present without cloning its value.
    pub fn contains_key(&self, key: &K) -> bool {
        match self.find_leaf_read(key) {
            Ok((_, leaf)) => leaf.search(self.search, key).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{BPlusTree, SearchPolicy, TreeError};

    #[test]
    fn basic_get_operations() {
        let tree = BPlusTree::new(4).unwrap();
        assert_eq!(tree.get(&1), None);
        assert!(!tree.contains_key(&1));

        for (k, v) in [(1, "one"), (2, "two"), (3, "three")] {
            tree.insert(k, v).unwrap();
        }

        assert_eq!(tree.get(&1), Some("one"));
        assert_eq!(tree.get(&3), Some("three"));
        assert_eq!(tree.get(&4), None);
        assert!(tree.contains_key(&2));
        assert!(!tree.contains_key(&4));
    }

    #[test]
    fn get_after_splits() {
        let tree = BPlusTree::new(4).unwrap();
        for k in 0..500 {
            tree.insert(k, k * 7).unwrap();
        }
        for k in 0..500 {
            assert_eq!(tree.get(&k), Some(k * 7), "key {}", k);
        }
        assert_eq!(tree.get(&500), None);
    }

    #[test]
    fn get_item_distinguishes_absence() {
        let tree = BPlusTree::new(4).unwrap();
        tree.insert(1, "one").unwrap();
        assert_eq!(tree.get_item(&1).unwrap(), "one");
        assert!(matches!(tree.get_item(&2), Err(TreeError::KeyNotFound)));
    }

    #[test]
    fn get_many_fails_on_first_missing_key() {
        let tree = BPlusTree::new(4).unwrap();
        for k in 1..=3 {
            tree.insert(k, k * 10).unwrap();
        }
        assert_eq!(tree.get_many(&[1, 2, 3]).unwrap(), vec![10, 20, 30]);
        assert!(tree.get_many(&[1, 9]).is_err());
        assert!(tree.get_many(&[]).unwrap().is_empty());
    }

    #[test]
    fn linear_policy_finds_the_same_entries() {
        let tree = BPlusTree::with_search_policy(5, SearchPolicy::Linear).unwrap();
        for k in 0..100 {
            tree.insert(k, k).unwrap();
        }
        for k in 0..100 {
            assert_eq!(tree.get(&k), Some(k));
        }
    }
}
