//! Concurrent multi-valued map.
//!
//! `MultiMap` maps one key to an ordered list of values. It backs the handle
//! registry, the native module bookkeeping and the command hierarchy. Values
//! are never deduplicated by the plain insert operations; the `*_unique`
//! variants exist for callers that want set-like behaviour per key.
//!
//! The backing store is a [`DashMap`], so several modules enabling on
//! different host threads can insert at the same time. Each key's list is
//! mutated under its shard lock, which keeps appends and prepends atomic.

use dashmap::DashMap;
use std::collections::HashMap;
use std::hash::Hash;

/// A key to ordered-values mapping safe for concurrent writers.
#[derive(Debug)]
pub struct MultiMap<K, V>
where
    K: Eq + Hash,
{
    inner: DashMap<K, Vec<V>>,
}

impl<K, V> MultiMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Appends `value` to the list for `key`, creating the list if needed.
    pub fn put(&self, key: K, value: V) {
        self.inner.entry(key).or_default().push(value);
    }

    /// Inserts `value` at the front of the list for `key`.
    ///
    /// Used so the most recently registered value surfaces first.
    pub fn put_first(&self, key: K, value: V) {
        self.inner.entry(key).or_default().insert(0, value);
    }

    /// Prepends `value` unless it is already present for `key`.
    ///
    /// Returns `true` when the value was inserted.
    pub fn put_first_unique(&self, key: K, value: V) -> bool
    where
        V: PartialEq,
    {
        let mut values = self.inner.entry(key).or_default();
        if values.contains(&value) {
            return false;
        }
        values.insert(0, value);
        true
    }

    /// Appends `value` unless it is already present for `key`.
    ///
    /// Returns `true` when the value was inserted.
    pub fn put_last_unique(&self, key: K, value: V) -> bool
    where
        V: PartialEq,
    {
        let mut values = self.inner.entry(key).or_default();
        if values.contains(&value) {
            return false;
        }
        values.push(value);
        true
    }

    /// Returns a read-only snapshot of the values for `key`.
    ///
    /// An absent key yields an empty list.
    pub fn get(&self, key: &K) -> Vec<V> {
        self.inner
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Checks whether `value` is stored under `key`.
    pub fn contains_value(&self, key: &K, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.inner
            .get(key)
            .map(|entry| entry.value().contains(value))
            .unwrap_or(false)
    }

    /// Number of values stored under `key`.
    pub fn len_of(&self, key: &K) -> usize {
        self.inner.get(key).map(|entry| entry.len()).unwrap_or(0)
    }

    /// Removes every value for `key` and returns them.
    pub fn remove(&self, key: &K) -> Vec<V> {
        self.inner
            .remove(key)
            .map(|(_, values)| values)
            .unwrap_or_default()
    }

    /// Removes and returns the first value for `key`.
    pub fn remove_first(&self, key: &K) -> Option<V> {
        let mut values = self.inner.get_mut(key)?;
        if values.is_empty() {
            return None;
        }
        Some(values.remove(0))
    }

    /// Removes and returns the last value for `key`.
    pub fn remove_last(&self, key: &K) -> Option<V> {
        self.inner.get_mut(key)?.pop()
    }

    /// Removes the first occurrence of `value` under `key`.
    pub fn remove_value(&self, key: &K, value: &V) -> bool
    where
        V: PartialEq,
    {
        let Some(mut values) = self.inner.get_mut(key) else {
            return false;
        };
        match values.iter().position(|v| v == value) {
            Some(index) => {
                values.remove(index);
                true
            }
            None => false,
        }
    }

    /// All keys currently present.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.inner.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Copies the whole map, for diagnostics.
    pub fn snapshot(&self) -> HashMap<K, Vec<V>>
    where
        K: Clone,
    {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl<K, V> Default for MultiMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_absent_key_is_empty() {
        let map: MultiMap<&str, u32> = MultiMap::new();
        assert!(map.get(&"missing").is_empty());
        assert_eq!(map.len_of(&"missing"), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn test_put_appends_and_keeps_duplicates() {
        let map = MultiMap::new();
        map.put("a", 1);
        map.put("a", 2);
        map.put("a", 1);
        assert_eq!(map.get(&"a"), vec![1, 2, 1]);
    }

    #[test]
    fn test_put_first_prepends() {
        let map = MultiMap::new();
        map.put("k", "old");
        map.put_first("k", "new");
        map.put_first("k", "newest");
        assert_eq!(map.get(&"k"), vec!["newest", "new", "old"]);

        map.put_first("fresh", "only");
        assert_eq!(map.get(&"fresh"), vec!["only"]);
    }

    #[test]
    fn test_mixed_put_and_put_first() {
        let map = MultiMap::new();
        map.put(1, 'b');
        map.put_first(1, 'a');
        map.put(1, 'c');
        map.put_first(1, 'a');
        assert_eq!(map.get(&1), vec!['a', 'a', 'b', 'c']);
    }

    #[test]
    fn test_unique_inserts() {
        let map = MultiMap::new();
        assert!(map.put_first_unique("k", 1));
        assert!(!map.put_first_unique("k", 1));
        assert!(map.put_last_unique("k", 2));
        assert!(!map.put_last_unique("k", 1));
        assert_eq!(map.get(&"k"), vec![1, 2]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let map = MultiMap::new();
        map.put("k", 1);
        let mut view = map.get(&"k");
        view.push(99);
        assert_eq!(map.get(&"k"), vec![1]);
    }

    #[test]
    fn test_removals() {
        let map = MultiMap::new();
        for v in [1, 2, 3, 4] {
            map.put("k", v);
        }
        assert_eq!(map.remove_first(&"k"), Some(1));
        assert_eq!(map.remove_last(&"k"), Some(4));
        assert!(map.remove_value(&"k", &3));
        assert!(!map.remove_value(&"k", &3));
        assert_eq!(map.get(&"k"), vec![2]);
        assert_eq!(map.remove(&"k"), vec![2]);
        assert!(map.get(&"k").is_empty());
        assert_eq!(map.remove_first(&"k"), None);
    }

    #[test]
    fn test_concurrent_writers() {
        let map = Arc::new(MultiMap::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let map = map.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        map.put("shared".to_string(), t * 100 + i);
                        map.put(format!("plugin-{t}"), i);
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }

        assert_eq!(map.len_of(&"shared".to_string()), 800);
        for t in 0..8 {
            let values = map.get(&format!("plugin-{t}"));
            assert_eq!(values, (0..100).collect::<Vec<_>>());
        }
    }
}
