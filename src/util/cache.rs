// Copyright 2019 Fullstop000 <fullstop1005@gmail.com>.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

//! A small bounded LRU cache, used in place of Python's `@lru_cache` on
//! `SQLite3.page` / `Page.cell` / `WAL.frame`. Eviction is local and never
//! observable from the decoded values themselves (§5).

use std::collections::HashMap;
use std::hash::Hash;

struct Entry<K, V> {
    key: K,
    value: V,
}

/// A bounded, in-memory least-recently-used cache keyed by page/frame
/// number. Not thread-safe; the engines in this crate are single-threaded
/// by design (§5).
pub struct LruCache<K, V> {
    capacity: usize,
    // Order of recency, oldest first.
    order: Vec<K>,
    entries: HashMap<K, Entry<K, V>>,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.entries.contains_key(key) {
            self.touch(key);
            self.entries.get(key).map(|e| &e.value)
        } else {
            None
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn put(&mut self, key: K, value: V) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key.clone(), Entry { key: key.clone(), value });
            self.touch(&key);
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        self.order.push(key.clone());
        self.entries.insert(key.clone(), Entry { key, value });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }

    fn evict_oldest(&mut self) {
        if self.order.is_empty() {
            return;
        }
        let oldest = self.order.remove(0);
        self.entries.remove(&oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let mut c: LruCache<u32, &str> = LruCache::new(2);
        c.put(1, "a");
        c.put(2, "b");
        c.put(3, "c"); // evicts 1
        assert!(!c.contains(&1));
        assert!(c.contains(&2));
        assert!(c.contains(&3));
    }

    #[test]
    fn get_refreshes_recency() {
        let mut c: LruCache<u32, &str> = LruCache::new(2);
        c.put(1, "a");
        c.put(2, "b");
        let _ = c.get(&1); // 1 is now most-recently-used
        c.put(3, "c"); // should evict 2, not 1
        assert!(c.contains(&1));
        assert!(!c.contains(&2));
        assert!(c.contains(&3));
    }
}
