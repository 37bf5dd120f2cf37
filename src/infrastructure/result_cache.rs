//! Result Cache
//!
//! Bounded least-recently-used cache of successful lookups
//! (pinyin key -> replacement text).

use std::collections::HashMap;

/// Default number of cached lookups.
pub const DEFAULT_CACHE_CAPACITY: usize = 2048;

struct Node {
    key: String,
    value: String,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU cache with O(1) insert, find and erase.
///
/// Entries live in an index-linked arena; `head` is the most recently used
/// entry and `tail` the next eviction candidate.
pub struct ResultCache {
    capacity: usize,
    map: HashMap<String, usize>,
    nodes: Vec<Node>,
    vacant: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            vacant: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Insert a value unless `key` is already cached.
    ///
    /// Evicts the least recently used entry first when full. Existing
    /// entries are left untouched, including their recency.
    pub fn insert(&mut self, key: &str, value: &str) {
        if self.capacity == 0 || self.map.contains_key(key) {
            return;
        }

        let index = if self.map.len() >= self.capacity {
            self.evict_lru()
        } else {
            None
        };

        let index = match index.or_else(|| self.vacant.pop()) {
            Some(index) => {
                let node = &mut self.nodes[index];
                node.key.clear();
                node.key.push_str(key);
                node.value.clear();
                node.value.push_str(value);
                index
            }
            None => {
                self.nodes.push(Node {
                    key: key.to_string(),
                    value: value.to_string(),
                    prev: None,
                    next: None,
                });
                self.nodes.len() - 1
            }
        };

        self.push_front(index);
        self.map.insert(key.to_string(), index);
    }

    /// Look up `key`, promoting it to most recently used on a hit.
    pub fn find(&mut self, key: &str) -> Option<&str> {
        let index = *self.map.get(key)?;
        if self.head != Some(index) {
            self.unlink(index);
            self.push_front(index);
        }
        Some(self.nodes[index].value.as_str())
    }

    /// Check for `key` without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Remove `key`, returning whether it was present.
    pub fn erase(&mut self, key: &str) -> bool {
        let Some(index) = self.map.remove(key) else {
            return false;
        };
        self.unlink(index);
        let node = &mut self.nodes[index];
        node.key.clear();
        node.value.clear();
        self.vacant.push(index);
        true
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.vacant.clear();
        self.head = None;
        self.tail = None;
    }

    /// Drop the tail entry and hand back its arena index for reuse.
    fn evict_lru(&mut self) -> Option<usize> {
        let index = self.tail?;
        self.unlink(index);
        let key = std::mem::take(&mut self.nodes[index].key);
        self.map.remove(&key);
        tracing::trace!("result cache evicted {}", key);
        Some(index)
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = {
            let node = &self.nodes[index];
            (node.prev, node.next)
        };

        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }

        let node = &mut self.nodes[index];
        node.prev = None;
        node.next = None;
    }

    fn push_front(&mut self, index: usize) {
        self.nodes[index].prev = None;
        self.nodes[index].next = self.head;
        if let Some(old_head) = self.head {
            self.nodes[old_head].prev = Some(index);
        }
        self.head = Some(index);
        if self.tail.is_none() {
            self.tail = Some(index);
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
