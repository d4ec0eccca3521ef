//! Bounded in-memory memo of query embeddings.
//!
//! Keys are blake3 digests of the exact query string; no normalization is
//! applied, so `"a b"` and `"a  b"` are distinct entries. Eviction is FIFO by
//! insertion order: reads never refresh an entry, and overwriting an existing
//! key keeps its original position.
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use studyrag_core::types::EmbeddingVector;

pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub key: String,
    pub vector: EmbeddingVector,
    pub insertion_order: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
    next_order: u64,
}

pub struct QueryEmbeddingCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for QueryEmbeddingCache {
    fn default() -> Self { Self::new(DEFAULT_CAPACITY) }
}

pub fn cache_key(query: &str) -> String {
    blake3::hash(query.as_bytes()).to_hex().to_string()
}

impl QueryEmbeddingCache {
    /// A capacity of 0 disables storage; every lookup misses.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, inner: Mutex::new(Inner::default()) }
    }

    pub fn capacity(&self) -> usize { self.capacity }

    pub fn len(&self) -> usize { self.inner.lock().entries.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn get(&self, query: &str) -> Option<EmbeddingVector> {
        let key = cache_key(query);
        let hit = self.inner.lock().entries.get(&key).map(|e| e.vector.clone());
        tracing::debug!(hit = hit.is_some(), "query embedding cache lookup");
        hit
    }

    pub fn put(&self, query: &str, vector: EmbeddingVector) {
        if self.capacity == 0 {
            return;
        }
        let key = cache_key(query);
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.entries.get_mut(&key) {
            existing.vector = vector;
            return;
        }
        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        let insertion_order = inner.next_order;
        inner.next_order += 1;
        inner.order.push_back(key.clone());
        inner.entries.insert(key.clone(), CacheEntry { key, vector, insertion_order });
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Snapshot of the entries, oldest first.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let inner = self.inner.lock();
        inner.order.iter().filter_map(|k| inner.entries.get(k).cloned()).collect()
    }
}
