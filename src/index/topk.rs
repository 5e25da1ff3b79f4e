//! Bounded top-K selection
//!
//! Both pipeline stages keep the K best of a stream: stage 1 by smallest
//! Hamming distance, stage 2 by largest cosine similarity. The selector
//! ranks by ascending `(key, id)`, so callers express "largest first" with
//! `Reverse` and always get ascending record id as the tie-break.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::types::EmbeddingId;

/// Totally ordered `f32` score (uses IEEE 754 `totalOrder`)
#[derive(Debug, Clone, Copy)]
pub struct Score(pub f32);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

struct Entry<K, V> {
    key: K,
    id: EmbeddingId,
    value: V,
}

impl<K: Ord, V> Entry<K, V> {
    fn rank(&self, key: &K, id: EmbeddingId) -> Ordering {
        self.key.cmp(key).then(self.id.cmp(&id))
    }
}

impl<K: Ord, V> PartialEq for Entry<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.rank(&other.key, other.id) == Ordering::Equal
    }
}

impl<K: Ord, V> Eq for Entry<K, V> {}

impl<K: Ord, V> PartialOrd for Entry<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, V> Ord for Entry<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank(&other.key, other.id)
    }
}

/// Keeps the `k` smallest `(key, id)` pairs seen, each carrying a payload.
///
/// Internally a max-heap whose root is the current worst survivor, so every
/// push is O(log k) and memory stays O(k).
pub struct TopK<K, V = ()> {
    k: usize,
    heap: BinaryHeap<Entry<K, V>>,
}

impl<K: Ord, V> TopK<K, V> {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1 << 16)),
        }
    }

    pub fn push(&mut self, key: K, id: EmbeddingId, value: V) {
        if self.k == 0 {
            return;
        }

        if self.heap.len() < self.k {
            self.heap.push(Entry { key, id, value });
            return;
        }

        let evict = self
            .heap
            .peek()
            .is_some_and(|worst| worst.rank(&key, id) == Ordering::Greater);
        if evict {
            self.heap.pop();
            self.heap.push(Entry { key, id, value });
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drain survivors best-first.
    pub fn into_sorted_vec(self) -> Vec<(K, EmbeddingId, V)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|entry| (entry.key, entry.id, entry.value))
            .collect()
    }
}
