//! Replay and Loop Suppression
//!
//! Bounded memory of `(origin, nonce)` pairs seen recently. A hit means the
//! envelope is a duplicate, whether replayed by an attacker or echoed back
//! around a topology loop, and is dropped before any side effects.
//!
//! Eviction is purely FIFO by insertion order. No TTL sweep is needed: the
//! capacity bound together with the envelope expiry bound keeps the window
//! wide enough that a pair cannot be re-admitted while its message is still
//! in flight.

use crate::auth::Nonce;
use crate::types::NodeId;
use std::collections::{HashSet, VecDeque};

/// Default cache capacity, in entries.
pub const DEFAULT_REPLAY_CAPACITY: usize = 5000;

#[derive(Clone, Debug)]
struct ReplayEntry {
    origin: NodeId,
    nonce: Nonce,
    /// Unix seconds at insertion; retained for diagnostics.
    #[allow(dead_code)]
    first_seen: u64,
}

/// Bounded FIFO set of `(origin, nonce)` pairs.
#[derive(Debug)]
pub struct ReplayCache {
    order: VecDeque<ReplayEntry>,
    index: HashSet<(NodeId, Nonce)>,
    capacity: usize,
}

impl ReplayCache {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "replay cache capacity must be positive");
        Self {
            order: VecDeque::with_capacity(capacity),
            index: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Create a cache with the default capacity.
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_REPLAY_CAPACITY)
    }

    /// Whether this pair has been seen.
    pub fn contains(&self, origin: NodeId, nonce: Nonce) -> bool {
        self.index.contains(&(origin, nonce))
    }

    /// Record a pair. A no-op when already present; evicts the oldest entry
    /// when at capacity.
    pub fn insert(&mut self, origin: NodeId, nonce: Nonce, now: u64) {
        if !self.index.insert((origin, nonce)) {
            return;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.index.remove(&(evicted.origin, evicted.nonce));
            }
        }
        self.order.push_back(ReplayEntry {
            origin,
            nonce,
            first_seen: now,
        });
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonce(b: u8) -> Nonce {
        Nonce::from_bytes([b, b, b])
    }

    #[test]
    fn test_insert_then_contains() {
        let mut cache = ReplayCache::new(8);
        let origin = NodeId::new(268484900);
        assert!(!cache.contains(origin, nonce(1)));
        cache.insert(origin, nonce(1), 100);
        assert!(cache.contains(origin, nonce(1)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_same_nonce_different_origin_is_distinct() {
        let mut cache = ReplayCache::new(8);
        cache.insert(NodeId::new(1), nonce(7), 100);
        assert!(!cache.contains(NodeId::new(2), nonce(7)));
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let mut cache = ReplayCache::new(8);
        let origin = NodeId::new(1);
        cache.insert(origin, nonce(1), 100);
        cache.insert(origin, nonce(1), 200);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let mut cache = ReplayCache::new(3);
        let origin = NodeId::new(1);
        for b in 1..=3u8 {
            cache.insert(origin, nonce(b), b as u64);
        }
        assert_eq!(cache.len(), 3);

        // Fourth insert evicts the oldest.
        cache.insert(origin, nonce(4), 4);
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(origin, nonce(1)));
        assert!(cache.contains(origin, nonce(2)));
        assert!(cache.contains(origin, nonce(4)));
    }

    #[test]
    fn test_eviction_keeps_index_consistent() {
        let mut cache = ReplayCache::new(2);
        let origin = NodeId::new(1);
        for b in 0..100u8 {
            cache.insert(origin, nonce(b), b as u64);
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(origin, nonce(98)));
        assert!(cache.contains(origin, nonce(99)));
        assert!(!cache.contains(origin, nonce(97)));
    }
}
