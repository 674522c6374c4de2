//! Bounded caches for the settlement path
//!
//! Nothing here is a correctness source: losing any entry only costs an RPC
//! scan. Max-size eviction keeps long runtimes from growing without bound.
//!
//! ## Recommended RAM
//!
//! - A settlement entry is ~250 bytes, so the default 50k entries ≈ 12 MB.
//! - A seen-signature entry is ~180 bytes (two copies of an 88-char signature).

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::types::{EventKey, SettlementEvidence};

/// A cached settlement and whether it is due for revalidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    pub evidence: SettlementEvidence,
    pub stale: bool,
}

/// Event key → settlement evidence, with revalidation age and capacity limit
///
/// - **Max capacity:** when full, the least recently validated entry is evicted on insert.
/// - **Revalidation:** hits older than `revalidate_after` are reported stale, not dropped.
pub struct SettlementCache {
    map: HashMap<EventKey, (SettlementEvidence, Instant)>,
    max_size: usize,
    revalidate_after: Duration,
}

impl SettlementCache {
    pub fn new(max_size: usize, revalidate_after: Duration) -> Self {
        Self {
            map: HashMap::new(),
            max_size: max_size.max(1),
            revalidate_after,
        }
    }

    pub fn get(&self, key: &EventKey) -> Option<CacheHit> {
        self.map.get(key).map(|(evidence, validated)| CacheHit {
            evidence: evidence.clone(),
            stale: validated.elapsed() >= self.revalidate_after,
        })
    }

    pub fn insert(&mut self, key: EventKey, evidence: SettlementEvidence) {
        if !self.map.contains_key(&key) {
            while self.map.len() >= self.max_size {
                let oldest = self
                    .map
                    .iter()
                    .min_by_key(|(_, (_, t))| *t)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        self.map.remove(&k);
                    }
                    None => break,
                }
            }
        }
        self.map.insert(key, (evidence, Instant::now()));
    }

    /// Reset the revalidation clock of an entry
    pub fn mark_validated(&mut self, key: &EventKey) {
        if let Some((_, validated)) = self.map.get_mut(key) {
            *validated = Instant::now();
        }
    }

    pub fn remove(&mut self, key: &EventKey) -> Option<SettlementEvidence> {
        self.map.remove(key).map(|(evidence, _)| evidence)
    }

    /// Whether any cached evidence references the transaction
    pub fn references_tx(&self, tx_id: &str) -> bool {
        self.map
            .values()
            .any(|(evidence, _)| evidence.tx_id.as_deref() == Some(tx_id))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Insertion-ordered set with a capacity limit; oldest entries fall out first
pub struct BoundedSet<K> {
    set: HashSet<K>,
    order: VecDeque<K>,
    max_size: usize,
}

impl<K: Hash + Eq + Clone> BoundedSet<K> {
    pub fn new(max_size: usize) -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.set.contains(key)
    }

    /// Returns false if the key was already present
    pub fn insert(&mut self, key: K) -> bool {
        if self.set.contains(&key) {
            return false;
        }
        while self.order.len() >= self.max_size {
            match self.order.pop_front() {
                Some(old) => {
                    self.set.remove(&old);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.set.insert(key);
        true
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
