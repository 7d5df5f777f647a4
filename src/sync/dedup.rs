//! Bounded memory of recently handled approval instances.
//!
//! Absorbs at-least-once redelivery. It is advisory: updates are idempotent,
//! so a forgotten key only costs a repeated lookup and update.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::DedupConfig;

#[derive(Debug, Default)]
struct Inner {
    /// Claim sequence number per live key
    seen: HashMap<String, u64>,
    /// Claims oldest first; entries whose key was released linger until evicted
    order: VecDeque<(String, u64, Instant)>,
    next_seq: u64,
}

/// Recent-history set keyed by instance id
#[derive(Debug)]
pub struct RecentEvents {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl RecentEvents {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.capacity, config.ttl_secs.map(Duration::from_secs))
    }

    /// Record `key`; false if it was already claimed and not yet forgotten
    pub fn claim(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        self.expire(&mut inner, now);

        if inner.seen.contains_key(key) {
            return false;
        }
        while inner.order.len() >= self.capacity {
            evict_front(&mut inner);
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.seen.insert(key.to_string(), seq);
        inner.order.push_back((key.to_string(), seq, now));
        true
    }

    /// Forget `key` so a redelivery is processed again
    pub fn release(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.seen.remove(key).is_some() {
            log::debug!("Released dedup key {}", key);
        }
    }

    /// Number of keys currently remembered
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expire(&self, inner: &mut Inner, now: Instant) {
        let Some(ttl) = self.ttl else {
            return;
        };
        while inner
            .order
            .front()
            .is_some_and(|(_, _, claimed)| now.duration_since(*claimed) >= ttl)
        {
            evict_front(inner);
        }
    }
}

fn evict_front(inner: &mut Inner) {
    if let Some((key, seq, _)) = inner.order.pop_front() {
        if inner.seen.get(&key) == Some(&seq) {
            inner.seen.remove(&key);
        }
    }
}
