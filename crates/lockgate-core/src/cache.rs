use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, warn};

/// Handle cache settings shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Reuse exclusive handles across calls. Read/write groups are cached
    /// regardless since both sides of a key must share one group.
    pub enabled: bool,
    /// Entry count at which a capacity warning is logged (0 disables it).
    pub warn_threshold: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            warn_threshold: 10_000,
        }
    }
}

/// Process-lifetime create-or-fetch cache.
///
/// Entries are never evicted: one entry per distinct key ever requested. That
/// holds only while key cardinality is bounded. Deployments with unbounded keys
/// need a bounded, reference-counted cache instead; `warn_threshold` makes the
/// growth visible rather than silent.
///
/// Creation runs outside any map lock. Racing creators for the same key each
/// build a value, exactly one is stored, and every caller gets the stored one.
/// Values are expected to be cheap, side-effect free handle objects.
#[derive(Debug)]
pub struct HandleCache<K: Eq + Hash, V> {
    name: &'static str,
    entries: DashMap<K, V>,
    warn_threshold: usize,
    warned: AtomicBool,
}

impl<K, V> HandleCache<K, V>
where
    K: Eq + Hash + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str, warn_threshold: usize) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            warn_threshold,
            warned: AtomicBool::new(false),
        }
    }

    /// Return the cached value for `key`, creating it with `create` on first use.
    pub fn get_or_create<F>(&self, key: K, create: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(existing) = self.entries.get(&key) {
            return existing.value().clone();
        }

        let created = create();
        let value = match self.entries.entry(key) {
            // Lost the race: drop ours, hand out the winner.
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                debug!("{} cache: created {:?}", self.name, entry.key());
                entry.insert(created).value().clone()
            }
        };
        self.check_capacity();
        value
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Used when the client the values were built from is
    /// replaced or removed.
    pub fn clear(&self) {
        self.entries.clear();
        self.warned.store(false, Ordering::Relaxed);
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn check_capacity(&self) {
        if self.warn_threshold == 0 {
            return;
        }
        let len = self.entries.len();
        if len >= self.warn_threshold && !self.warned.swap(true, Ordering::Relaxed) {
            warn!(
                "{} cache holds {} entries (threshold {}); entries are never evicted, \
                 so unbounded key cardinality grows memory without limit",
                self.name, len, self.warn_threshold
            );
        }
    }
}
