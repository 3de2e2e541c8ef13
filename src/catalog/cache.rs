//! Pool State Cache
//!
//! Shared store of the leg catalog, keyed by (chain, dex). Each entry is an
//! immutable `Arc<Vec<Leg>>` snapshot swapped atomically on refresh, so the
//! single coarse lock is held only for map reads and swaps, never across an
//! await point. A failed refresh leaves the previous snapshot intact:
//! stale-but-available beats empty.

use crate::errors::EngineError;
use crate::types::{DexKind, Leg};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

pub type CatalogKey = (String, DexKind);

#[derive(Default)]
struct CacheInner {
    legs: HashMap<CatalogKey, Arc<Vec<Leg>>>,
    dirty: HashSet<CatalogKey>,
    last_refresh: Option<Instant>,
}

/// Consistent view of the whole catalog, taken under one lock acquisition.
/// The scan cycle quotes and scores against this even if listeners update
/// the cache mid-cycle.
#[derive(Clone, Default)]
pub struct CatalogSnapshot {
    entries: Vec<Arc<Vec<Leg>>>,
}

impl CatalogSnapshot {
    pub fn legs(&self) -> impl Iterator<Item = &Leg> {
        self.entries.iter().flat_map(|e| e.iter())
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct PoolCache {
    inner: RwLock<CacheInner>,
    refresh_interval: Duration,
}

impl PoolCache {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            refresh_interval,
        }
    }

    /// Read one entry's current snapshot.
    pub fn get(&self, chain: &str, dex: DexKind) -> Option<Arc<Vec<Leg>>> {
        let inner = self.inner.read().expect("cache lock poisoned");
        inner.legs.get(&(chain.to_string(), dex)).cloned()
    }

    /// Replace-all (not merge) for one (chain, dex) entry. Clears the dirty
    /// mark and stamps the refresh time.
    pub fn put(&self, chain: String, dex: DexKind, legs: Vec<Leg>) {
        let mut inner = self.inner.write().expect("cache lock poisoned");
        debug!(
            "catalog put: {}/{} -> {} legs (replace-all)",
            chain,
            dex,
            legs.len()
        );
        let key = (chain, dex);
        inner.dirty.remove(&key);
        inner.legs.insert(key, Arc::new(legs));
        inner.last_refresh = Some(Instant::now());
    }

    /// Event-driven invalidation: mark the entry dirty so the next cycle
    /// refreshes it. The existing snapshot keeps serving reads.
    pub fn invalidate(&self, chain: &str, dex: DexKind) {
        let mut inner = self.inner.write().expect("cache lock poisoned");
        inner.dirty.insert((chain.to_string(), dex));
    }

    pub fn dirty_keys(&self) -> Vec<CatalogKey> {
        let inner = self.inner.read().expect("cache lock poisoned");
        inner.dirty.iter().cloned().collect()
    }

    /// True once the whole catalog is past its refresh interval (or never
    /// refreshed at all).
    pub fn is_stale(&self) -> bool {
        let inner = self.inner.read().expect("cache lock poisoned");
        match inner.last_refresh {
            Some(at) => at.elapsed() > self.refresh_interval,
            None => true,
        }
    }

    /// Degraded-mode flag: stale data is still served, but the caller gets
    /// told by how much the refresh is overdue.
    pub fn check_freshness(&self) -> Result<(), EngineError> {
        let inner = self.inner.read().expect("cache lock poisoned");
        match inner.last_refresh {
            Some(at) if at.elapsed() > self.refresh_interval => {
                Err(EngineError::StaleCacheExpired {
                    overdue_secs: (at.elapsed() - self.refresh_interval).as_secs(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Whole-catalog snapshot under a single read-lock acquisition.
    pub fn snapshot(&self) -> CatalogSnapshot {
        let inner = self.inner.read().expect("cache lock poisoned");
        CatalogSnapshot {
            entries: inner.legs.values().cloned().collect(),
        }
    }
}
