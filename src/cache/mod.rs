// Region cache: short-lived read-through store of the last full result set per region.
//
// Values are whole `Arc` lists; a write swaps the entry, it never merges, so a
// reader can never observe a half-updated list. Time comes from the tokio clock
// so a paused test runtime controls expiry.

use crate::entity::{Region, TrackedEntity};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default time-to-live: 5 minutes
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Shared, process-wide cache handle passed to every feed.
pub type SharedRegionCache = Arc<RegionCache>;

pub fn new_region_cache(ttl: Duration) -> SharedRegionCache {
    Arc::new(RegionCache::with_ttl(ttl))
}

struct CacheEntry {
    entities: Arc<Vec<TrackedEntity>>,
    /// Page the list was fetched for
    page: u32,
    fetched_at: Instant,
}

pub struct RegionCache {
    entries: DashMap<Region, CacheEntry>,
    /// Most recent write across all regions
    last_write: Mutex<Option<Instant>>,
    ttl: Duration,
}

impl RegionCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            last_write: Mutex::new(None),
            ttl,
        }
    }

    /// Replace the entry for `region` with a first-page list.
    pub fn set(&self, region: &Region, entities: Arc<Vec<TrackedEntity>>) {
        self.set_page(region, 1, entities);
    }

    /// Replace the entry for `region` and stamp it with the current time.
    /// Only the most recently fetched page of a region is kept.
    pub fn set_page(&self, region: &Region, page: u32, entities: Arc<Vec<TrackedEntity>>) {
        let now = Instant::now();
        debug!(region = %region, page, entities = entities.len(), "Caching region batch");
        self.entries.insert(
            region.clone(),
            CacheEntry {
                entities,
                page,
                fetched_at: now,
            },
        );
        if let Ok(mut last) = self.last_write.lock() {
            *last = Some(now);
        }
    }

    /// Fresh entities for `region`, or `None` when absent or `age >= ttl`.
    pub fn get(&self, region: &Region) -> Option<Arc<Vec<TrackedEntity>>> {
        let entry = self.entries.get(region)?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(Arc::clone(&entry.entities))
        } else {
            None
        }
    }

    /// Like `get`, but only when the stored list is for `page`.
    pub fn get_page(&self, region: &Region, page: u32) -> Option<Arc<Vec<TrackedEntity>>> {
        let entry = self.entries.get(region)?;
        if entry.page == page && entry.fetched_at.elapsed() < self.ttl {
            Some(Arc::clone(&entry.entities))
        } else {
            None
        }
    }

    /// Coarse staleness signal: true when the most recent write to *any*
    /// region is older than the TTL, or nothing was ever written.
    ///
    /// This does not say anything about a specific region; use `get` for that.
    pub fn is_expired(&self) -> bool {
        match self.last_write.lock().ok().and_then(|last| *last) {
            Some(at) => at.elapsed() >= self.ttl,
            None => true,
        }
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.clear();
        if let Ok(mut last) = self.last_write.lock() {
            *last = None;
        }
        debug!("Region cache cleared");
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RegionCache {
    fn default() -> Self {
        Self::new()
    }
}
