use crate::entity::{Position, Region, TrackedEntity};
use crate::protocol::Batch;
use crate::transport::{ConnectionState, RequestTag};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Published state of one live feed subscription.
#[derive(Debug, Clone)]
pub struct SyncState {
    pub region: Region,
    /// Visible entities; shared with the region cache, replaced wholesale
    pub entities: Arc<Vec<TrackedEntity>>,
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u32,
    pub connection: ConnectionState,
    pub loading: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub error: Option<String>,

    /// Region generation; bumped on every region switch
    pub(crate) epoch: u64,
    /// Sequence number of the last applied batch
    pub(crate) applied_seq: u64,
}

impl SyncState {
    pub(crate) fn new(
        region: Region,
        page_size: u32,
        cached: Option<Arc<Vec<TrackedEntity>>>,
    ) -> Self {
        let loading = cached.is_none();
        let entities = cached.unwrap_or_default();
        Self {
            region,
            total_count: entities.len() as u64,
            entities,
            page: 1,
            page_size,
            total_pages: 1,
            connection: ConnectionState::Connecting,
            loading,
            last_updated: None,
            error: None,
            epoch: 0,
            applied_seq: 0,
        }
    }

    /// Entities with a valid position, ready for a map layer.
    pub fn positioned(&self) -> impl Iterator<Item = (&TrackedEntity, Position)> + '_ {
        self.entities
            .iter()
            .filter_map(|e| e.position().map(|p| (e, p)))
    }

    /// Visible entities per category.
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entity in self.entities.iter() {
            *counts
                .entry(entity.category_or_unknown().to_string())
                .or_insert(0) += 1;
        }
        counts
    }

    pub fn is_torn_down(&self) -> bool {
        self.connection == ConnectionState::TornDown
    }

    /// A batch is current only for this region generation and not older
    /// than what is already shown.
    pub(crate) fn accepts(&self, tag: &RequestTag) -> bool {
        !self.is_torn_down()
            && tag.epoch == self.epoch
            && tag.region == self.region
            && tag.seq >= self.applied_seq
    }

    /// Same region generation, regardless of sequence.
    pub(crate) fn same_subscription(&self, tag: &RequestTag) -> bool {
        !self.is_torn_down() && tag.epoch == self.epoch && tag.region == self.region
    }

    pub(crate) fn apply_batch(
        &mut self,
        seq: u64,
        entities: Arc<Vec<TrackedEntity>>,
        batch: &Batch,
    ) {
        self.applied_seq = seq;
        self.total_count = batch.total_count.unwrap_or(entities.len() as u64);
        if let Some(size) = batch.page_size.filter(|n| *n > 0) {
            self.page_size = size;
        }
        if let Some(page) = batch.current_page.filter(|p| *p >= 1) {
            self.page = page;
        }
        self.total_pages = batch
            .total_pages
            .unwrap_or_else(|| pages_for(self.total_count, self.page_size))
            .max(1);
        self.entities = entities;
        self.loading = false;
        self.error = None;
        self.last_updated = Some(batch.timestamp.unwrap_or_else(Utc::now));
    }

    pub(crate) fn show_cached(&mut self, entities: Arc<Vec<TrackedEntity>>) {
        self.total_count = self.total_count.max(entities.len() as u64);
        self.entities = entities;
        self.loading = false;
        self.error = None;
    }

    pub(crate) fn switch_region(&mut self, region: Region, cached: Option<Arc<Vec<TrackedEntity>>>) {
        self.epoch += 1;
        self.region = region;
        self.page = 1;
        self.total_pages = 1;
        self.loading = cached.is_none();
        self.entities = cached.unwrap_or_default();
        self.total_count = self.entities.len() as u64;
        self.error = None;
    }
}

fn pages_for(total_count: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 1;
    }
    let pages = total_count.div_ceil(page_size as u64);
    u32::try_from(pages).unwrap_or(u32::MAX).max(1)
}
