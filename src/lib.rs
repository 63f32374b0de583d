// Vessel model, regions and wire-tolerant decoding
pub mod entity;

// Live feed wire protocol
pub mod protocol;

// Region-keyed TTL cache
pub mod cache;

// Configuration (TOML + environment)
pub mod config;

// Socket/polling transports and the session state machine
pub mod transport;

// Pagination and subscription coordinator
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{new_region_cache, RegionCache, SharedRegionCache};
pub use config::FeedConfig;
pub use entity::{Position, Region, TrackedEntity};
pub use sync::{ConnectionState, LiveFeed, RefreshOutcome, SyncState};
