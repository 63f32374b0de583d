// Pagination/state coordinator for live region subscriptions

mod feed;
mod state;

pub use crate::transport::ConnectionState;
pub use feed::{LiveFeed, PageSizeError, RefreshOutcome};
pub use state::SyncState;
