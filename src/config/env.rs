use super::FeedConfig;
use tracing::warn;

/// Apply environment overrides on top of file/default configuration.
///
/// Unparseable values are ignored with a warning and the existing value kept.
pub fn apply_env_overrides(config: &mut FeedConfig) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

fn apply_overrides(config: &mut FeedConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("LIVEFEED_REGION") {
        config.feed.region = v;
    }
    if let Some(v) = lookup("LIVEFEED_SOCKET_URL") {
        config.socket.url = v;
    }
    if let Some(v) = lookup("LIVEFEED_API_URL") {
        config.polling.base_url = v;
    }
    if let Some(v) = lookup("LIVEFEED_PAGE_SIZE") {
        match v.parse::<u32>() {
            Ok(n) => config.feed.page_size = n,
            Err(_) => warn!(value = %v, "Ignoring invalid LIVEFEED_PAGE_SIZE"),
        }
    }
    if let Some(v) = lookup("LIVEFEED_ALL_VESSELS") {
        match v.parse::<bool>() {
            Ok(b) => config.feed.all_vessels = b,
            Err(_) => warn!(value = %v, "Ignoring invalid LIVEFEED_ALL_VESSELS"),
        }
    }
}
