use anyhow::{Context, Result};
use livefeed::cache::new_region_cache;
use livefeed::config::{apply_env_overrides, load_config, FeedConfig};
use livefeed::LiveFeed;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livefeed=info".into()),
        )
        .init();

    info!("Live feed starting...");

    let mut config = match std::env::var("LIVEFEED_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => FeedConfig::default(),
    };
    apply_env_overrides(&mut config);

    info!(
        region = %config.feed.region,
        socket_url = %config.socket.url,
        api_url = %config.polling.base_url,
        page_size = config.feed.page_size,
        "Configuration loaded"
    );

    let cache = new_region_cache(config.cache.ttl());
    let feed = LiveFeed::connect(&config, cache).context("Failed to start live feed")?;

    let mut updates = WatchStream::new(feed.watch());
    let reporter = tokio::spawn(async move {
        while let Some(state) = updates.next().await {
            info!(
                region = %state.region,
                connection = %state.connection,
                page = state.page,
                total_pages = state.total_pages,
                count = state.entities.len(),
                positioned = state.positioned().count(),
                categories = ?state.category_counts(),
                loading = state.loading,
                error = state.error.as_deref().unwrap_or(""),
                "Feed state"
            );
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    feed.shutdown().await;
    reporter.abort();
    info!("Live feed stopped");

    Ok(())
}
