use super::state::SyncState;
use crate::cache::SharedRegionCache;
use crate::config::{FeedConfig, MAX_PAGE_SIZE};
use crate::entity::{Region, TrackedEntity};
use crate::protocol::Batch;
use crate::transport::{
    BatchSink, Command, ConnectionState, FeedRequest, HttpPollingClient, PollingClient,
    RequestTag, Session, SessionSettings, SocketConnector, WsConnector,
};
use anyhow::{Context, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const NOT_CONNECTED: &str = "Not connected, retrying";

/// Result of a refresh request
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Served synchronously from a fresh cache entry; no network call
    Cached(Arc<Vec<TrackedEntity>>),
    /// Handed to the active transport
    Requested,
    /// No channel is up; the request waits for the reconnect loop
    Queued,
    /// The feed was torn down
    Inactive,
}

/// Rejected page size
#[derive(Debug, Clone, PartialEq)]
pub struct PageSizeError(pub u32);

impl fmt::Display for PageSizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page size {} out of range: must be between 1 and {}",
            self.0, MAX_PAGE_SIZE
        )
    }
}

impl std::error::Error for PageSizeError {}

/// State shared between the coordinator and its session task.
///
/// Every acceptance decision and the matching state/cache write happen inside
/// one watch-channel modification, so a region switch cannot interleave with
/// a late batch.
struct FeedCore {
    cache: SharedRegionCache,
    state: watch::Sender<SyncState>,
}

impl FeedCore {
    fn mark_torn_down(&self) {
        let changed = self.state.send_if_modified(|s| {
            if s.is_torn_down() {
                return false;
            }
            s.connection = ConnectionState::TornDown;
            s.loading = false;
            true
        });
        if changed {
            info!("Live feed torn down");
        }
    }
}

impl BatchSink for FeedCore {
    fn deliver(&self, tag: &RequestTag, batch: Batch) {
        let cache = &self.cache;
        let count = batch.entities.len();

        let accepted = self.state.send_if_modified(|s| {
            if !s.accepts(tag) {
                return false;
            }
            let mut batch = batch;
            let entities = Arc::new(std::mem::take(&mut batch.entities));
            s.apply_batch(tag.seq, Arc::clone(&entities), &batch);
            cache.set_page(&tag.region, s.page, entities);
            true
        });

        if accepted {
            debug!(region = %tag.region, seq = tag.seq, entities = count, "Applied batch");
        } else {
            debug!(
                region = %tag.region,
                epoch = tag.epoch,
                seq = tag.seq,
                "Discarding stale batch"
            );
        }
    }

    fn report_error(&self, tag: &RequestTag, message: String) {
        self.state.send_if_modified(|s| {
            if !s.same_subscription(tag) {
                return false;
            }
            s.error = Some(message);
            s.loading = false;
            true
        });
    }

    fn connection_changed(&self, state: ConnectionState) {
        self.state.send_if_modified(|s| {
            if s.is_torn_down() || s.connection == state {
                return false;
            }
            s.connection = state;
            true
        });
    }
}

/// Live feed coordinator: the single entry point for a region subscription.
///
/// Owns page/page-size state, serves fresh cache entries synchronously and
/// delegates everything else to its transport session. Dropping the feed
/// tears it down.
pub struct LiveFeed {
    core: Arc<FeedCore>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    session: Option<JoinHandle<()>>,
    next_seq: AtomicU64,
}

impl LiveFeed {
    /// Start a feed with production transports built from `config`.
    pub fn connect(config: &FeedConfig, cache: SharedRegionCache) -> Result<Self> {
        let region = Region::parse(&config.feed.region)
            .with_context(|| format!("Invalid region '{}'", config.feed.region))?;
        let poller = HttpPollingClient::new(
            config.polling.base_url.clone(),
            config.polling.request_timeout(),
        )?;

        Ok(Self::start(
            config,
            region,
            cache,
            Arc::new(WsConnector::new()),
            Arc::new(poller),
        ))
    }

    /// Start a feed for `region` over the given transports.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &FeedConfig,
        region: Region,
        cache: SharedRegionCache,
        connector: Arc<dyn SocketConnector>,
        poller: Arc<dyn PollingClient>,
    ) -> Self {
        let page_size = config.feed.page_size.clamp(1, MAX_PAGE_SIZE);
        let cached = cache.get_page(&region, 1);
        let (state_tx, _) = watch::channel(SyncState::new(region.clone(), page_size, cached));
        let core = Arc::new(FeedCore {
            cache,
            state: state_tx,
        });

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let initial = FeedRequest {
            tag: RequestTag {
                region: region.clone(),
                epoch: 0,
                seq: 1,
            },
            page: 1,
            page_size,
        };

        let session = Session::new(
            SessionSettings::from(config),
            connector,
            poller,
            Arc::clone(&core) as Arc<dyn BatchSink>,
            cmd_rx,
            initial,
        );
        info!(session = %session.id(), region = %region, page_size, "Starting live feed");
        let handle = tokio::spawn(session.run());

        Self {
            core,
            commands: Some(cmd_tx),
            session: Some(handle),
            next_seq: AtomicU64::new(2),
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> SyncState {
        self.core.state.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn watch(&self) -> watch::Receiver<SyncState> {
        self.core.state.subscribe()
    }

    /// Refresh the current view, optionally moving to another page/page size.
    ///
    /// An unchanged view with a fresh cache entry is answered from the cache
    /// without touching the network.
    pub fn refresh(&self, page: Option<u32>, page_size: Option<u32>) -> RefreshOutcome {
        let (region, epoch, current_page, current_size, connection) = {
            let s = self.core.state.borrow();
            (s.region.clone(), s.epoch, s.page, s.page_size, s.connection)
        };
        if connection == ConnectionState::TornDown {
            return RefreshOutcome::Inactive;
        }

        let page = page.unwrap_or(current_page).max(1);
        let page_size = page_size.unwrap_or(current_size);

        if page == current_page && page_size == current_size {
            if let Some(cached) = self.core.cache.get_page(&region, page) {
                debug!(region = %region, entities = cached.len(), "Serving refresh from cache");
                let shown = Arc::clone(&cached);
                self.core.state.send_modify(|s| s.show_cached(shown));
                return RefreshOutcome::Cached(cached);
            }
        }

        let live = connection.is_live();
        self.core.state.send_modify(|s| {
            s.page = page;
            s.page_size = page_size;
            s.loading = true;
            if !live {
                s.error = Some(NOT_CONNECTED.to_string());
            }
        });

        let request = FeedRequest {
            tag: RequestTag {
                region,
                epoch,
                seq: self.next_seq(),
            },
            page,
            page_size,
        };
        self.send(Command::Fetch(request));

        if live {
            RefreshOutcome::Requested
        } else {
            RefreshOutcome::Queued
        }
    }

    /// Move to `page`. Out-of-range pages leave the state untouched and return `None`.
    pub fn go_to_page(&self, page: u32) -> Option<RefreshOutcome> {
        let (total_pages, page_size) = {
            let s = self.core.state.borrow();
            (s.total_pages, s.page_size)
        };
        if page < 1 || page > total_pages {
            debug!(page, total_pages, "Ignoring out-of-range page");
            return None;
        }
        Some(self.refresh(Some(page), Some(page_size)))
    }

    /// Change the page size and go back to the first page.
    pub fn change_page_size(&self, size: u32) -> Result<RefreshOutcome, PageSizeError> {
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(PageSizeError(size));
        }
        Ok(self.refresh(Some(1), Some(size)))
    }

    /// Re-subscribe to `region`.
    ///
    /// Data of the previous region disappears immediately; a fresh first-page
    /// cache entry for the new region is shown while the transport fetches. Returns false
    /// when nothing changed.
    pub fn set_region(&self, region: Region) -> bool {
        let cached = self.core.cache.get_page(&region, 1);
        let seq = self.next_seq();
        let mut request = None;

        self.core.state.send_if_modified(|s| {
            if s.is_torn_down() || s.region == region {
                return false;
            }
            s.switch_region(region.clone(), cached);
            request = Some(FeedRequest {
                tag: RequestTag {
                    region: region.clone(),
                    epoch: s.epoch,
                    seq,
                },
                page: 1,
                page_size: s.page_size,
            });
            true
        });

        match request {
            Some(request) => {
                info!(region = %region, "Switching feed region");
                self.send(Command::Subscribe(request));
                true
            }
            None => false,
        }
    }

    /// Release the session immediately: the task is aborted, which drops the
    /// socket, the reconnect timer and the polling interval.
    pub fn teardown(&mut self) {
        self.commands.take();
        if let Some(handle) = self.session.take() {
            handle.abort();
        }
        self.core.mark_torn_down();
    }

    /// Close the socket gracefully and wait for the session to finish.
    pub async fn shutdown(mut self) {
        self.commands.take();
        if let Some(handle) = self.session.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Live feed session ended abnormally");
                }
            }
        }
        self.core.mark_torn_down();
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn send(&self, cmd: Command) {
        match &self.commands {
            Some(tx) => {
                if tx.send(cmd).is_err() {
                    debug!("Live feed session is gone, dropping command");
                }
            }
            None => debug!("Live feed stopped, dropping command"),
        }
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.teardown();
    }
}
