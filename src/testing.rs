// In-memory transports for exercising sessions under a paused clock

use crate::entity::TrackedEntity;
use crate::protocol::Batch;
use crate::transport::{
    FeedSocket, PollQuery, PollingClient, SocketConnector, SocketEvent, TransportError,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub(crate) fn vessels(ids: &[&str]) -> Vec<TrackedEntity> {
    ids.iter()
        .map(|id| TrackedEntity::new(*id, Some(1.0), Some(2.0)))
        .collect()
}

/// Let spawned tasks run without moving the paused clock.
pub(crate) async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ConnectMode {
    Accept,
    Refuse,
    Hang,
}

/// Test-side end of a fake socket
#[derive(Clone)]
pub(crate) struct SocketHandle {
    sent: Arc<Mutex<Vec<String>>>,
    inbound: mpsc::UnboundedSender<SocketEvent>,
    closed: Arc<AtomicBool>,
}

impl SocketHandle {
    pub(crate) fn push(&self, text: &str) {
        let _ = self.inbound.send(SocketEvent::Text(text.to_string()));
    }

    pub(crate) fn close(&self) {
        let _ = self.inbound.send(SocketEvent::Closed);
    }

    pub(crate) fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    /// Client closed it gracefully
    pub(crate) fn closed_by_client(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The session side was dropped
    pub(crate) fn dropped(&self) -> bool {
        self.inbound.is_closed()
    }
}

struct FakeSocket {
    sent: Arc<Mutex<Vec<String>>>,
    inbound: mpsc::UnboundedReceiver<SocketEvent>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FeedSocket for FakeSocket {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_event(&mut self) -> SocketEvent {
        self.inbound.recv().await.unwrap_or(SocketEvent::Closed)
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct FakeConnector {
    mode: Mutex<ConnectMode>,
    attempts: AtomicUsize,
    sockets: Mutex<Vec<SocketHandle>>,
}

impl FakeConnector {
    pub(crate) fn new(mode: ConnectMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            attempts: AtomicUsize::new(0),
            sockets: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_mode(&self, mode: ConnectMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn socket(&self, index: usize) -> SocketHandle {
        self.sockets.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl SocketConnector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn FeedSocket>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        match mode {
            ConnectMode::Refuse => Err(TransportError::Connect("connection refused".to_string())),
            ConnectMode::Hang => std::future::pending().await,
            ConnectMode::Accept => {
                let (tx, rx) = mpsc::unbounded_channel();
                let sent = Arc::new(Mutex::new(Vec::new()));
                let closed = Arc::new(AtomicBool::new(false));
                self.sockets.lock().unwrap().push(SocketHandle {
                    sent: Arc::clone(&sent),
                    inbound: tx,
                    closed: Arc::clone(&closed),
                });
                Ok(Box::new(FakeSocket {
                    sent,
                    inbound: rx,
                    closed,
                }))
            }
        }
    }
}

/// Polling client answering from per-region fixtures
pub(crate) struct FakePoller {
    queries: Mutex<Vec<PollQuery>>,
    responses: Mutex<HashMap<String, Vec<TrackedEntity>>>,
    delays: Mutex<HashMap<(String, u32), Duration>>,
    total_pages: Mutex<Option<u32>>,
    failing: AtomicBool,
}

impl FakePoller {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            queries: Mutex::new(Vec::new()),
            responses: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            total_pages: Mutex::new(Some(1)),
            failing: AtomicBool::new(false),
        })
    }

    pub(crate) fn respond(&self, region: &str, entities: Vec<TrackedEntity>) {
        self.responses
            .lock()
            .unwrap()
            .insert(region.to_string(), entities);
    }

    pub(crate) fn delay(&self, region: &str, page: u32, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert((region.to_string(), page), delay);
    }

    pub(crate) fn set_total_pages(&self, pages: u32) {
        *self.total_pages.lock().unwrap() = Some(pages);
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn queries(&self) -> Vec<PollQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl PollingClient for FakePoller {
    async fn fetch(&self, query: &PollQuery) -> Result<Batch, TransportError> {
        self.queries.lock().unwrap().push(query.clone());

        let region = query.region.as_str().to_string();
        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(&(region.clone(), query.page))
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Request("backend unreachable".to_string()));
        }

        let entities = self
            .responses
            .lock()
            .unwrap()
            .get(&region)
            .cloned()
            .unwrap_or_default();
        let total_pages = *self.total_pages.lock().unwrap();

        Ok(Batch {
            total_count: Some(entities.len() as u64),
            entities,
            timestamp: None,
            total_pages,
            current_page: Some(query.page),
            page_size: Some(query.page_size),
        })
    }
}
