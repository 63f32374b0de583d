// Transport selector: one delivery channel (socket or polling) per subscription

use crate::entity::Region;
use crate::protocol::Batch;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

pub mod polling;
pub mod session;
pub mod socket;

pub use polling::HttpPollingClient;
pub use session::{Session, SessionSettings};
pub use socket::WsConnector;

/// Transport-level failures. None of these are fatal to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Socket could not be established (refused, DNS, handshake, timeout)
    Connect(String),
    /// Writing a frame to an open socket failed
    Send(String),
    /// Polling request failed before a response arrived
    Request(String),
    /// Polling endpoint answered with a non-success status
    Status(u16),
    /// Payload did not have the expected shape
    Decode(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Connect(e) => write!(f, "connection failed: {}", e),
            TransportError::Send(e) => write!(f, "send failed: {}", e),
            TransportError::Request(e) => write!(f, "polling request failed: {}", e),
            TransportError::Status(code) => write!(f, "polling endpoint returned HTTP {}", code),
            TransportError::Decode(e) => write!(f, "malformed payload: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

/// Connectivity of a subscription.
///
/// `Connecting → Connected ⇄ Reconnecting` on the socket path; `PollingFallback`
/// is entered when the socket cannot be established and left only through the
/// timed retry back to `Connecting`. `TornDown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    PollingFallback,
    TornDown,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::PollingFallback => "polling_fallback",
            ConnectionState::TornDown => "torn_down",
        }
    }

    /// True when some channel is currently able to deliver data.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::PollingFallback
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a request: the region it was issued for, the region epoch
/// (bumped on every region switch) and a monotonic sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTag {
    pub region: Region,
    pub epoch: u64,
    pub seq: u64,
}

/// A tagged view request: which page of which region.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRequest {
    pub tag: RequestTag,
    pub page: u32,
    pub page_size: u32,
}

impl FeedRequest {
    pub fn region(&self) -> &Region {
        &self.tag.region
    }
}

/// Commands from the coordinator to its session task
#[derive(Debug, Clone)]
pub enum Command {
    /// Fetch a page for the current region
    Fetch(FeedRequest),
    /// Switch the subscription to a new region
    Subscribe(FeedRequest),
}

impl Command {
    pub fn into_request(self) -> FeedRequest {
        match self {
            Command::Fetch(req) | Command::Subscribe(req) => req,
        }
    }
}

/// Query string of the polling endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollQuery {
    pub region: Region,
    pub page: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
}

impl From<&FeedRequest> for PollQuery {
    fn from(req: &FeedRequest) -> Self {
        Self {
            region: req.tag.region.clone(),
            page: req.page,
            page_size: req.page_size,
        }
    }
}

/// Event read from an open socket
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Text(String),
    Closed,
}

/// An open, full-duplex live-update connection.
#[async_trait]
pub trait FeedSocket: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound event. Must be cancel-safe: it is raced against timers
    /// and commands.
    async fn next_event(&mut self) -> SocketEvent;

    async fn close(&mut self);
}

/// Opens live-update sockets. A returned socket is already open.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedSocket>, TransportError>;
}

/// Fetches one page over HTTP.
#[async_trait]
pub trait PollingClient: Send + Sync {
    async fn fetch(&self, query: &PollQuery) -> Result<Batch, TransportError>;
}

/// Receives everything a session produces.
pub trait BatchSink: Send + Sync {
    fn deliver(&self, tag: &RequestTag, batch: Batch);

    fn report_error(&self, tag: &RequestTag, message: String);

    fn connection_changed(&self, state: ConnectionState);
}
