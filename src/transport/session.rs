//! Per-subscription transport session.
//!
//! One session task owns the delivery channel of one live feed. It walks the
//! connection state machine explicitly:
//! - `Connecting`: open the socket; on failure fall back to polling
//! - `Connected`: forward requests, decode frames, wait for close
//! - `Reconnecting`: wait the fixed reconnect delay, then `Connecting`
//! - `Polling`: poll on an interval until the timed socket retry
//!
//! Polls run as fire-and-forget tasks that report back over a channel. The
//! session never decides whether a batch is current; it tags everything with
//! the request it belongs to and lets the sink judge.

use super::{
    BatchSink, Command, ConnectionState, FeedRequest, FeedSocket, PollQuery, PollingClient,
    RequestTag, SocketConnector, SocketEvent, TransportError,
};
use crate::config::FeedConfig;
use crate::protocol::{parse_server_message, Batch, ClientMessage, Inbound};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Unanswered `request_vessels` frames remembered per socket
const MAX_IN_FLIGHT: usize = 32;

/// Timing and endpoint settings of a session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub socket_url: String,
    pub all_vessels: bool,
    pub reconnect_delay: Duration,
    pub fallback_retry: Duration,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&FeedConfig> for SessionSettings {
    fn from(config: &FeedConfig) -> Self {
        Self {
            socket_url: config.socket.url.clone(),
            all_vessels: config.feed.all_vessels,
            reconnect_delay: config.socket.reconnect_delay(),
            fallback_retry: config.socket.fallback_retry(),
            connect_timeout: config.socket.connect_timeout(),
            poll_interval: config.polling.interval().max(MIN_POLL_INTERVAL),
        }
    }
}

struct PollOutcome {
    request: FeedRequest,
    result: Result<Batch, TransportError>,
}

enum Phase {
    Connecting,
    Connected(Box<dyn FeedSocket>),
    Reconnecting { retry_at: Instant },
    Polling { retry_at: Instant },
    Closed,
}

pub struct Session {
    id: Uuid,
    settings: SessionSettings,
    connector: Arc<dyn SocketConnector>,
    poller: Arc<dyn PollingClient>,
    sink: Arc<dyn BatchSink>,
    commands: mpsc::UnboundedReceiver<Command>,
    poll_tx: mpsc::UnboundedSender<PollOutcome>,
    poll_rx: mpsc::UnboundedReceiver<PollOutcome>,
    /// Latest view requested by the coordinator
    current: FeedRequest,
    /// Tags of `request_vessels` frames sent on the open socket, oldest first.
    /// Socket updates are answered in order, so each update belongs to the head.
    in_flight: VecDeque<RequestTag>,
}

impl Session {
    pub fn new(
        settings: SessionSettings,
        connector: Arc<dyn SocketConnector>,
        poller: Arc<dyn PollingClient>,
        sink: Arc<dyn BatchSink>,
        commands: mpsc::UnboundedReceiver<Command>,
        initial: FeedRequest,
    ) -> Self {
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        Self {
            id: Uuid::now_v7(),
            settings,
            connector,
            poller,
            sink,
            commands,
            poll_tx,
            poll_rx,
            current: initial,
            in_flight: VecDeque::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Drive the session until the command channel closes.
    ///
    /// Aborting the task running this future drops the socket and every timer.
    pub async fn run(mut self) {
        info!(
            session = %self.id,
            region = %self.current.region(),
            "Live feed session started"
        );

        let mut phase = Phase::Connecting;
        loop {
            phase = match phase {
                Phase::Connecting => self.connect().await,
                Phase::Connected(socket) => self.run_connected(socket).await,
                Phase::Reconnecting { retry_at } => self.wait_reconnect(retry_at).await,
                Phase::Polling { retry_at } => self.run_polling(retry_at).await,
                Phase::Closed => break,
            };
        }

        info!(session = %self.id, "Live feed session stopped");
    }

    async fn connect(&mut self) -> Phase {
        self.sink.connection_changed(ConnectionState::Connecting);

        let attempt = timeout(
            self.settings.connect_timeout,
            self.connector.connect(&self.settings.socket_url),
        )
        .await
        .unwrap_or_else(|_| Err(TransportError::Connect("timed out".to_string())));

        match attempt {
            Ok(mut socket) => {
                // Requests made while connecting were queued; only the latest view matters
                if !self.drain_commands() {
                    socket.close().await;
                    return Phase::Closed;
                }

                self.in_flight.clear();
                self.sink.connection_changed(ConnectionState::Connected);
                match self.send_subscription(&mut socket).await {
                    Ok(()) => Phase::Connected(socket),
                    Err(e) => {
                        warn!(session = %self.id, error = %e, "Failed to subscribe on live feed");
                        self.schedule_reconnect()
                    }
                }
            }
            Err(e) => {
                warn!(
                    session = %self.id,
                    error = %e,
                    retry_ms = self.settings.fallback_retry.as_millis() as u64,
                    "Live feed unavailable, falling back to polling"
                );
                if !self.drain_commands() {
                    return Phase::Closed;
                }
                self.sink.connection_changed(ConnectionState::PollingFallback);
                self.sink.report_error(
                    &self.current.tag,
                    format!("Live updates unavailable ({}), polling instead", e),
                );
                self.spawn_poll(self.current.clone());
                Phase::Polling {
                    retry_at: Instant::now() + self.settings.fallback_retry,
                }
            }
        }
    }

    async fn run_connected(&mut self, mut socket: Box<dyn FeedSocket>) -> Phase {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        socket.close().await;
                        return Phase::Closed;
                    };
                    let resubscribe = matches!(cmd, Command::Subscribe(_));
                    self.current = cmd.into_request();

                    let sent = if resubscribe {
                        info!(session = %self.id, region = %self.current.region(), "Switching live feed region");
                        self.send_subscription(&mut socket).await
                    } else {
                        self.send_request(&mut socket).await
                    };
                    if let Err(e) = sent {
                        warn!(session = %self.id, error = %e, "Failed to send on live feed");
                        return self.schedule_reconnect();
                    }
                }

                event = socket.next_event() => match event {
                    SocketEvent::Text(text) => self.handle_frame(&text),
                    SocketEvent::Closed => return self.schedule_reconnect(),
                },

                Some(outcome) = self.poll_rx.recv() => self.apply_poll(outcome),
            }
        }
    }

    async fn wait_reconnect(&mut self, retry_at: Instant) -> Phase {
        let delay = sleep_until(retry_at);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                _ = &mut delay => return Phase::Connecting,

                // Sent once the socket is back
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.current = cmd.into_request(),
                    None => return Phase::Closed,
                },

                Some(outcome) = self.poll_rx.recv() => self.apply_poll(outcome),
            }
        }
    }

    async fn run_polling(&mut self, retry_at: Instant) -> Phase {
        let period = self.settings.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut retry_at = retry_at;

        loop {
            tokio::select! {
                biased;

                _ = sleep_until(retry_at) => {
                    info!(session = %self.id, "Retrying live feed connection");
                    return Phase::Connecting;
                }

                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => {
                        self.current = cmd.into_request();
                        self.spawn_poll(self.current.clone());
                    }
                    None => return Phase::Closed,
                },

                _ = ticker.tick() => self.spawn_poll(self.current.clone()),

                Some(outcome) = self.poll_rx.recv() => {
                    if outcome.result.is_err() {
                        // Polling is failing too; try the socket again sooner
                        let sooner = Instant::now() + self.settings.reconnect_delay;
                        if sooner < retry_at {
                            debug!(session = %self.id, "Bringing socket retry forward");
                            retry_at = sooner;
                        }
                    }
                    self.apply_poll(outcome);
                }
            }
        }
    }

    fn schedule_reconnect(&self) -> Phase {
        info!(
            session = %self.id,
            delay_ms = self.settings.reconnect_delay.as_millis() as u64,
            "Live feed closed, reconnecting"
        );
        self.sink.connection_changed(ConnectionState::Reconnecting);
        Phase::Reconnecting {
            retry_at: Instant::now() + self.settings.reconnect_delay,
        }
    }

    /// Apply queued commands. Returns false once the coordinator is gone.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(cmd) => self.current = cmd.into_request(),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    async fn send_subscription(
        &mut self,
        socket: &mut Box<dyn FeedSocket>,
    ) -> Result<(), TransportError> {
        let subscribe = ClientMessage::SubscribeRegion {
            region: self.current.region().clone(),
        };
        self.send(socket, &subscribe).await?;
        self.send_request(socket).await
    }

    async fn send_request(&mut self, socket: &mut Box<dyn FeedSocket>) -> Result<(), TransportError> {
        let request = ClientMessage::request(
            self.settings.all_vessels,
            self.current.page,
            self.current.page_size,
        );
        self.send(socket, &request).await?;

        if self.in_flight.len() == MAX_IN_FLIGHT {
            self.in_flight.pop_front();
        }
        self.in_flight.push_back(self.current.tag.clone());
        Ok(())
    }

    async fn send(
        &mut self,
        socket: &mut Box<dyn FeedSocket>,
        msg: &ClientMessage,
    ) -> Result<(), TransportError> {
        let frame = msg
            .to_frame()
            .map_err(|e| TransportError::Send(e.to_string()))?;
        debug!(session = %self.id, frame = %frame, "Sending live feed frame");
        socket.send_text(frame).await
    }

    fn handle_frame(&mut self, text: &str) {
        match parse_server_message(text) {
            Ok(Inbound::Batch(batch)) => {
                // Unsolicited pushes (nothing outstanding) belong to the current view
                let tag = self
                    .in_flight
                    .pop_front()
                    .unwrap_or_else(|| self.current.tag.clone());
                debug!(
                    session = %self.id,
                    region = %tag.region,
                    epoch = tag.epoch,
                    entities = batch.entities.len(),
                    "Live batch received"
                );
                self.sink.deliver(&tag, batch);
            }
            Ok(Inbound::ServerError(message)) => {
                warn!(session = %self.id, error = %message, "Live feed server error");
                self.sink.report_error(&self.current.tag, message);
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "Malformed live feed frame");
                self.sink.report_error(
                    &self.current.tag,
                    TransportError::Decode(e.to_string()).to_string(),
                );
            }
        }
    }

    fn apply_poll(&self, outcome: PollOutcome) {
        let PollOutcome { request, result } = outcome;
        match result {
            Ok(batch) => {
                debug!(
                    session = %self.id,
                    region = %request.region(),
                    page = request.page,
                    entities = batch.entities.len(),
                    "Polled batch received"
                );
                self.sink.deliver(&request.tag, batch);
            }
            Err(e) => {
                warn!(session = %self.id, region = %request.region(), error = %e, "Polling failed");
                self.sink.report_error(&request.tag, e.to_string());
            }
        }
    }

    fn spawn_poll(&self, request: FeedRequest) {
        let poller = Arc::clone(&self.poller);
        let tx = self.poll_tx.clone();
        debug!(
            session = %self.id,
            region = %request.region(),
            page = request.page,
            page_size = request.page_size,
            "Issuing poll"
        );

        tokio::spawn(async move {
            let query = PollQuery::from(&request);
            let result = poller.fetch(&query).await;
            // After teardown the receiver is gone and the response is dropped
            let _ = tx.send(PollOutcome { request, result });
        });
    }
}
