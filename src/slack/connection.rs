//! Reconnecting Socket Mode session manager
//!
//! `Disconnected → Handshaking → Connected → (error) Disconnected`, forever,
//! until the outer cancellation token fires. Each session gets a child token;
//! opening a new session cancels whatever reader was registered before it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::backoff::ReconnectBackoff;
use super::events::SocketEvent;
use super::TransportError;
use crate::metrics::Metrics;

/// Upstream connection primitives.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Cheap authenticated call. Used for the handshake and as liveness probe.
    async fn authenticate(&self) -> Result<(), TransportError>;

    /// Obtain a session endpoint and open the event stream.
    async fn open_session(&self) -> Result<Box<dyn EventStream>, TransportError>;
}

/// A live event session. Envelope acknowledgement happens inside the stream.
#[async_trait]
pub trait EventStream: Send {
    /// `Ok(None)` when the server closed the session cleanly.
    async fn next_event(&mut self) -> Result<Option<SocketEvent>, TransportError>;
}

/// Receives every decoded event in delivery order for one session.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: SocketEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Handshaking,
    Connected,
}

#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    /// True once the upstream `hello` arrived on the current session.
    pub connected: bool,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            connected: false,
            last_activity_at: None,
            consecutive_failures: 0,
        }
    }
}

#[derive(Debug)]
enum SessionEnd {
    Cancelled,
    Closed(String),
}

type SharedState = Arc<Mutex<ConnectionState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ConnectionState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    backoff: ReconnectBackoff,
    state: SharedState,
    session: Mutex<Option<CancellationToken>>,
    metrics: Option<Metrics>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, backoff: ReconnectBackoff) -> Self {
        Self {
            transport,
            backoff,
            state: Arc::new(Mutex::new(ConnectionState::default())),
            session: Mutex::new(None),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Snapshot of the current connection state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.state).clone()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    /// Authenticated round trip to the upstream API. Never forces a reconnect.
    pub async fn probe(&self) -> Result<(), TransportError> {
        self.transport.authenticate().await
    }

    /// Keep a session alive until `shutdown` is cancelled.
    pub async fn run(&self, handler: Arc<dyn EventHandler>, shutdown: CancellationToken) {
        log::info!("🔌 Starting Socket Mode connection manager");
        let mut attempts: u64 = 0;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let failures = lock(&self.state).consecutive_failures;
            if failures > 0 {
                let delay = self.backoff.delay(failures);
                log::warn!(
                    "⏳ Reconnecting in {}s (consecutive failures: {})",
                    delay.as_secs(),
                    failures
                );
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            attempts += 1;
            if attempts > 1 {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_reconnect();
                }
            }
            self.set_phase(ConnectionPhase::Handshaking);

            let handshake = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.handshake() => result,
            };
            let stream = match handshake {
                Ok(stream) => stream,
                Err(e) => {
                    log::error!("❌ Handshake failed: {}", e);
                    self.record_failure();
                    continue;
                }
            };

            {
                let mut state = lock(&self.state);
                state.consecutive_failures = 0;
                state.connected = false;
                state.phase = ConnectionPhase::Connected;
            }
            log::info!("✅ Socket Mode session opened");

            let session = self.begin_session(&shutdown);
            let reader = tokio::spawn(read_session(
                stream,
                handler.clone(),
                self.state.clone(),
                session,
                self.metrics.clone(),
            ));
            let outcome = reader.await;

            {
                let mut state = lock(&self.state);
                state.connected = false;
                state.phase = ConnectionPhase::Disconnected;
            }
            if let Some(metrics) = &self.metrics {
                metrics.set_connected(false);
            }

            match outcome {
                Ok(Ok(SessionEnd::Cancelled)) => {}
                Ok(Ok(SessionEnd::Closed(reason))) => {
                    log::info!("🔄 Session closed by server ({}), reconnecting", reason);
                }
                Ok(Err(e)) => {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    log::error!("❌ Session reader failed: {}", e);
                    self.record_failure();
                }
                Err(e) => {
                    log::error!("❌ Session reader task aborted: {}", e);
                    self.record_failure();
                }
            }
        }

        self.end_session();
        self.set_phase(ConnectionPhase::Disconnected);
        log::info!("🛑 Connection manager stopped");
    }

    async fn handshake(&self) -> Result<Box<dyn EventStream>, TransportError> {
        self.transport.authenticate().await?;
        self.transport.open_session().await
    }

    fn set_phase(&self, phase: ConnectionPhase) {
        lock(&self.state).phase = phase;
    }

    fn record_failure(&self) {
        let mut state = lock(&self.state);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.connected = false;
        state.phase = ConnectionPhase::Disconnected;
    }

    /// Cancel the previous session scope (if any) and register a fresh child.
    fn begin_session(&self, shutdown: &CancellationToken) -> CancellationToken {
        let token = shutdown.child_token();
        let mut slot = match self.session.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = slot.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    fn end_session(&self) {
        let mut slot = match self.session.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
    }
}

async fn read_session(
    mut stream: Box<dyn EventStream>,
    handler: Arc<dyn EventHandler>,
    state: SharedState,
    token: CancellationToken,
    metrics: Option<Metrics>,
) -> Result<SessionEnd, TransportError> {
    loop {
        let next = tokio::select! {
            _ = token.cancelled() => return Ok(SessionEnd::Cancelled),
            next = stream.next_event() => next?,
        };
        let event = match next {
            Some(event) => event,
            None => return Ok(SessionEnd::Closed("socket closed".to_string())),
        };

        lock(&state).last_activity_at = Some(Utc::now());

        let disconnect = match &event {
            SocketEvent::Hello => {
                lock(&state).connected = true;
                if let Some(metrics) = &metrics {
                    metrics.set_connected(true);
                }
                log::info!("👋 Socket Mode hello received, connection live");
                None
            }
            SocketEvent::Disconnect { reason } => Some(reason.clone()),
            _ => None,
        };

        handler.handle(event).await;

        if let Some(reason) = disconnect {
            return Ok(SessionEnd::Closed(reason));
        }
    }
}
