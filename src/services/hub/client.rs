use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, info, trace, warn};

use super::errors::HubError;
use super::protocol::{self, HubMessage};
use super::transport::{HubConnector, HubTransport};
use crate::config::ReconnectPolicy;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

pub type EventHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// Process-wide client for the appointment hub.
///
/// Cheap to clone; every clone drives the same connection. Handlers are kept
/// on the client rather than on a transport, so a reconnect does not lose
/// them.
#[derive(Clone)]
pub struct HubClient {
    inner: Arc<HubInner>,
}

struct HubInner {
    url: String,
    connector: Arc<dyn HubConnector>,
    policy: ReconnectPolicy,
    // keyed by lowercased event name; hub method names are case-insensitive
    handlers: DashMap<String, Vec<(HandlerId, EventHandler)>>,
    next_handler: AtomicU64,
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
    // set before `Connected` is published, cleared when the link ends
    outgoing: std::sync::Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending: DashMap<String, oneshot::Sender<Result<Value, String>>>,
    next_invocation: AtomicU64,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

enum DriveOutcome {
    Shutdown,
    Lost(String),
    ServerClosed {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

impl HubClient {
    pub fn new(url: impl Into<String>, connector: Arc<dyn HubConnector>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(HubInner {
                url: url.into(),
                connector,
                policy,
                handlers: DashMap::new(),
                next_handler: AtomicU64::new(1),
                state,
                attempts: AtomicU32::new(0),
                outgoing: std::sync::Mutex::new(None),
                pending: DashMap::new(),
                next_invocation: AtomicU64::new(1),
                shutdown: Mutex::new(None),
                supervisor: Mutex::new(None),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Failed connection attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Opens the connection and keeps it open until [`HubClient::stop`].
    ///
    /// Returns the outcome of the first attempt; on failure the client keeps
    /// retrying in the background. Calling this while a connection is live or
    /// being established does nothing.
    pub async fn start_connection(&self) -> Result<(), HubError> {
        // Held until the supervisor is registered, so a concurrent `stop`
        // either runs first or finds something to stop.
        let mut shutdown_slot = self.inner.shutdown.lock().await;
        let claimed = self.inner.state.send_if_modified(|state| match state {
            ConnectionState::Disconnected | ConnectionState::Closed => {
                *state = ConnectionState::Connecting;
                true
            }
            _ => false,
        });
        if !claimed {
            debug!(state = ?self.state(), "hub connection already started");
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *shutdown_slot = Some(shutdown_tx);

        let (first_tx, first_rx) = oneshot::channel();
        let handle = tokio::spawn(supervise(self.inner.clone(), shutdown_rx, first_tx));
        *self.inner.supervisor.lock().await = Some(handle);
        drop(shutdown_slot);

        first_rx
            .await
            .unwrap_or_else(|_| Err(HubError::Closed("hub stopped before connecting".into())))
    }

    /// Closes the connection and stops reconnecting.
    pub async fn stop(&self) {
        if let Some(shutdown) = self.inner.shutdown.lock().await.take() {
            let _ = shutdown.send(true);
        }
        if let Some(handle) = self.inner.supervisor.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "hub supervisor task failed");
            }
        }
        self.inner.state.send_replace(ConnectionState::Closed);
        info!(url = %self.inner.url, "hub connection closed");
    }

    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.next_handler.fetch_add(1, Ordering::SeqCst));
        self.inner
            .handlers
            .entry(event.to_lowercase())
            .or_default()
            .push((id, Arc::new(handler)));
        debug!(event, ?id, "hub handler registered");
        id
    }

    /// Removes one handler. Returns whether it was registered.
    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        let key = event.to_lowercase();
        let removed = match self.inner.handlers.get_mut(&key) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|(handler_id, _)| *handler_id != id);
                entry.len() != before
            }
            None => false,
        };
        self.inner.handlers.remove_if(&key, |_, handlers| handlers.is_empty());
        if removed {
            debug!(event, ?id, "hub handler removed");
        }
        removed
    }

    /// Registers `handler` for as long as the returned guard lives.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let id = self.on(event, handler);
        Subscription {
            hub: self.clone(),
            event: event.to_string(),
            id,
        }
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.inner
            .handlers
            .get(&event.to_lowercase())
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Calls a hub method and waits for its completion.
    ///
    /// Nothing is sent unless the connection is up. Every failure, including
    /// a server-side error, is logged and reported as `None`.
    pub async fn invoke(&self, method: &str, arguments: Vec<Value>) -> Option<Value> {
        let state = self.state();
        if state != ConnectionState::Connected {
            warn!(method, ?state, "hub not connected; invocation dropped");
            return None;
        }

        let invocation_id = self
            .inner
            .next_invocation
            .fetch_add(1, Ordering::SeqCst)
            .to_string();
        let frame = protocol::encode(&HubMessage::Invocation {
            invocation_id: Some(invocation_id.clone()),
            target: method.to_string(),
            arguments,
        });

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(invocation_id.clone(), tx);
        if !self.inner.send_outgoing(frame) {
            self.inner.pending.remove(&invocation_id);
            warn!(method, "hub connection went away; invocation dropped");
            return None;
        }

        match rx.await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(error)) => {
                warn!(method, %error, "hub invocation failed");
                None
            }
            Err(_) => {
                warn!(method, "hub connection lost before invocation completed");
                None
            }
        }
    }
}

/// Keeps a handler registered until dropped.
#[must_use = "the handler is removed when the subscription is dropped"]
pub struct Subscription {
    hub: HubClient,
    event: String,
    id: HandlerId,
}

impl Subscription {
    pub fn id(&self) -> HandlerId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.off(&self.event, self.id);
    }
}

async fn supervise(
    inner: Arc<HubInner>,
    mut shutdown: watch::Receiver<bool>,
    first: oneshot::Sender<Result<(), HubError>>,
) {
    let _exit = SupervisorExit(&inner);
    let mut first = Some(first);
    loop {
        if *shutdown.borrow() {
            break;
        }

        match inner.open().await {
            Ok((mut transport, leftover)) => {
                if *shutdown.borrow() {
                    transport.close().await;
                    break;
                }
                let (tx, rx) = mpsc::unbounded_channel();
                inner.set_outgoing(Some(tx));
                inner.attempts.store(0, Ordering::SeqCst);
                inner.state.send_replace(ConnectionState::Connected);
                info!(url = %inner.url, "hub connected");
                if let Some(first) = first.take() {
                    let _ = first.send(Ok(()));
                }

                let outcome = inner.drive(transport, rx, &leftover, &mut shutdown).await;
                inner.set_outgoing(None);
                // dropping the senders wakes every waiting invoke
                inner.pending.clear();

                match outcome {
                    DriveOutcome::Shutdown => break,
                    DriveOutcome::ServerClosed {
                        error,
                        allow_reconnect: false,
                    } => {
                        warn!(url = %inner.url, ?error, "hub closed by server");
                        break;
                    }
                    DriveOutcome::ServerClosed { error, .. } => {
                        warn!(url = %inner.url, ?error, "hub closed by server; reconnecting");
                    }
                    DriveOutcome::Lost(reason) => {
                        warn!(url = %inner.url, %reason, "hub connection lost; reconnecting");
                    }
                }
                inner.state.send_replace(ConnectionState::Reconnecting);
                // a peer that accepts and drops at once must not spin the loop
                if !pause(inner.policy.delay_for(1), &mut shutdown).await {
                    break;
                }
            }
            Err(err) => {
                let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let delay = inner.policy.delay_for(attempt);
                warn!(
                    url = %inner.url,
                    error = %err,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    "hub connection attempt failed"
                );
                if let Some(first) = first.take() {
                    let _ = first.send(Err(err));
                }
                if !pause(delay, &mut shutdown).await {
                    break;
                }
            }
        }
    }
}

/// Resets the shared connection state however the supervisor ends, a panic
/// included.
struct SupervisorExit<'a>(&'a HubInner);

impl Drop for SupervisorExit<'_> {
    fn drop(&mut self) {
        self.0.set_outgoing(None);
        self.0.pending.clear();
        self.0.state.send_replace(ConnectionState::Closed);
    }
}

/// Sleeps for `delay`. Returns `false` if a stop was requested meanwhile.
async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.changed() => false,
    }
}

impl HubInner {
    fn set_outgoing(&self, sender: Option<mpsc::UnboundedSender<String>>) {
        *self.outgoing.lock().unwrap_or_else(PoisonError::into_inner) = sender;
    }

    /// Queues a frame on the live link. `false` when there is none.
    fn send_outgoing(&self, frame: String) -> bool {
        match self
            .outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(sender) => sender.send(frame).is_ok(),
            None => false,
        }
    }

    /// Connects and completes the handshake. Returns the transport and any
    /// records that arrived together with the handshake response.
    async fn open(&self) -> Result<(Box<dyn HubTransport>, String), HubError> {
        let mut transport = self.connector.connect(&self.url).await?;
        transport.send(protocol::handshake_request()).await?;
        let reply = match timeout(HANDSHAKE_TIMEOUT, transport.recv()).await {
            Ok(Some(reply)) => reply?,
            Ok(None) => return Err(HubError::Handshake("connection closed during handshake".into())),
            Err(_) => return Err(HubError::Handshake("timed out waiting for handshake".into())),
        };
        let leftover = protocol::parse_handshake_response(&reply)?.to_string();
        Ok((transport, leftover))
    }

    async fn drive(
        &self,
        mut transport: Box<dyn HubTransport>,
        mut rx: mpsc::UnboundedReceiver<String>,
        leftover: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> DriveOutcome {
        if let Some(outcome) = self.dispatch_frame(leftover) {
            transport.close().await;
            return outcome;
        }

        let mut keepalive = interval_at(Instant::now() + KEEPALIVE_INTERVAL, KEEPALIVE_INTERVAL);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let close = protocol::encode(&HubMessage::Close { error: None, allow_reconnect: false });
                    let _ = transport.send(close).await;
                    transport.close().await;
                    return DriveOutcome::Shutdown;
                }
                Some(frame) = rx.recv() => {
                    if let Err(err) = transport.send(frame).await {
                        return DriveOutcome::Lost(err.to_string());
                    }
                }
                incoming = transport.recv() => match incoming {
                    None => return DriveOutcome::Lost("connection closed by peer".into()),
                    Some(Err(err)) => return DriveOutcome::Lost(err.to_string()),
                    Some(Ok(text)) => {
                        if let Some(outcome) = self.dispatch_frame(&text) {
                            transport.close().await;
                            return outcome;
                        }
                    }
                },
                _ = keepalive.tick() => {
                    if let Err(err) = transport.send(protocol::encode(&HubMessage::Ping)).await {
                        return DriveOutcome::Lost(err.to_string());
                    }
                }
            }
        }
    }

    /// Routes every record in one frame. Returns an outcome when the server
    /// asked to close.
    fn dispatch_frame(&self, text: &str) -> Option<DriveOutcome> {
        for record in protocol::parse_records(text) {
            match record {
                Ok(HubMessage::Invocation {
                    target, arguments, ..
                }) => self.dispatch_event(&target, &arguments),
                Ok(HubMessage::Completion {
                    invocation_id,
                    result,
                    error,
                }) => match self.pending.remove(&invocation_id) {
                    Some((_, waiter)) => {
                        let outcome = match error {
                            Some(error) => Err(error),
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        let _ = waiter.send(outcome);
                    }
                    None => debug!(%invocation_id, "completion for unknown invocation"),
                },
                Ok(HubMessage::Ping) => trace!("hub ping"),
                Ok(HubMessage::Close {
                    error,
                    allow_reconnect,
                }) => {
                    return Some(DriveOutcome::ServerClosed {
                        error,
                        allow_reconnect,
                    })
                }
                Ok(HubMessage::Unsupported(kind)) => debug!(kind, "ignoring hub message"),
                Err(err) => warn!(error = %err, "dropping malformed hub record"),
            }
        }
        None
    }

    fn dispatch_event(&self, target: &str, arguments: &[Value]) {
        // clone out so handlers may register or remove handlers themselves
        let handlers: Vec<EventHandler> = match self.handlers.get(&target.to_lowercase()) {
            Some(entry) => entry.iter().map(|(_, handler)| handler.clone()).collect(),
            None => {
                debug!(target, "no handler for hub event");
                return;
            }
        };
        debug!(target, handlers = handlers.len(), "dispatching hub event");
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(arguments))).is_err() {
                warn!(target, "hub event handler panicked");
            }
        }
    }
}
