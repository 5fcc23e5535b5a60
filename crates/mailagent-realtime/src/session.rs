//! Realtime session manager.
//!
//! One logical WebSocket per session. A background I/O task per connection
//! selects over an outbound command channel and the inbound frame stream;
//! replies are routed to their caller through the [`PendingTable`].
//!
//! Connection attempts are memoized: while one is in flight every
//! `ensure_connected` caller awaits the same shared readiness future and
//! sees the same outcome. When an open socket drops, in-flight requests
//! fail with [`RealtimeError::ConnectionClosed`] and, if configured, a
//! supervisor reconnects with exponential backoff.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::{SinkExt, StreamExt};
use mailagent_auth::{LoginRedirect, TokenStore};
use mailagent_core::{
    ChatResponse, EmailResponse, InboundFrame, OutboundFrame, RequestId, RetryConfig,
};
use mailagent_settings::ClientSettings;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::errors::RealtimeError;
use crate::options::{ReconnectMode, RequestOptions, SessionConfig};
use crate::pending::{PendingGuard, PendingTable, ReplyTx};
use crate::state::ConnectionState;
use crate::transport::{Connection, Transport, TransportError, WsTransport};

/// Queued frames per connection before senders wait.
const OUTBOUND_CAPACITY: usize = 64;

/// Outcome of one connection attempt, shared by all its waiters.
type Ready = Shared<BoxFuture<'static, Result<(), RealtimeError>>>;

/// A request handed to the I/O task.
struct Outgoing {
    id: RequestId,
    text: String,
    reply: ReplyTx,
}

enum Link {
    Idle,
    Connecting(Ready),
    Open {
        generation: u64,
        outbound: mpsc::Sender<Outgoing>,
    },
}

/// Handle to the realtime backend.
///
/// Built once at startup and shared by reference (or `Arc`). Dropping the
/// handle shuts the session down.
pub struct RealtimeSession {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    login: LoginRedirect,
    state: watch::Sender<ConnectionState>,
    link: Mutex<Link>,
    pending: Arc<PendingTable>,
    generation: AtomicU64,
    reconnecting: AtomicBool,
    shutdown: CancellationToken,
}

impl RealtimeSession {
    /// Create a session. No socket is opened until the first request or
    /// [`ensure_connected`](Self::ensure_connected).
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenStore>,
        login: LoginRedirect,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Unconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                tokens,
                login,
                state,
                link: Mutex::new(Link::Idle),
                pending: Arc::new(PendingTable::new()),
                generation: AtomicU64::new(0),
                reconnecting: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Create a WebSocket-backed session from client settings.
    pub fn from_settings(
        settings: &ClientSettings,
        tokens: Arc<dyn TokenStore>,
        login: LoginRedirect,
    ) -> Self {
        Self::new(
            SessionConfig::from_settings(settings),
            Arc::new(WsTransport),
            tokens,
            login,
        )
    }

    /// Open the socket if needed.
    ///
    /// Returns immediately when open. Joins the attempt in flight if there
    /// is one, otherwise starts a new attempt.
    pub async fn ensure_connected(&self) -> Result<(), RealtimeError> {
        self.inner.ensure_connected().await
    }

    /// Whether a socket is open right now.
    pub fn is_connected(&self) -> bool {
        self.inner.is_open()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Watch connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Number of requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Close the socket and fail everything in flight with
    /// [`RealtimeError::Shutdown`].
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!("realtime session shutting down");
            self.inner.shutdown.cancel();
        }
    }

    /// Send a chat message.
    pub async fn send_chat(
        &self,
        message: &str,
        tone: Option<&str>,
    ) -> Result<ChatResponse, RealtimeError> {
        self.send_chat_with(message, tone, RequestOptions::default())
            .await
    }

    /// Send a chat message with per-request options.
    #[tracing::instrument(skip_all, fields(kind = "chat"))]
    pub async fn send_chat_with(
        &self,
        message: &str,
        tone: Option<&str>,
        opts: RequestOptions,
    ) -> Result<ChatResponse, RealtimeError> {
        let frame = OutboundFrame::chat(message, tone);
        self.request(frame, opts)
            .await
            .map(InboundFrame::into_chat_response)
    }

    /// Ask the backend to draft an email.
    ///
    /// Generation failures come back as `success: false`, not as errors.
    pub async fn generate_email(
        &self,
        receiver_email: &str,
        prompt: &str,
        tone: Option<&str>,
    ) -> Result<EmailResponse, RealtimeError> {
        self.generate_email_with(receiver_email, prompt, tone, RequestOptions::default())
            .await
    }

    /// Draft an email with per-request options.
    #[tracing::instrument(skip_all, fields(kind = "email"))]
    pub async fn generate_email_with(
        &self,
        receiver_email: &str,
        prompt: &str,
        tone: Option<&str>,
        opts: RequestOptions,
    ) -> Result<EmailResponse, RealtimeError> {
        let frame = OutboundFrame::email(receiver_email, prompt, tone);
        self.request(frame, opts)
            .await
            .map(InboundFrame::into_email_response)
    }

    async fn request(
        &self,
        frame: OutboundFrame,
        opts: RequestOptions,
    ) -> Result<InboundFrame, RealtimeError> {
        let kind = frame.kind;
        let timeout = opts.timeout.unwrap_or(self.inner.config.request_timeout);
        let cancel = opts.cancel.unwrap_or_default();

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RealtimeError::Cancelled),
            () = self.inner.shutdown.cancelled() => Err(RealtimeError::Shutdown),
            res = tokio::time::timeout(timeout, self.inner.exchange(frame, opts.reconnect)) => {
                res.unwrap_or_else(|_| Err(RealtimeError::Timeout { timeout_ms: millis(timeout) }))
            }
        };

        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.category().as_str(),
        };
        counter!("realtime_requests_total", "type" => kind.as_str(), "outcome" => label)
            .increment(1);
        if let Err(e) = &outcome {
            debug!(kind = kind.as_str(), error = %e, "request failed");
        }
        outcome
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl std::fmt::Debug for RealtimeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSession")
            .field("url", &self.inner.config.url)
            .field("state", &*self.inner.state.borrow())
            .field("pending", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}

// ─── Connection lifecycle ───────────────────────────────────────────────────

impl Inner {
    fn is_open(&self) -> bool {
        matches!(*self.link.lock(), Link::Open { .. })
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next.clone());
        if prev != next {
            debug!(from = %prev, to = %next, "connection state changed");
        }
    }

    fn outbound(&self) -> Option<mpsc::Sender<Outgoing>> {
        match &*self.link.lock() {
            Link::Open { outbound, .. } => Some(outbound.clone()),
            _ => None,
        }
    }

    async fn ensure_connected(self: &Arc<Self>) -> Result<(), RealtimeError> {
        let ready = {
            let mut link = self.link.lock();
            match &*link {
                Link::Open { .. } => return Ok(()),
                Link::Connecting(ready) => ready.clone(),
                Link::Idle => {
                    if self.shutdown.is_cancelled() {
                        return Err(RealtimeError::Shutdown);
                    }
                    let ready = self.start_connect();
                    *link = Link::Connecting(ready.clone());
                    ready
                }
            }
        };
        ready.await
    }

    /// Spawn one attempt and return its shared outcome.
    fn start_connect(self: &Arc<Self>) -> Ready {
        self.set_state(ConnectionState::Connecting);
        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(self);
        let _ = tokio::spawn(async move {
            let _ = tx.send(inner.connect().await);
        });
        async move { rx.await.unwrap_or(Err(RealtimeError::Shutdown)) }
            .boxed()
            .shared()
    }

    async fn connect(self: Arc<Self>) -> Result<(), RealtimeError> {
        let url = self.config.url.as_str();
        let connect_timeout = self.config.connect_timeout;

        let attempt = tokio::select! {
            () = self.shutdown.cancelled() => Err(RealtimeError::Shutdown),
            res = tokio::time::timeout(connect_timeout, self.transport.connect(url)) => match res {
                Ok(Ok(conn)) => Ok(conn),
                Ok(Err(e)) => Err(RealtimeError::Connect(e.to_string())),
                Err(_) => Err(RealtimeError::Connect(format!(
                    "handshake timed out after {}ms",
                    millis(connect_timeout)
                ))),
            },
        };

        let conn = match attempt {
            Ok(conn) => conn,
            Err(e) => {
                *self.link.lock() = Link::Idle;
                if e == RealtimeError::Shutdown {
                    self.set_state(ConnectionState::Closed);
                } else {
                    warn!(url, error = %e, "realtime connection failed");
                    self.set_state(ConnectionState::Errored {
                        reason: e.to_string(),
                    });
                }
                return Err(e);
            }
        };

        let (outbound, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut link = self.link.lock();
            if self.shutdown.is_cancelled() {
                *link = Link::Idle;
                drop(link);
                self.set_state(ConnectionState::Closed);
                return Err(RealtimeError::Shutdown);
            }
            *link = Link::Open {
                generation,
                outbound,
            };
        }
        self.set_state(ConnectionState::Open);
        info!(url, generation, "realtime connection open");

        let inner = Arc::clone(&self);
        let _ = tokio::spawn(inner.io_loop(conn, out_rx, generation));
        Ok(())
    }

    /// Pump frames until the socket closes or the session shuts down.
    async fn io_loop(
        self: Arc<Self>,
        conn: Connection,
        mut out_rx: mpsc::Receiver<Outgoing>,
        generation: u64,
    ) {
        let Connection {
            mut sink,
            mut stream,
        } = conn;

        let failure = loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    let _ = sink.close().await;
                    break None;
                }
                cmd = out_rx.recv() => {
                    let Some(Outgoing { id, text, reply }) = cmd else { break None };
                    // Caller already gave up.
                    if reply.is_closed() {
                        continue;
                    }
                    self.pending.insert(id.clone(), reply);
                    if let Err(e) = sink.send(text).await {
                        break Some(e.to_string());
                    }
                    trace!(request_id = %id, "frame written");
                }
                msg = stream.next() => match msg {
                    Some(Ok(text)) => self.dispatch(&text),
                    Some(Err(TransportError::Malformed(reason))) => self.reject(None, reason),
                    Some(Err(TransportError::Closed)) | None => break None,
                    Some(Err(e)) => break Some(e.to_string()),
                },
            }
        };

        // Queued requests see their reply channel dropped.
        drop(out_rx);
        drop(sink);
        drop(stream);
        self.on_link_closed(generation, failure);
    }

    fn dispatch(&self, text: &str) {
        match InboundFrame::parse(text) {
            Ok(frame) => {
                let request_id = frame.request_id.clone();
                if !self.pending.resolve(frame) {
                    debug!(?request_id, "reply has no pending request, dropping");
                }
            }
            Err(e) => self.reject(e.request_id.as_ref(), e.message),
        }
    }

    /// Fail the request an undecodable frame belongs to, or the oldest one
    /// when it carries no usable ID. The connection stays up.
    fn reject(&self, request_id: Option<&RequestId>, reason: String) {
        warn!(?request_id, error = %reason, "malformed frame");
        if !self.pending.fail(request_id, RealtimeError::Decode(reason)) {
            debug!("malformed frame could not be attributed, dropping");
        }
    }

    fn on_link_closed(self: &Arc<Self>, generation: u64, failure: Option<String>) {
        let shutting_down = self.shutdown.is_cancelled();
        let err = if shutting_down {
            RealtimeError::Shutdown
        } else {
            RealtimeError::ConnectionClosed
        };
        // Fail before leaving `Open` so a newer connection's slots are never hit.
        let failed = self.pending.fail_all(&err);
        {
            let mut link = self.link.lock();
            if matches!(&*link, Link::Open { generation: g, .. } if *g == generation) {
                *link = Link::Idle;
            }
        }
        self.set_state(ConnectionState::Closed);

        match failure {
            Some(reason) => warn!(generation, failed, %reason, "realtime connection lost"),
            None => info!(generation, failed, "realtime connection closed"),
        }

        if shutting_down {
            return;
        }
        if let Some(policy) = self.config.reconnect.clone() {
            self.spawn_supervisor(policy);
        }
    }

    // ─── Reconnect supervisor ───────────────────────────────────────────

    fn spawn_supervisor(self: &Arc<Self>, policy: RetryConfig) {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(self);
        let _ = tokio::spawn(inner.supervise(policy));
    }

    async fn supervise(self: Arc<Self>, policy: RetryConfig) {
        let mut attempt = 0;
        while attempt < policy.max_retries {
            let delay_ms = policy.delay_ms(attempt, rand::random::<f64>());
            debug!(attempt, delay_ms, "reconnect scheduled");
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }

            counter!("realtime_reconnects_total").increment(1);
            match self.ensure_connected().await {
                Ok(()) => {
                    info!(attempt, "realtime connection re-established");
                    self.reconnecting.store(false, Ordering::SeqCst);
                    // A drop between the open and the reset above skipped its supervisor.
                    if self.is_open()
                        || self.shutdown.is_cancelled()
                        || self.reconnecting.swap(true, Ordering::SeqCst)
                    {
                        return;
                    }
                    attempt = 0;
                    continue;
                }
                Err(RealtimeError::Shutdown) => break,
                Err(e) => warn!(attempt, error = %e, "reconnect attempt failed"),
            }
            attempt += 1;
        }

        self.reconnecting.store(false, Ordering::SeqCst);
        let idle = matches!(*self.link.lock(), Link::Idle);
        if idle && !self.shutdown.is_cancelled() {
            warn!(attempts = policy.max_retries, "giving up on reconnect");
            self.set_state(ConnectionState::Errored {
                reason: "reconnect attempts exhausted".into(),
            });
        }
    }

    // ─── Requests ───────────────────────────────────────────────────────

    async fn ready_for(self: &Arc<Self>, mode: ReconnectMode) -> Result<(), RealtimeError> {
        match mode {
            ReconnectMode::FailFast => {
                let ready = match &*self.link.lock() {
                    Link::Open { .. } => return Ok(()),
                    Link::Connecting(ready) => ready.clone(),
                    Link::Idle => return Err(RealtimeError::NotConnected),
                };
                ready.await
            }
            ReconnectMode::WaitForReconnect => {
                let mut states = self.state.subscribe();
                while self.reconnecting.load(Ordering::SeqCst) && !self.is_open() {
                    if states.changed().await.is_err() {
                        return Err(RealtimeError::Shutdown);
                    }
                }
                self.ensure_connected().await
            }
        }
    }

    async fn exchange(
        self: &Arc<Self>,
        frame: OutboundFrame,
        mode: ReconnectMode,
    ) -> Result<InboundFrame, RealtimeError> {
        self.ready_for(mode).await?;

        let frame = frame.with_token(self.tokens.token());
        let kind = frame.kind;
        let id = frame.request_id.clone();
        let text = frame
            .to_json()
            .map_err(|e| RealtimeError::Encode(e.to_string()))?;

        let outbound = self.outbound().ok_or(RealtimeError::ConnectionClosed)?;
        let (reply, reply_rx) = oneshot::channel();
        let _slot = PendingGuard::new(&self.pending, id.clone());
        outbound
            .send(Outgoing {
                id: id.clone(),
                text,
                reply,
            })
            .await
            .map_err(|_| RealtimeError::ConnectionClosed)?;
        debug!(request_id = %id, kind = kind.as_str(), "request sent");

        let reply = reply_rx
            .await
            .map_err(|_| RealtimeError::ConnectionClosed)??;
        if reply.is_unauthorized() {
            self.login.trigger("realtime");
            return Err(RealtimeError::Unauthorized);
        }
        Ok(reply)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
