// ── Streaming client ──
//
// One WebSocket connection, one background receive task. The caller keeps a
// cheap `Clone` handle; the receive task holds its own `Arc` to the shared
// state and exits when the transport ends or the cancellation token fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, OnceCell, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec;
use super::handler::{Handler, InvalidFrame, Registry};
use super::messages::{Acknowledgement, RapidWind, WebsocketMessage};
use super::request::Request;
use super::types::MessageKind;
use crate::error::Error;
use crate::transport::WebsocketConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

// ── ConnectionState ──────────────────────────────────────────────────

/// Lifecycle of a [`WebsocketClient`], published through a `watch` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// Never connected, or the transport ended on its own.
    Disconnected,
    /// Opening handshake in progress.
    Connecting,
    /// Transport open, receive loop running.
    Connected,
    /// `close()` is tearing down.
    Closing,
    /// Teardown finished. Terminal.
    Closed,
}

// ── Shared state ─────────────────────────────────────────────────────

struct PendingAck {
    request_id: String,
    tx: oneshot::Sender<Acknowledgement>,
}

/// Close frame sent by the server, kept until the next successful connect.
#[derive(Debug, Clone)]
struct RemoteClose {
    code: u16,
    reason: String,
}

struct Inner {
    config: WebsocketConfig,
    registry: Registry,
    last_seen: DashMap<MessageKind, WebsocketMessage>,
    writer: Mutex<Option<WsSink>>,
    pending_ack: Mutex<Option<PendingAck>>,
    listen_task: Mutex<Option<JoinHandle<()>>>,
    state: watch::Sender<ConnectionState>,
    listening: AtomicBool,
    closing: AtomicBool,
    remote_close: std::sync::Mutex<Option<RemoteClose>>,
    cancel: CancellationToken,
    closed: OnceCell<()>,
}

// ── WebsocketClient ──────────────────────────────────────────────────

/// Client for the WeatherFlow streaming WebSocket.
///
/// Decoded frames are dispatched to handlers registered per
/// [`MessageKind`]; the most recent frame of each kind is also cached and
/// available through [`latest`](Self::latest).
///
/// ```rust,ignore
/// use weatherflow_api::{DeviceId, MessageKind, WebsocketClient, WebsocketConfig};
///
/// let config = WebsocketConfig::new(token).with_device(DeviceId::new(211_522));
/// let client = WebsocketClient::new(config)?;
/// client.on(MessageKind::RapidWind, |msg| println!("{msg:?}"));
/// client.connect().await?;
/// client.subscribe_all().await?;
/// // ...
/// client.close().await;
/// ```
#[derive(Clone)]
pub struct WebsocketClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for WebsocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebsocketClient")
            .field("endpoint", &self.inner.config.redacted_endpoint())
            .field("devices", &self.inner.config.devices)
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl WebsocketClient {
    /// Build a client. Fails fast on a missing token or bad endpoint; no I/O.
    pub fn new(config: WebsocketConfig) -> Result<Self, Error> {
        config.validate()?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                registry: Registry::default(),
                last_seen: DashMap::new(),
                writer: Mutex::new(None),
                pending_ack: Mutex::new(None),
                listen_task: Mutex::new(None),
                state,
                listening: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                remote_close: std::sync::Mutex::new(None),
                cancel: CancellationToken::new(),
                closed: OnceCell::new(),
            }),
        })
    }

    pub fn config(&self) -> &WebsocketConfig {
        &self.inner.config
    }

    // ── Connection ───────────────────────────────────────────────────

    /// Open the transport and start the receive loop.
    ///
    /// No internal retry. A client whose transport dropped may connect
    /// again; a closed client may not.
    pub async fn connect(&self) -> Result<(), Error> {
        let inner = &self.inner;
        if inner.closing.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }

        let mut writer = inner.writer.lock().await;
        if writer.is_some() && inner.listening.load(Ordering::SeqCst) {
            return Err(Error::AlreadyConnected);
        }

        let url = inner.config.connect_url()?;
        let endpoint = inner.config.redacted_endpoint();
        if !inner.transition(ConnectionState::Disconnected, ConnectionState::Connecting) {
            // Closing or Closed: teardown owns the state from here.
            return Err(Error::Closed);
        }
        tracing::info!(endpoint = %endpoint, "Connecting to WebSocket");

        let handshake = tokio_tungstenite::connect_async(url.as_str());
        let stream = match tokio::time::timeout(inner.config.connect_timeout, handshake).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                inner.transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                return Err(Error::WebSocketConnect(e.to_string()));
            }
            Err(_) => {
                inner.transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                return Err(Error::WebSocketConnect(format!(
                    "handshake timed out after {}ms",
                    millis(inner.config.connect_timeout)
                )));
            }
        };

        // `close()` may have started during the handshake.
        if inner.closing.load(Ordering::SeqCst)
            || !inner.transition(ConnectionState::Connecting, ConnectionState::Connected)
        {
            tracing::debug!(endpoint = %endpoint, "Client closed during handshake, dropping connection");
            let mut stream = stream;
            let _ = tokio::time::timeout(inner.config.close_step_timeout, stream.close(None)).await;
            return Err(Error::Closed);
        }

        let (sink, source) = stream.split();
        *writer = Some(sink);
        inner.listening.store(true, Ordering::SeqCst);
        inner.set_remote_close(None);
        tracing::info!(endpoint = %endpoint, "WebSocket connected");

        // Store the task before releasing the writer so teardown always
        // finds it to join.
        let handle = tokio::spawn(receive_loop(Arc::clone(inner), source));
        *inner.listen_task.lock().await = Some(handle);
        drop(writer);
        Ok(())
    }

    /// Transport open and no close in progress.
    pub fn is_connected(&self) -> bool {
        *self.inner.state.borrow() == ConnectionState::Connected
    }

    /// Whether the receive loop is running.
    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::SeqCst)
    }

    /// Subscribe to lifecycle changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    // ── Sending ──────────────────────────────────────────────────────

    /// Send one request. Fails with [`Error::NotConnected`] unless connected,
    /// or [`Error::WebSocketClosed`] once the server has closed the stream.
    pub async fn send(&self, request: &Request) -> Result<(), Error> {
        self.ensure_connected()?;
        tracing::debug!(kind = request.type_name(), id = request.id(), "Sending request");
        self.inner.write(codec::encode(request)).await
    }

    /// Send a pre-encoded text frame.
    pub async fn send_raw(&self, text: impl Into<String>) -> Result<(), Error> {
        self.ensure_connected()?;
        self.inner.write(text.into()).await
    }

    /// Send `request` and wait for the next acknowledgement.
    ///
    /// Only one acknowledged request may be outstanding; a second concurrent
    /// call fails with [`Error::AckInFlight`] without sending. On timeout the
    /// frame may still have been delivered.
    pub async fn send_and_await_ack(
        &self,
        request: &Request,
        timeout: Option<Duration>,
    ) -> Result<Acknowledgement, Error> {
        self.ensure_connected()?;
        let timeout = timeout.unwrap_or(self.inner.config.ack_timeout);
        self.inner.correlated_send(request, timeout).await
    }

    /// Start observation and rapid-wind streams for every configured device.
    pub async fn subscribe_all(&self) -> Result<(), Error> {
        for device in &self.inner.config.devices {
            self.send(&Request::listen_start(*device)).await?;
            self.send(&Request::rapid_wind_start(*device)).await?;
        }
        Ok(())
    }

    fn ensure_connected(&self) -> Result<(), Error> {
        if self.is_connected() {
            return Ok(());
        }
        match self.inner.remote_close() {
            Some(close) if !self.inner.closing.load(Ordering::SeqCst) => {
                Err(Error::WebSocketClosed {
                    code: close.code,
                    reason: close.reason,
                })
            }
            _ => Err(Error::NotConnected),
        }
    }

    // ── Handlers ─────────────────────────────────────────────────────

    /// Install `handler` for `kind`, replacing any earlier one.
    pub fn register(&self, kind: MessageKind, handler: Handler<WebsocketMessage>) {
        if self.inner.registry.register(kind, handler).is_some() {
            tracing::debug!(kind = %kind, "Replaced message handler");
        }
    }

    /// Register a plain closure for `kind`.
    pub fn on<F>(&self, kind: MessageKind, f: F)
    where
        F: Fn(WebsocketMessage) + Send + Sync + 'static,
    {
        self.register(kind, Handler::sync(f));
    }

    /// Register a closure returning a future for `kind`; dispatch awaits it.
    pub fn on_async<F, Fut>(&self, kind: MessageKind, f: F)
    where
        F: Fn(WebsocketMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.register(kind, Handler::future(f));
    }

    /// Handler for frames that fail to decode.
    pub fn on_invalid<F>(&self, f: F)
    where
        F: Fn(InvalidFrame) + Send + Sync + 'static,
    {
        self.inner.registry.set_invalid(Handler::sync(f));
    }

    pub fn unregister(&self, kind: MessageKind) -> bool {
        self.inner.registry.unregister(kind).is_some()
    }

    // ── Last-seen cache ──────────────────────────────────────────────

    /// Most recent decoded frame of `kind`.
    pub fn latest(&self, kind: MessageKind) -> Option<WebsocketMessage> {
        self.inner.last_seen.get(&kind).map(|entry| entry.value().clone())
    }

    /// Most recent air, sky, or tempest observation, by epoch.
    pub fn latest_observation(&self) -> Option<WebsocketMessage> {
        [
            MessageKind::ObservationAir,
            MessageKind::ObservationSky,
            MessageKind::ObservationTempest,
        ]
        .into_iter()
        .filter_map(|kind| self.latest(kind))
        .max_by_key(|message| message.observation_epoch().unwrap_or(i64::MIN))
    }

    pub fn latest_rapid_wind(&self) -> Option<RapidWind> {
        match self.latest(MessageKind::RapidWind)? {
            WebsocketMessage::RapidWind(wind) => Some(wind),
            _ => None,
        }
    }

    /// Age of the newest observation, measured from its device epoch.
    pub fn time_since_last_observation(&self) -> Option<chrono::Duration> {
        let epoch = self.latest_observation()?.observation_epoch()?;
        let observed = DateTime::from_timestamp(epoch, 0)?;
        Some(Utc::now() - observed)
    }

    // ── Shutdown ─────────────────────────────────────────────────────

    /// Tear down the client. Safe to call repeatedly or concurrently: the
    /// first call runs the teardown and later calls wait for it.
    ///
    /// Every step is bounded by a timeout; failures are logged and never
    /// stop later steps.
    pub async fn close(&self) {
        self.inner.closed.get_or_init(|| self.inner.teardown()).await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.initialized()
    }
}

// ── Inner: transport & correlation ───────────────────────────────────

impl Inner {
    /// Move `from` -> `to`; any other current state is left alone.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    fn remote_close(&self) -> Option<RemoteClose> {
        self.remote_close
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_remote_close(&self, close: Option<RemoteClose>) {
        *self.remote_close.lock().unwrap_or_else(PoisonError::into_inner) = close;
    }

    /// Write one text frame, bounded by `send_timeout` including the wait
    /// for the sink. Does not look at the lifecycle state, only at whether a
    /// sink is present; teardown relies on that.
    async fn write(&self, text: String) -> Result<(), Error> {
        let bound = self.config.send_timeout;
        let send = async {
            let mut writer = self.writer.lock().await;
            let sink = writer.as_mut().ok_or(Error::NotConnected)?;
            sink.send(Message::text(text))
                .await
                .map_err(|e| Error::Transport(e.to_string()))
        };
        match tokio::time::timeout(bound, send).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = millis(bound), "WebSocket write timed out");
                Err(Error::SendTimeout {
                    timeout_ms: millis(bound),
                })
            }
        }
    }

    async fn correlated_send(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Acknowledgement, Error> {
        let request_id = request.id().to_owned();

        let rx = {
            let mut slot = self.pending_ack.lock().await;
            if let Some(pending) = slot.as_ref() {
                if !pending.tx.is_closed() {
                    return Err(Error::AckInFlight {
                        request_id: pending.request_id.clone(),
                    });
                }
            }
            let (tx, rx) = oneshot::channel();
            *slot = Some(PendingAck {
                request_id: request_id.clone(),
                tx,
            });
            rx
        };

        tracing::debug!(kind = request.type_name(), id = %request_id, "Sending request, awaiting ack");
        if let Err(e) = self.write(codec::encode(request)).await {
            self.clear_pending(&request_id).await;
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(_)) => Err(Error::AckAbandoned { request_id }),
            Err(_) => {
                self.clear_pending(&request_id).await;
                tracing::warn!(id = %request_id, timeout_ms = millis(timeout), "Acknowledgement timed out");
                Err(Error::AckTimeout {
                    request_id,
                    timeout_ms: millis(timeout),
                })
            }
        }
    }

    async fn clear_pending(&self, request_id: &str) {
        let mut slot = self.pending_ack.lock().await;
        if slot.as_ref().is_some_and(|p| p.request_id == request_id) {
            *slot = None;
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    async fn handle_text(&self, text: &str) {
        match codec::decode(text) {
            Ok(message) => self.dispatch(message).await,
            Err(error) => {
                if let Some(handler) = self.registry.invalid() {
                    handler
                        .invoke(InvalidFrame {
                            raw: text.to_owned(),
                            reason: error.to_string(),
                        })
                        .await;
                } else {
                    tracing::warn!(error = %error, "Dropping undecodable frame");
                }
            }
        }
    }

    /// Cache, then either resolve the pending ack or call the handler.
    async fn dispatch(&self, message: WebsocketMessage) {
        let kind = message.kind();
        tracing::trace!(kind = %kind, device_id = ?message.device_id(), "Dispatching frame");
        self.last_seen.insert(kind, message.clone());

        if let WebsocketMessage::Acknowledgement(ack) = &message {
            let pending = self.pending_ack.lock().await.take();
            if let Some(pending) = pending {
                if pending.request_id != ack.id {
                    tracing::debug!(
                        expected = %pending.request_id,
                        received = %ack.id,
                        "Acknowledgement id differs from pending request"
                    );
                }
                if pending.tx.send(ack.clone()).is_ok() {
                    return;
                }
                tracing::debug!(id = %ack.id, "Acknowledgement waiter already gone");
            }
        }

        if let Some(handler) = self.registry.get(kind) {
            handler.invoke(message).await;
        }
    }

    // ── Teardown ─────────────────────────────────────────────────────

    async fn teardown(&self) {
        let step = self.config.close_step_timeout;

        // 1. Closing: refuse user sends from here on.
        self.closing.store(true, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Closing);
        tracing::info!(endpoint = %self.config.redacted_endpoint(), "Closing WebSocket client");

        // 2. Unsubscribe every configured device.
        for device in &self.config.devices {
            for request in [Request::listen_stop(*device), Request::rapid_wind_stop(*device)] {
                let outcome = if self.config.confirm_unsubscribe {
                    tokio::time::timeout(step, self.correlated_send(&request, step))
                        .await
                        .map(|result| result.map(drop))
                } else {
                    tokio::time::timeout(step, self.write(codec::encode(&request))).await
                };
                match outcome {
                    Ok(Ok(())) => {
                        tracing::debug!(kind = request.type_name(), device_id = %device, "Sent stop request");
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(kind = request.type_name(), device_id = %device, error = %e, "Stop request failed");
                    }
                    Err(_) => {
                        tracing::warn!(kind = request.type_name(), device_id = %device, "Stop request timed out");
                    }
                }
            }
        }

        // 3. Close the transport. A write stuck on a peer that stopped
        // reading can hold the sink; give up on the close handshake then.
        match tokio::time::timeout(step, self.writer.lock()).await {
            Ok(mut writer) => {
                if let Some(mut sink) = writer.take() {
                    drop(writer);
                    match tokio::time::timeout(step, sink.close()).await {
                        Ok(Ok(())) => tracing::debug!("WebSocket transport closed"),
                        Ok(Err(e)) => tracing::warn!(error = %e, "Error closing WebSocket transport"),
                        Err(_) => tracing::warn!(timeout_ms = millis(step), "Timed out closing WebSocket transport"),
                    }
                }
            }
            Err(_) => {
                tracing::warn!(timeout_ms = millis(step), "WebSocket sink busy, skipping close handshake");
            }
        }

        // 4. Stop the receive loop, forcibly if it does not exit in time.
        self.cancel.cancel();
        let handle = match tokio::time::timeout(step, self.listen_task.lock()).await {
            Ok(mut task) => task.take(),
            Err(_) => {
                tracing::warn!(timeout_ms = millis(step), "Receive task handle busy, not joining");
                None
            }
        };
        if let Some(mut handle) = handle {
            match tokio::time::timeout(self.config.join_timeout, &mut handle).await {
                Ok(Ok(())) => tracing::debug!("Receive loop joined"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Receive loop ended abnormally"),
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = millis(self.config.join_timeout),
                        "Receive loop did not stop in time, aborting"
                    );
                    handle.abort();
                }
            }
        }

        // 5. Closed.
        self.listening.store(false, Ordering::SeqCst);
        if let Ok(mut pending) = tokio::time::timeout(step, self.pending_ack.lock()).await {
            pending.take();
        }
        self.state.send_replace(ConnectionState::Closed);
        tracing::info!("WebSocket client closed");
    }

    async fn on_loop_exit(&self) {
        self.listening.store(false, Ordering::SeqCst);
        // Dropping the sender wakes any ack waiter with `AckAbandoned`.
        self.pending_ack.lock().await.take();

        if !self.closing.load(Ordering::SeqCst) {
            // Hold the writer across the state change so a concurrent
            // `connect()` sees either the old connection or Disconnected.
            let mut writer = self.writer.lock().await;
            writer.take();
            self.transition(ConnectionState::Connected, ConnectionState::Disconnected);
        }
    }
}

// ── Receive loop ─────────────────────────────────────────────────────

async fn receive_loop(inner: Arc<Inner>, mut source: WsSource) {
    let cancel = inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Receive loop cancelled");
                break;
            }
            frame = source.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        inner.handle_text(text.as_str()).await;
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite queues the pong itself
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "WebSocket close frame received"
                            );
                            inner.set_remote_close(Some(RemoteClose {
                                code: u16::from(cf.code),
                                reason: cf.reason.as_str().to_owned(),
                            }));
                        } else {
                            tracing::info!("WebSocket close frame received (no payload)");
                        }
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong, Frame -- ignore
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket transport error");
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    inner.on_loop_exit().await;
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
