use thiserror::Error;

use crate::websocket::codec::DecodeError;

/// Top-level error type for the `weatherflow-api` crate.
///
/// Covers construction, transport, and request/acknowledgement failures.
/// Decode failures have their own [`DecodeError`] type because the receive
/// loop contains them locally; they only surface here when a caller decodes
/// a frame directly.
#[derive(Debug, Error)]
pub enum Error {
    // ── Configuration ───────────────────────────────────────────────
    /// Missing or invalid setting detected before any I/O.
    #[error("Invalid {field}: {reason}")]
    Configuration { field: String, reason: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection could not be established.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the server.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// I/O failure on an established connection.
    #[error("WebSocket transport error: {0}")]
    Transport(String),

    /// A frame could not be written within the send bound (peer not reading,
    /// or the sink held by another stalled write).
    #[error("Timed out writing to the WebSocket after {timeout_ms}ms")]
    SendTimeout { timeout_ms: u64 },

    /// No live connection (never connected, closing, or already closed).
    #[error("Not connected to the WeatherFlow WebSocket")]
    NotConnected,

    /// The client was closed; a closed client cannot be reconnected.
    #[error("Client has been closed -- construct a new client to reconnect")]
    Closed,

    /// `connect()` called on a client that already has a live connection.
    #[error("Client is already connected")]
    AlreadyConnected,

    // ── Request / acknowledgement ───────────────────────────────────
    /// No acknowledgement arrived within the wait bound.
    #[error("No acknowledgement for request {request_id} within {timeout_ms}ms")]
    AckTimeout { request_id: String, timeout_ms: u64 },

    /// Another acknowledged request is still waiting for its ack.
    #[error("Acknowledgement for request {request_id} is still pending")]
    AckInFlight { request_id: String },

    /// The receive loop ended while an acknowledgement was outstanding.
    #[error("Connection ended while waiting for acknowledgement of {request_id}")]
    AckAbandoned { request_id: String },

    // ── Data ────────────────────────────────────────────────────────
    /// A frame could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl Error {
    /// Returns `true` if this is a timeout worth retrying.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AckTimeout { .. } | Self::SendTimeout { .. })
    }

    /// Returns `true` if the connection is gone and a fresh client is needed.
    pub fn is_disconnected(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::Closed
                | Self::WebSocketClosed { .. }
                | Self::Transport(_)
                | Self::AckAbandoned { .. }
        )
    }
}
