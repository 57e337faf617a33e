// weatherflow-api: Async Rust client for the WeatherFlow streaming WebSocket API

pub mod error;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use transport::{DEFAULT_ENDPOINT, WebsocketConfig};
pub use websocket::{
    ConnectionState, DecodeError, DeviceId, Handler, InvalidFrame, MessageKind, Request,
    StrikeType, WebsocketClient, WebsocketMessage, WindDirection,
};
