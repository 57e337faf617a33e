//! Streaming client for the WeatherFlow WebSocket service.
//!
//! The service pushes JSON text frames tagged by a `type` discriminator:
//! device observations (`obs_air`, `obs_sky`, `obs_st`), 3-second rapid wind
//! samples, rain-start and lightning events, and `ack` frames echoing the
//! `id` of each request the client sends.
//!
//! - [`codec`] turns frames into [`WebsocketMessage`] values and requests
//!   into text. Positional observation arrays are validated against a field
//!   table before any value is read.
//! - [`WebsocketClient`] owns the connection, runs the receive loop,
//!   dispatches to per-kind [`Handler`]s, correlates acknowledgements, and
//!   tears everything down on [`close`](WebsocketClient::close).
//!
//! # Example
//!
//! ```rust,ignore
//! use weatherflow_api::{DeviceId, MessageKind, WebsocketClient, WebsocketConfig, WebsocketMessage};
//!
//! let config = WebsocketConfig::new(token).with_device(DeviceId::new(211_522));
//! let client = WebsocketClient::new(config)?;
//!
//! client.on(MessageKind::ObservationTempest, |msg| {
//!     if let WebsocketMessage::ObservationTempest(obs) = msg {
//!         println!("{:?}", obs.first().and_then(|row| row.air_temperature));
//!     }
//! });
//!
//! client.connect().await?;
//! client.subscribe_all().await?;
//! tokio::signal::ctrl_c().await?;
//! client.close().await;
//! ```

pub mod client;
pub mod codec;
pub mod handler;
pub mod messages;
pub mod observation;
pub mod request;
pub mod types;

pub use client::{ConnectionState, WebsocketClient};
pub use codec::{DecodeError, decode, encode};
pub use handler::{Handler, InvalidFrame};
pub use messages::{
    Acknowledgement, ConnectionOpened, LightningStrikeEvent, RainStartEvent, RapidWind,
    RapidWindSample, StrikeSample, WebsocketMessage,
};
pub use observation::{
    AIR_FIELDS, AirObservation, Observation, ObservationRow, SKY_FIELDS, SkyObservation, Summary,
    TEMPEST_FIELDS, TempestObservation,
};
pub use request::Request;
pub use types::{
    DeviceId, MessageKind, PrecipitationAnalysisType, PrecipitationType, StrikeType, WindDirection,
};
