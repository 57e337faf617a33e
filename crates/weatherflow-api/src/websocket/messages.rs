// ── Decoded inbound messages ──
//
// One struct per discriminator plus the closed `WebsocketMessage` sum type.
// Every message keeps the top-level keys it did not recognize in
// `unknown_fields` so nothing the service sends is silently dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::observation::{AirObservation, Observation, SkyObservation, TempestObservation};
use super::types::{DeviceId, MessageKind, WindDirection};

// ── Simple frames ────────────────────────────────────────────────────

/// `connection_opened`: sent once by the server after the upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOpened {
    #[serde(flatten)]
    pub unknown_fields: Map<String, Value>,
}

/// `ack`: acknowledges a request by echoing its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub id: String,
    #[serde(flatten)]
    pub unknown_fields: Map<String, Value>,
}

/// `evt_precip`: rain started at a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainStartEvent {
    pub device_id: DeviceId,
    #[serde(flatten)]
    pub unknown_fields: Map<String, Value>,
}

// ── Lightning ────────────────────────────────────────────────────────

/// `evt` payload of a strike event: `[epoch, distance_km, energy]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StrikeSample {
    pub epoch: i64,
    pub distance_km: f64,
    pub energy: f64,
}

/// `evt_strike`: a lightning strike detected by a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightningStrikeEvent {
    pub device_id: DeviceId,
    pub evt: StrikeSample,
    pub unknown_fields: Map<String, Value>,
}

impl LightningStrikeEvent {
    pub fn epoch(&self) -> i64 {
        self.evt.epoch
    }

    pub fn distance_km(&self) -> f64 {
        self.evt.distance_km
    }

    pub fn energy(&self) -> f64 {
        self.evt.energy
    }
}

// ── Rapid wind ───────────────────────────────────────────────────────

/// `ob` payload of a rapid-wind frame: `[epoch, speed_mps, direction_deg]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RapidWindSample {
    pub epoch: i64,
    pub wind_speed_meters_per_second: f64,
    pub wind_direction_degrees: f64,
    pub wind_direction_cardinal: WindDirection,
}

impl RapidWindSample {
    pub fn new(epoch: i64, wind_speed_meters_per_second: f64, wind_direction_degrees: f64) -> Self {
        Self {
            epoch,
            wind_speed_meters_per_second,
            wind_direction_degrees,
            wind_direction_cardinal: WindDirection::from_degrees(wind_direction_degrees),
        }
    }
}

/// `rapid_wind`: a 3-second wind sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RapidWind {
    pub device_id: DeviceId,
    pub ob: RapidWindSample,
    pub unknown_fields: Map<String, Value>,
}

impl RapidWind {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.ob.epoch, 0)
    }
}

// ── WebsocketMessage ─────────────────────────────────────────────────

/// Any decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum WebsocketMessage {
    #[serde(rename = "connection_opened")]
    ConnectionOpened(ConnectionOpened),
    #[serde(rename = "ack")]
    Acknowledgement(Acknowledgement),
    #[serde(rename = "evt_precip")]
    RainStart(RainStartEvent),
    #[serde(rename = "evt_strike")]
    LightningStrike(LightningStrikeEvent),
    #[serde(rename = "rapid_wind")]
    RapidWind(RapidWind),
    #[serde(rename = "obs_air")]
    ObservationAir(Observation<AirObservation>),
    #[serde(rename = "obs_sky")]
    ObservationSky(Observation<SkyObservation>),
    #[serde(rename = "obs_st")]
    ObservationTempest(Observation<TempestObservation>),
}

impl WebsocketMessage {
    /// The discriminator this message was decoded from.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::ConnectionOpened(_) => MessageKind::ConnectionOpened,
            Self::Acknowledgement(_) => MessageKind::Acknowledgement,
            Self::RainStart(_) => MessageKind::RainStart,
            Self::LightningStrike(_) => MessageKind::LightningStrike,
            Self::RapidWind(_) => MessageKind::RapidWind,
            Self::ObservationAir(_) => MessageKind::ObservationAir,
            Self::ObservationSky(_) => MessageKind::ObservationSky,
            Self::ObservationTempest(_) => MessageKind::ObservationTempest,
        }
    }

    /// Originating device, when the frame is device-scoped.
    pub fn device_id(&self) -> Option<DeviceId> {
        match self {
            Self::ConnectionOpened(_) | Self::Acknowledgement(_) => None,
            Self::RainStart(m) => Some(m.device_id),
            Self::LightningStrike(m) => Some(m.device_id),
            Self::RapidWind(m) => Some(m.device_id),
            Self::ObservationAir(m) => Some(m.device_id),
            Self::ObservationSky(m) => Some(m.device_id),
            Self::ObservationTempest(m) => Some(m.device_id),
        }
    }

    /// Epoch of the first observation row, for observation frames.
    pub fn observation_epoch(&self) -> Option<i64> {
        match self {
            Self::ObservationAir(m) => m.epoch(),
            Self::ObservationSky(m) => m.epoch(),
            Self::ObservationTempest(m) => m.epoch(),
            _ => None,
        }
    }

    pub fn as_acknowledgement(&self) -> Option<&Acknowledgement> {
        match self {
            Self::Acknowledgement(ack) => Some(ack),
            _ => None,
        }
    }

    pub fn as_rapid_wind(&self) -> Option<&RapidWind> {
        match self {
            Self::RapidWind(wind) => Some(wind),
            _ => None,
        }
    }

    pub fn as_tempest(&self) -> Option<&Observation<TempestObservation>> {
        match self {
            Self::ObservationTempest(obs) => Some(obs),
            _ => None,
        }
    }
}
