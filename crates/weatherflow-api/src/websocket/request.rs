// ── Outbound request catalog ──
//
// The closed set of frames a client may send. Each request carries an `id`
// the server echoes in its `ack`; ids are fresh v4 UUIDs per construction.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::codec;
use super::types::{DeviceId, StrikeType};

/// An outbound request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Start the device observation stream.
    #[serde(rename = "listen_start")]
    ListenStart { device_id: DeviceId, id: String },

    /// Stop the device observation stream.
    #[serde(rename = "listen_stop")]
    ListenStop { device_id: DeviceId, id: String },

    /// Start the 3-second rapid-wind stream.
    #[serde(rename = "listen_rapid_start")]
    RapidWindListenStart { device_id: DeviceId, id: String },

    /// Stop the rapid-wind stream.
    #[serde(rename = "listen_rapid_stop")]
    RapidWindListenStop { device_id: DeviceId, id: String },

    /// Start a geofenced lightning strike stream.
    #[serde(rename = "geo_strike_listen_start")]
    GeoStrikeListenStart {
        lat_min: f64,
        lat_max: f64,
        lon_min: f64,
        lon_max: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strike_type: Option<StrikeType>,
        id: String,
    },
}

fn next_id() -> String {
    Uuid::new_v4().to_string()
}

impl Request {
    pub fn listen_start(device_id: DeviceId) -> Self {
        Self::ListenStart {
            device_id,
            id: next_id(),
        }
    }

    pub fn listen_stop(device_id: DeviceId) -> Self {
        Self::ListenStop {
            device_id,
            id: next_id(),
        }
    }

    pub fn rapid_wind_start(device_id: DeviceId) -> Self {
        Self::RapidWindListenStart {
            device_id,
            id: next_id(),
        }
    }

    pub fn rapid_wind_stop(device_id: DeviceId) -> Self {
        Self::RapidWindListenStop {
            device_id,
            id: next_id(),
        }
    }

    /// Geofenced strike stream. `strike_type: None` omits the key entirely.
    pub fn geo_strike_start(
        lat_min: f64,
        lat_max: f64,
        lon_min: f64,
        lon_max: f64,
        strike_type: Option<StrikeType>,
    ) -> Self {
        Self::GeoStrikeListenStart {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            strike_type,
            id: next_id(),
        }
    }

    /// Correlation id echoed by the server's `ack`.
    pub fn id(&self) -> &str {
        match self {
            Self::ListenStart { id, .. }
            | Self::ListenStop { id, .. }
            | Self::RapidWindListenStart { id, .. }
            | Self::RapidWindListenStop { id, .. }
            | Self::GeoStrikeListenStart { id, .. } => id,
        }
    }

    /// Wire discriminator.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ListenStart { .. } => "listen_start",
            Self::ListenStop { .. } => "listen_stop",
            Self::RapidWindListenStart { .. } => "listen_rapid_start",
            Self::RapidWindListenStop { .. } => "listen_rapid_stop",
            Self::GeoStrikeListenStart { .. } => "geo_strike_listen_start",
        }
    }

    /// Target device, for device-scoped requests.
    pub fn device_id(&self) -> Option<DeviceId> {
        match self {
            Self::ListenStart { device_id, .. }
            | Self::ListenStop { device_id, .. }
            | Self::RapidWindListenStart { device_id, .. }
            | Self::RapidWindListenStop { device_id, .. } => Some(*device_id),
            Self::GeoStrikeListenStart { .. } => None,
        }
    }

    /// The frame as a JSON object.
    pub fn to_value(&self) -> Value {
        match self {
            Self::ListenStart { device_id, id }
            | Self::ListenStop { device_id, id }
            | Self::RapidWindListenStart { device_id, id }
            | Self::RapidWindListenStop { device_id, id } => json!({
                "type": self.type_name(),
                "device_id": device_id,
                "id": id,
            }),
            Self::GeoStrikeListenStart {
                lat_min,
                lat_max,
                lon_min,
                lon_max,
                strike_type,
                id,
            } => {
                let mut frame = json!({
                    "type": self.type_name(),
                    "lat_min": lat_min,
                    "lat_max": lat_max,
                    "lon_min": lon_min,
                    "lon_max": lon_max,
                    "id": id,
                });
                if let (Some(strike_type), Value::Object(map)) = (strike_type, &mut frame) {
                    map.insert("strike_type".into(), Value::from(strike_type.as_ref()));
                }
                frame
            }
        }
    }

    /// The frame as newline-free JSON text. See [`codec::encode`].
    pub fn encode(&self) -> String {
        codec::encode(self)
    }
}
