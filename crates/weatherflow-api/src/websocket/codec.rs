// ── Frame codec ──
//
// Text frame -> `WebsocketMessage`, keyed by the `type` discriminator.
// Decoding never panics: every failure is a `DecodeError` so the receive
// loop can contain it and keep going.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::messages::{
    Acknowledgement, ConnectionOpened, LightningStrikeEvent, RainStartEvent, RapidWind,
    RapidWindSample, StrikeSample, WebsocketMessage,
};
use super::observation::{
    AirObservation, RawObservation, Row, SkyObservation, TempestObservation,
};
use super::request::Request;
use super::types::{DeviceId, MessageKind};

/// Ordered `evt` fields of a lightning strike frame.
pub const STRIKE_FIELDS: &[&str] = &["epoch", "distance_km", "energy"];

/// Ordered `ob` fields of a rapid-wind frame.
pub const RAPID_WIND_FIELDS: &[&str] = &[
    "epoch",
    "wind_speed_meters_per_second",
    "wind_direction_degrees",
];

// ── DecodeError ──────────────────────────────────────────────────────

/// Why an inbound frame could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not well-formed JSON.
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON, but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// No `type` discriminator.
    #[error("frame has no `type` field")]
    MissingType,

    /// Discriminator outside the known set.
    #[error("unknown frame type `{0}`")]
    UnknownType(String),

    /// Required fields absent or of the wrong shape.
    #[error("malformed `{kind}` frame: {reason}")]
    Malformed { kind: MessageKind, reason: String },

    /// Positional array length differs from the schema.
    #[error("`{kind}` array has {actual} values, expected {expected}")]
    Arity {
        kind: MessageKind,
        expected: usize,
        actual: usize,
    },

    /// Enumerated numeric code outside the documented set.
    #[error("unknown {field} code {code}")]
    UnknownCode { field: &'static str, code: i64 },
}

// ── Decoding ─────────────────────────────────────────────────────────

/// Decode one raw text frame.
pub fn decode(raw: &str) -> Result<WebsocketMessage, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    decode_value(value)
}

/// Decode an already-parsed JSON value.
pub fn decode_value(value: Value) -> Result<WebsocketMessage, DecodeError> {
    let Value::Object(mut body) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let kind = match body.remove("type") {
        Some(Value::String(tag)) => match tag.parse::<MessageKind>() {
            Ok(kind) => kind,
            Err(_) => return Err(DecodeError::UnknownType(tag)),
        },
        Some(other) => return Err(DecodeError::UnknownType(other.to_string())),
        None => return Err(DecodeError::MissingType),
    };

    let message = match kind {
        MessageKind::ConnectionOpened => {
            WebsocketMessage::ConnectionOpened(variant::<ConnectionOpened>(kind, body)?)
        }
        MessageKind::Acknowledgement => {
            WebsocketMessage::Acknowledgement(variant::<Acknowledgement>(kind, body)?)
        }
        MessageKind::RainStart => WebsocketMessage::RainStart(variant::<RainStartEvent>(kind, body)?),
        MessageKind::LightningStrike => {
            let raw = variant::<RawSampleFrame<EvtKey>>(kind, body)?;
            WebsocketMessage::LightningStrike(raw.into_strike()?)
        }
        MessageKind::RapidWind => {
            let raw = variant::<RawSampleFrame<ObKey>>(kind, body)?;
            WebsocketMessage::RapidWind(raw.into_rapid_wind()?)
        }
        MessageKind::ObservationAir => WebsocketMessage::ObservationAir(
            variant::<RawObservation>(kind, body)?.into_observation::<AirObservation>()?,
        ),
        MessageKind::ObservationSky => WebsocketMessage::ObservationSky(
            variant::<RawObservation>(kind, body)?.into_observation::<SkyObservation>()?,
        ),
        MessageKind::ObservationTempest => WebsocketMessage::ObservationTempest(
            variant::<RawObservation>(kind, body)?.into_observation::<TempestObservation>()?,
        ),
    };

    Ok(message)
}

/// Deserialize the remaining keys of a frame into its variant shape.
fn variant<T: DeserializeOwned>(kind: MessageKind, body: Map<String, Value>) -> Result<T, DecodeError> {
    serde_json::from_value(Value::Object(body)).map_err(|e| DecodeError::Malformed {
        kind,
        reason: e.to_string(),
    })
}

// ── Sample frames (strike / rapid wind) ──────────────────────────────

/// Marker selecting the key that carries the positional sample.
trait SampleKey {
    const KEY: &'static str;
}

struct EvtKey;
impl SampleKey for EvtKey {
    const KEY: &'static str = "evt";
}

struct ObKey;
impl SampleKey for ObKey {
    const KEY: &'static str = "ob";
}

/// `{ device_id, <evt|ob>: [...], ... }`
#[derive(Deserialize)]
#[serde(bound = "")]
struct RawSampleFrame<K: SampleKey> {
    device_id: DeviceId,
    #[serde(flatten)]
    rest: Map<String, Value>,
    #[serde(skip)]
    _key: std::marker::PhantomData<K>,
}

impl<K: SampleKey> RawSampleFrame<K> {
    fn take_sample(&mut self, kind: MessageKind) -> Result<Vec<Value>, DecodeError> {
        match self.rest.remove(K::KEY) {
            Some(Value::Array(values)) => Ok(values),
            Some(other) => Err(DecodeError::Malformed {
                kind,
                reason: format!("{}: expected array, got {other}", K::KEY),
            }),
            None => Err(DecodeError::Malformed {
                kind,
                reason: format!("missing field `{}`", K::KEY),
            }),
        }
    }
}

impl RawSampleFrame<EvtKey> {
    fn into_strike(mut self) -> Result<LightningStrikeEvent, DecodeError> {
        let kind = MessageKind::LightningStrike;
        let values = self.take_sample(kind)?;
        let row = Row::new(kind, STRIKE_FIELDS, &values)?;

        Ok(LightningStrikeEvent {
            device_id: self.device_id,
            evt: StrikeSample {
                epoch: row.epoch()?,
                distance_km: row.required("distance_km")?,
                energy: row.required("energy")?,
            },
            unknown_fields: self.rest,
        })
    }
}

impl RawSampleFrame<ObKey> {
    fn into_rapid_wind(mut self) -> Result<RapidWind, DecodeError> {
        let kind = MessageKind::RapidWind;
        let values = self.take_sample(kind)?;
        let row = Row::new(kind, RAPID_WIND_FIELDS, &values)?;

        Ok(RapidWind {
            device_id: self.device_id,
            ob: RapidWindSample::new(
                row.epoch()?,
                row.required("wind_speed_meters_per_second")?,
                row.required("wind_direction_degrees")?,
            ),
            unknown_fields: self.rest,
        })
    }
}

// ── Encoding ─────────────────────────────────────────────────────────

/// Encode an outbound request as a text frame.
///
/// The only path from `Request` to wire text: the client and
/// [`Request::encode`] both go through here.
pub fn encode(request: &Request) -> String {
    request.to_value().to_string()
}

// ── Tests ────────────────────────────────────────────────────────────
