// ── Device observations ──
//
// Air, Sky, and Tempest devices report fixed-position numeric arrays.
// Positions are a wire contract: each sub-type has a schema (ordered field
// names) and rows are validated against its length before any lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::codec::DecodeError;
use super::types::{DeviceId, MessageKind, PrecipitationAnalysisType, PrecipitationType};

// ── Schemas ──────────────────────────────────────────────────────────

/// Ordered `obs_air` row fields.
pub const AIR_FIELDS: &[&str] = &[
    "epoch",
    "station_pressure",
    "air_temperature",
    "relative_humidity",
    "lightning_strike_count",
    "lightning_strike_average_distance",
    "battery",
    "report_interval",
];

/// Ordered `obs_sky` row fields.
pub const SKY_FIELDS: &[&str] = &[
    "epoch",
    "illuminance",
    "uv",
    "rain_accumulation",
    "wind_lull",
    "wind_avg",
    "wind_gust",
    "wind_direction",
    "battery",
    "report_interval",
    "solar_radiation",
    "local_day_rain_accumulation",
    "precipitation_type",
    "wind_sample_interval",
    "nc_rain",
    "local_day_nc_rain_accumulation",
    "precipitation_analysis_type",
];

/// Ordered `obs_st` row fields.
pub const TEMPEST_FIELDS: &[&str] = &[
    "epoch",
    "wind_lull",
    "wind_avg",
    "wind_gust",
    "wind_direction",
    "wind_sample_interval",
    "pressure",
    "air_temperature",
    "relative_humidity",
    "illuminance",
    "uv",
    "solar_radiation",
    "rain_accumulation",
    "precipitation_type",
    "average_strike_distance",
    "strike_count",
    "battery",
    "report_interval",
    "local_day_rain_accumulation",
    "nc_rain_accumulation",
    "local_day_nc_rain_accumulation",
    "precipitation_analysis_type",
];

/// One validated observation row, addressed by schema field name.
#[doc(hidden)]
pub struct Row<'a> {
    kind: MessageKind,
    fields: &'static [&'static str],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    pub(crate) fn new(
        kind: MessageKind,
        fields: &'static [&'static str],
        values: &'a [Value],
    ) -> Result<Self, DecodeError> {
        if values.len() != fields.len() {
            return Err(DecodeError::Arity {
                kind,
                expected: fields.len(),
                actual: values.len(),
            });
        }
        Ok(Self {
            kind,
            fields,
            values,
        })
    }

    fn value(&self, field: &'static str) -> Result<&'a Value, DecodeError> {
        self.fields
            .iter()
            .position(|name| *name == field)
            .and_then(|idx| self.values.get(idx))
            .ok_or_else(|| self.malformed(field, "not part of the row schema"))
    }

    fn malformed(&self, field: &'static str, reason: &str) -> DecodeError {
        DecodeError::Malformed {
            kind: self.kind,
            reason: format!("{field}: {reason}"),
        }
    }

    /// Required integer epoch seconds.
    pub(crate) fn epoch(&self) -> Result<i64, DecodeError> {
        self.value("epoch")?
            .as_i64()
            .ok_or_else(|| self.malformed("epoch", "expected integer seconds"))
    }

    /// Measurement that must be present.
    pub(crate) fn required(&self, field: &'static str) -> Result<f64, DecodeError> {
        self.number(field)?
            .ok_or_else(|| self.malformed(field, "expected number, got null"))
    }

    /// Measurement; `null` marks a sensor gap.
    fn number(&self, field: &'static str) -> Result<Option<f64>, DecodeError> {
        match self.value(field)? {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(n.as_f64()),
            other => Err(self.malformed(field, &format!("expected number, got {other}"))),
        }
    }

    /// Enumerated integer code; unknown codes are rejected.
    fn code<T>(&self, field: &'static str) -> Result<Option<T>, DecodeError>
    where
        T: TryFrom<i64, Error = DecodeError>,
    {
        match self.value(field)? {
            Value::Null => Ok(None),
            Value::Number(n) => {
                let code = n
                    .as_i64()
                    .ok_or_else(|| self.malformed(field, "expected integer code"))?;
                T::try_from(code).map(Some)
            }
            other => Err(self.malformed(field, &format!("expected integer code, got {other}"))),
        }
    }
}

/// A row type decodable from a fixed-position observation array.
pub trait ObservationRow: Sized {
    /// Discriminator of the enclosing observation frame.
    const KIND: MessageKind;
    /// Ordered field names; the slice length is the row arity.
    const FIELDS: &'static [&'static str];

    #[doc(hidden)]
    fn from_row(row: &Row<'_>) -> Result<Self, DecodeError>;

    fn epoch(&self) -> i64;

    /// Validate arity and decode one raw row.
    fn decode_row(values: &[Value]) -> Result<Self, DecodeError> {
        let row = Row::new(Self::KIND, Self::FIELDS, values)?;
        Self::from_row(&row)
    }
}

// ── Row types ────────────────────────────────────────────────────────

/// `obs_air` row (Air device: pressure, temperature, humidity, lightning).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirObservation {
    pub epoch: i64,
    /// mb
    pub station_pressure: Option<f64>,
    /// °C
    pub air_temperature: Option<f64>,
    /// %
    pub relative_humidity: Option<f64>,
    pub lightning_strike_count: Option<f64>,
    /// km
    pub lightning_strike_average_distance: Option<f64>,
    /// volts
    pub battery: Option<f64>,
    /// minutes
    pub report_interval: Option<f64>,
}

impl ObservationRow for AirObservation {
    const KIND: MessageKind = MessageKind::ObservationAir;
    const FIELDS: &'static [&'static str] = AIR_FIELDS;

    fn from_row(row: &Row<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            epoch: row.epoch()?,
            station_pressure: row.number("station_pressure")?,
            air_temperature: row.number("air_temperature")?,
            relative_humidity: row.number("relative_humidity")?,
            lightning_strike_count: row.number("lightning_strike_count")?,
            lightning_strike_average_distance: row.number("lightning_strike_average_distance")?,
            battery: row.number("battery")?,
            report_interval: row.number("report_interval")?,
        })
    }

    fn epoch(&self) -> i64 {
        self.epoch
    }
}

/// `obs_sky` row (Sky device: light, rain, wind).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkyObservation {
    pub epoch: i64,
    /// lux
    pub illuminance: Option<f64>,
    pub uv: Option<f64>,
    /// mm over the report interval
    pub rain_accumulation: Option<f64>,
    /// m/s
    pub wind_lull: Option<f64>,
    /// m/s
    pub wind_avg: Option<f64>,
    /// m/s
    pub wind_gust: Option<f64>,
    /// degrees
    pub wind_direction: Option<f64>,
    /// volts
    pub battery: Option<f64>,
    /// minutes
    pub report_interval: Option<f64>,
    /// W/m²
    pub solar_radiation: Option<f64>,
    pub local_day_rain_accumulation: Option<f64>,
    pub precipitation_type: Option<PrecipitationType>,
    /// seconds
    pub wind_sample_interval: Option<f64>,
    pub nc_rain: Option<f64>,
    pub local_day_nc_rain_accumulation: Option<f64>,
    pub precipitation_analysis_type: Option<PrecipitationAnalysisType>,
}

impl ObservationRow for SkyObservation {
    const KIND: MessageKind = MessageKind::ObservationSky;
    const FIELDS: &'static [&'static str] = SKY_FIELDS;

    fn from_row(row: &Row<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            epoch: row.epoch()?,
            illuminance: row.number("illuminance")?,
            uv: row.number("uv")?,
            rain_accumulation: row.number("rain_accumulation")?,
            wind_lull: row.number("wind_lull")?,
            wind_avg: row.number("wind_avg")?,
            wind_gust: row.number("wind_gust")?,
            wind_direction: row.number("wind_direction")?,
            battery: row.number("battery")?,
            report_interval: row.number("report_interval")?,
            solar_radiation: row.number("solar_radiation")?,
            local_day_rain_accumulation: row.number("local_day_rain_accumulation")?,
            precipitation_type: row.code("precipitation_type")?,
            wind_sample_interval: row.number("wind_sample_interval")?,
            nc_rain: row.number("nc_rain")?,
            local_day_nc_rain_accumulation: row.number("local_day_nc_rain_accumulation")?,
            precipitation_analysis_type: row.code("precipitation_analysis_type")?,
        })
    }

    fn epoch(&self) -> i64 {
        self.epoch
    }
}

/// `obs_st` row (Tempest all-in-one device).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempestObservation {
    pub epoch: i64,
    /// m/s
    pub wind_lull: Option<f64>,
    /// m/s
    pub wind_avg: Option<f64>,
    /// m/s
    pub wind_gust: Option<f64>,
    /// degrees
    pub wind_direction: Option<f64>,
    /// seconds
    pub wind_sample_interval: Option<f64>,
    /// mb
    pub pressure: Option<f64>,
    /// °C
    pub air_temperature: Option<f64>,
    /// %
    pub relative_humidity: Option<f64>,
    /// lux
    pub illuminance: Option<f64>,
    pub uv: Option<f64>,
    /// W/m²
    pub solar_radiation: Option<f64>,
    /// mm over the report interval
    pub rain_accumulation: Option<f64>,
    pub precipitation_type: Option<PrecipitationType>,
    /// km
    pub average_strike_distance: Option<f64>,
    pub strike_count: Option<f64>,
    /// volts
    pub battery: Option<f64>,
    /// minutes
    pub report_interval: Option<f64>,
    pub local_day_rain_accumulation: Option<f64>,
    pub nc_rain_accumulation: Option<f64>,
    pub local_day_nc_rain_accumulation: Option<f64>,
    pub precipitation_analysis_type: Option<PrecipitationAnalysisType>,
}

impl ObservationRow for TempestObservation {
    const KIND: MessageKind = MessageKind::ObservationTempest;
    const FIELDS: &'static [&'static str] = TEMPEST_FIELDS;

    fn from_row(row: &Row<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            epoch: row.epoch()?,
            wind_lull: row.number("wind_lull")?,
            wind_avg: row.number("wind_avg")?,
            wind_gust: row.number("wind_gust")?,
            wind_direction: row.number("wind_direction")?,
            wind_sample_interval: row.number("wind_sample_interval")?,
            pressure: row.number("pressure")?,
            air_temperature: row.number("air_temperature")?,
            relative_humidity: row.number("relative_humidity")?,
            illuminance: row.number("illuminance")?,
            uv: row.number("uv")?,
            solar_radiation: row.number("solar_radiation")?,
            rain_accumulation: row.number("rain_accumulation")?,
            precipitation_type: row.code("precipitation_type")?,
            average_strike_distance: row.number("average_strike_distance")?,
            strike_count: row.number("strike_count")?,
            battery: row.number("battery")?,
            report_interval: row.number("report_interval")?,
            local_day_rain_accumulation: row.number("local_day_rain_accumulation")?,
            nc_rain_accumulation: row.number("nc_rain_accumulation")?,
            local_day_nc_rain_accumulation: row.number("local_day_nc_rain_accumulation")?,
            precipitation_analysis_type: row.code("precipitation_analysis_type")?,
        })
    }

    fn epoch(&self) -> i64 {
        self.epoch
    }
}

// ── Summary ──────────────────────────────────────────────────────────

/// Derived values the service computes alongside each observation.
///
/// Air and Sky devices send different subsets, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub strike_count_1h: Option<u32>,
    #[serde(default)]
    pub strike_count_3h: Option<u32>,
    #[serde(default)]
    pub precip_total_1h: Option<f64>,
    #[serde(default)]
    pub precip_accum_local_yesterday: Option<f64>,
    #[serde(default)]
    pub precip_accum_local_yesterday_final: Option<f64>,
    #[serde(default)]
    pub precip_analysis_type_yesterday: Option<PrecipitationAnalysisType>,
    #[serde(default)]
    pub feels_like: Option<f64>,
    #[serde(default)]
    pub heat_index: Option<f64>,
    #[serde(default)]
    pub wind_chill: Option<f64>,
    #[serde(default)]
    pub pressure_trend: Option<String>,
    #[serde(default)]
    pub strike_last_dist: Option<f64>,
    #[serde(default)]
    pub strike_last_epoch: Option<i64>,

    /// Everything else the service includes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Observation envelope ─────────────────────────────────────────────

/// A device observation frame (`obs_air`, `obs_sky`, or `obs_st`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation<T> {
    pub device_id: DeviceId,
    pub source: String,
    pub serial_number: String,
    pub hub_sn: String,
    pub firmware_revision: String,
    pub summary: Summary,
    /// One or more rows, oldest first.
    pub obs: Vec<T>,
    pub unknown_fields: Map<String, Value>,
}

impl<T: ObservationRow> Observation<T> {
    /// The first row. Frames always carry at least one.
    pub fn first(&self) -> Option<&T> {
        self.obs.first()
    }

    /// Epoch seconds of the first row.
    pub fn epoch(&self) -> Option<i64> {
        self.first().map(ObservationRow::epoch)
    }

    /// Epoch of the first row as a UTC timestamp.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.epoch()
            .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
    }
}

/// Wire shape shared by all three observation discriminators.
#[derive(Debug, Deserialize)]
pub(crate) struct RawObservation {
    device_id: DeviceId,
    source: String,
    serial_number: String,
    hub_sn: String,
    #[serde(deserialize_with = "string_or_number")]
    firmware_revision: String,
    summary: Summary,
    obs: Vec<Vec<Value>>,
    #[serde(flatten)]
    unknown_fields: Map<String, Value>,
}

impl RawObservation {
    pub(crate) fn into_observation<T: ObservationRow>(self) -> Result<Observation<T>, DecodeError> {
        if self.obs.is_empty() {
            return Err(DecodeError::Malformed {
                kind: T::KIND,
                reason: "obs: expected at least one row".into(),
            });
        }

        let obs = self
            .obs
            .iter()
            .map(|row| T::decode_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Observation {
            device_id: self.device_id,
            source: self.source,
            serial_number: self.serial_number,
            hub_sn: self.hub_sn,
            firmware_revision: self.firmware_revision,
            summary: self.summary,
            obs,
            unknown_fields: self.unknown_fields,
        })
    }
}

/// Firmware revisions arrive as numbers from hubs and strings from REST.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
