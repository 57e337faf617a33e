// ── Shared wire enumerations ──
//
// Discriminators, identifiers, and numeric codes that appear on both sides
// of the WebSocket. String forms are the exact wire spellings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use super::codec::DecodeError;

// ── MessageKind ─────────────────────────────────────────────────────

/// The `type` discriminator of an inbound frame.
///
/// Used as the key for handler registration and the last-seen cache.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    AsRefStr,
    IntoStaticStr,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
pub enum MessageKind {
    #[strum(serialize = "connection_opened")]
    #[serde(rename = "connection_opened")]
    ConnectionOpened,

    #[strum(serialize = "ack")]
    #[serde(rename = "ack")]
    Acknowledgement,

    #[strum(serialize = "evt_precip")]
    #[serde(rename = "evt_precip")]
    RainStart,

    #[strum(serialize = "evt_strike")]
    #[serde(rename = "evt_strike")]
    LightningStrike,

    #[strum(serialize = "rapid_wind")]
    #[serde(rename = "rapid_wind")]
    RapidWind,

    #[strum(serialize = "obs_air")]
    #[serde(rename = "obs_air")]
    ObservationAir,

    #[strum(serialize = "obs_sky")]
    #[serde(rename = "obs_sky")]
    ObservationSky,

    #[strum(serialize = "obs_st")]
    #[serde(rename = "obs_st")]
    ObservationTempest,
}

impl MessageKind {
    /// Returns `true` for the three device observation discriminators.
    pub fn is_observation(self) -> bool {
        matches!(
            self,
            Self::ObservationAir | Self::ObservationSky | Self::ObservationTempest
        )
    }
}

// ── DeviceId ────────────────────────────────────────────────────────

/// Numeric identifier of a physical sensor unit.
///
/// Serialized as a bare JSON number, which is what the service sends and
/// expects in `device_id` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u64);

impl DeviceId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<u64> for DeviceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ── StrikeType ──────────────────────────────────────────────────────

/// Lightning strike filter for geofenced strike subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString, Serialize, Deserialize)]
pub enum StrikeType {
    #[strum(serialize = "all")]
    #[serde(rename = "all")]
    All,

    /// Cloud-to-ground.
    #[strum(serialize = "cg")]
    #[serde(rename = "cg")]
    CloudToGround,

    /// Intra-cloud.
    #[strum(serialize = "ic")]
    #[serde(rename = "ic")]
    IntraCloud,
}

// ── Precipitation codes ─────────────────────────────────────────────

/// Precipitation type reported in sky and tempest observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum PrecipitationType {
    None,
    Rain,
    Hail,
    /// Experimental on the device firmware side.
    RainAndHail,
}

impl TryFrom<i64> for PrecipitationType {
    type Error = DecodeError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Rain),
            2 => Ok(Self::Hail),
            3 => Ok(Self::RainAndHail),
            other => Err(DecodeError::UnknownCode {
                field: "precipitation_type",
                code: other,
            }),
        }
    }
}

impl From<PrecipitationType> for i64 {
    fn from(value: PrecipitationType) -> Self {
        match value {
            PrecipitationType::None => 0,
            PrecipitationType::Rain => 1,
            PrecipitationType::Hail => 2,
            PrecipitationType::RainAndHail => 3,
        }
    }
}

/// Rain Check analysis mode reported alongside precipitation totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum PrecipitationAnalysisType {
    None,
    RainCheckUserDisplayOn,
    RainCheckUserDisplayOff,
}

impl TryFrom<i64> for PrecipitationAnalysisType {
    type Error = DecodeError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::RainCheckUserDisplayOn),
            2 => Ok(Self::RainCheckUserDisplayOff),
            other => Err(DecodeError::UnknownCode {
                field: "precipitation_analysis_type",
                code: other,
            }),
        }
    }
}

impl From<PrecipitationAnalysisType> for i64 {
    fn from(value: PrecipitationAnalysisType) -> Self {
        match value {
            PrecipitationAnalysisType::None => 0,
            PrecipitationAnalysisType::RainCheckUserDisplayOn => 1,
            PrecipitationAnalysisType::RainCheckUserDisplayOff => 2,
        }
    }
}

// ── WindDirection ───────────────────────────────────────────────────

/// 16-point compass rose.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString, Serialize, Deserialize)]
pub enum WindDirection {
    N,
    NNE,
    NE,
    ENE,
    E,
    ESE,
    SE,
    SSE,
    S,
    SSW,
    SW,
    WSW,
    W,
    WNW,
    NW,
    NNW,
}

impl WindDirection {
    const POINTS: [Self; 16] = [
        Self::N,
        Self::NNE,
        Self::NE,
        Self::ENE,
        Self::E,
        Self::ESE,
        Self::SE,
        Self::SSE,
        Self::S,
        Self::SSW,
        Self::SW,
        Self::WSW,
        Self::W,
        Self::WNW,
        Self::NW,
        Self::NNW,
    ];

    /// Nearest compass point for a bearing in degrees.
    ///
    /// Bearings outside `0..360` wrap; non-finite bearings map to north.
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    pub fn from_degrees(degrees: f64) -> Self {
        if !degrees.is_finite() {
            return Self::N;
        }
        let sector = (degrees / 22.5).round().rem_euclid(16.0) as usize;
        Self::POINTS.get(sector).copied().unwrap_or(Self::N)
    }
}
