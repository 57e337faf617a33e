//! Event rendering: one line per decoded message, plain or JSON.

use std::io::{self, IsTerminal, Write};

use chrono::DateTime;
use owo_colors::OwoColorize;

use weatherflow_api::websocket::{
    AirObservation, Observation, ObservationRow, SkyObservation, TempestObservation,
};
use weatherflow_api::{WebsocketMessage, WindDirection};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── EventPrinter ─────────────────────────────────────────────────────

/// Renders messages in the selected format and writes them to stdout.
#[derive(Debug, Clone, Copy)]
pub struct EventPrinter {
    format: OutputFormat,
    color: bool,
}

impl EventPrinter {
    pub fn new(format: OutputFormat, color: ColorMode) -> Self {
        Self {
            format,
            color: should_color(color) && format == OutputFormat::Plain,
        }
    }

    pub fn render(&self, message: &WebsocketMessage) -> Result<String, CliError> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string(message)?),
            OutputFormat::Plain => Ok(self.render_plain(message)),
        }
    }

    /// Render and print; failures are logged, never fatal to the stream.
    pub fn print(&self, message: &WebsocketMessage) {
        match self.render(message) {
            Ok(line) => {
                let mut stdout = io::stdout().lock();
                let _ = writeln!(stdout, "{line}");
                let _ = stdout.flush();
            }
            Err(e) => tracing::warn!(error = %e, kind = %message.kind(), "failed to render event"),
        }
    }

    fn label(&self, text: &str) -> String {
        if self.color {
            format!("{text:<10}").cyan().bold().to_string()
        } else {
            format!("{text:<10}")
        }
    }

    fn render_plain(&self, message: &WebsocketMessage) -> String {
        match message {
            WebsocketMessage::ConnectionOpened(_) => self.label("connected"),
            WebsocketMessage::Acknowledgement(ack) => format!("{} id={}", self.label("ack"), ack.id),
            WebsocketMessage::RainStart(evt) => {
                format!("{} device={} rain started", self.label("rain"), evt.device_id)
            }
            WebsocketMessage::LightningStrike(evt) => format!(
                "{} {} device={} distance={}km energy={}",
                timestamp(evt.epoch()),
                self.label("strike"),
                evt.device_id,
                evt.distance_km(),
                evt.energy()
            ),
            WebsocketMessage::RapidWind(wind) => format!(
                "{} {} device={} speed={:.1}m/s direction={}° {}",
                timestamp(wind.ob.epoch),
                self.label("wind"),
                wind.device_id,
                wind.ob.wind_speed_meters_per_second,
                wind.ob.wind_direction_degrees,
                wind.ob.wind_direction_cardinal
            ),
            WebsocketMessage::ObservationAir(obs) => self.observation("air", obs, air_fields),
            WebsocketMessage::ObservationSky(obs) => self.observation("sky", obs, sky_fields),
            WebsocketMessage::ObservationTempest(obs) => {
                self.observation("tempest", obs, tempest_fields)
            }
        }
    }

    fn observation<T: ObservationRow>(
        &self,
        label: &str,
        obs: &Observation<T>,
        fields: fn(&T) -> String,
    ) -> String {
        let detail = obs.first().map(fields).unwrap_or_default();
        format!(
            "{} {} device={} {detail}",
            timestamp(obs.epoch().unwrap_or_default()),
            self.label(label),
            obs.device_id
        )
    }
}

// ── Per-device field summaries ───────────────────────────────────────

fn air_fields(row: &AirObservation) -> String {
    format!(
        "temp={} humidity={} pressure={} strikes={}",
        value(row.air_temperature, "°C"),
        value(row.relative_humidity, "%"),
        value(row.station_pressure, "mb"),
        value(row.lightning_strike_count, ""),
    )
}

fn sky_fields(row: &SkyObservation) -> String {
    format!(
        "wind={} gust={} direction={} uv={} rain={}",
        value(row.wind_avg, "m/s"),
        value(row.wind_gust, "m/s"),
        direction(row.wind_direction),
        value(row.uv, ""),
        value(row.rain_accumulation, "mm"),
    )
}

fn tempest_fields(row: &TempestObservation) -> String {
    format!(
        "temp={} humidity={} pressure={} wind={} gust={} direction={} uv={} rain={}",
        value(row.air_temperature, "°C"),
        value(row.relative_humidity, "%"),
        value(row.pressure, "mb"),
        value(row.wind_avg, "m/s"),
        value(row.wind_gust, "m/s"),
        direction(row.wind_direction),
        value(row.uv, ""),
        value(row.rain_accumulation, "mm"),
    )
}

fn value(reading: Option<f64>, unit: &str) -> String {
    reading.map_or_else(|| "-".into(), |v| format!("{v}{unit}"))
}

fn direction(degrees: Option<f64>) -> String {
    degrees.map_or_else(
        || "-".into(),
        |d| format!("{d}°{}", WindDirection::from_degrees(d)),
    )
}

fn timestamp(epoch: i64) -> String {
    DateTime::from_timestamp(epoch, 0).map_or_else(
        || epoch.to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}
