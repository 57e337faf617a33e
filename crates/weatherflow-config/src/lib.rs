//! Shared configuration for WeatherFlow tools.
//!
//! TOML profiles, access-token resolution (env + plaintext), and
//! translation to `weatherflow_api::WebsocketConfig`. The CLI layers its
//! flag overrides on top of what this crate produces.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use weatherflow_api::{DEFAULT_ENDPOINT, DeviceId, WebsocketConfig};

/// Environment variable consulted when a profile has no `token_env`.
pub const TOKEN_ENV: &str = "WEATHERFLOW_TOKEN";

const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use: the override, then `default_profile`,
    /// then `"default"`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Copy with every plaintext token masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for profile in copy.profiles.values_mut() {
            if profile.token.is_some() {
                profile.token = Some(REDACTED.into());
            }
        }
        copy
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    /// Event output format: "plain" or "json".
    #[serde(default = "default_output")]
    pub output: String,

    /// Per-step shutdown bound, seconds.
    #[serde(default = "default_close_timeout")]
    pub close_timeout: u64,

    /// Acknowledgement wait, seconds.
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            close_timeout: default_close_timeout(),
            ack_timeout: default_ack_timeout(),
        }
    }
}

fn default_output() -> String {
    "plain".into()
}
fn default_close_timeout() -> u64 {
    3
}
fn default_ack_timeout() -> u64 {
    5
}

/// A station device id as written in TOML: a bare integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DeviceEntry {
    Id(u64),
    Text(String),
}

impl DeviceEntry {
    pub fn parse(&self) -> Result<DeviceId, ConfigError> {
        match self {
            Self::Id(id) => Ok(DeviceId::new(*id)),
            Self::Text(text) => text.parse().map_err(|_| ConfigError::Validation {
                field: "devices".into(),
                reason: format!("'{text}' is not a numeric device id"),
            }),
        }
    }
}

/// A named profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Streaming endpoint override.
    pub endpoint: Option<String>,

    /// Access token (plaintext, prefer `token_env`).
    pub token: Option<String>,

    /// Environment variable name containing the access token.
    pub token_env: Option<String>,

    /// Devices to subscribe to and stop on shutdown.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,

    /// Override the per-step shutdown bound, seconds.
    pub close_timeout: Option<u64>,

    /// Override the receive task join bound, seconds.
    pub join_timeout: Option<u64>,

    /// Override the acknowledgement wait, seconds.
    pub ack_timeout: Option<u64>,

    /// Wait for an ack on each stop request during shutdown.
    pub confirm_unsubscribe: Option<bool>,
}

impl Profile {
    pub fn device_ids(&self) -> Result<Vec<DeviceId>, ConfigError> {
        self.devices.iter().map(DeviceEntry::parse).collect()
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "weatherflow", "weatherflow").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("weatherflow");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment.
///
/// Nested keys come from `WEATHERFLOW_` variables split on `__`, e.g.
/// `WEATHERFLOW_PROFILES__HOME__TOKEN_ENV`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("WEATHERFLOW_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the access token from the process environment and the profile.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_token_with(profile, profile_name, |name| std::env::var(name).ok())
}

/// Token chain with an injectable environment lookup:
/// `token_env` variable, then `WEATHERFLOW_TOKEN`, then plaintext `token`.
/// Empty values are skipped.
pub fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    let non_empty = |value: String| (!value.trim().is_empty()).then_some(value);

    // 1. Profile's token_env → env var lookup
    if let Some(token) = profile.token_env.as_deref().and_then(&env).and_then(non_empty) {
        return Ok(SecretString::from(token));
    }

    // 2. Well-known variable
    if let Some(token) = env(TOKEN_ENV).and_then(non_empty) {
        return Ok(SecretString::from(token));
    }

    // 3. Plaintext in config
    if let Some(token) = profile.token.clone().and_then(non_empty) {
        return Ok(SecretString::from(token));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

// ── WebsocketConfig construction ────────────────────────────────────

/// Build a `WebsocketConfig` from a profile and global defaults, with the
/// token already resolved.
pub fn profile_to_websocket_config(
    profile: &Profile,
    defaults: &Defaults,
    token: SecretString,
) -> Result<WebsocketConfig, ConfigError> {
    let close_timeout = Duration::from_secs(profile.close_timeout.unwrap_or(defaults.close_timeout));
    let ack_timeout = Duration::from_secs(profile.ack_timeout.unwrap_or(defaults.ack_timeout));

    let mut config = WebsocketConfig::new(String::new())
        .with_endpoint(profile.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT))
        .with_devices(profile.device_ids()?)
        .with_close_step_timeout(close_timeout)
        .with_ack_timeout(ack_timeout)
        .with_confirm_unsubscribe(profile.confirm_unsubscribe.unwrap_or(false));
    if let Some(secs) = profile.join_timeout {
        config = config.with_join_timeout(Duration::from_secs(secs));
    }
    config.token = token;

    config.validate().map_err(|e| match e {
        weatherflow_api::Error::Configuration { field, reason } => {
            ConfigError::Validation { field, reason }
        }
        other => ConfigError::Validation {
            field: "endpoint".into(),
            reason: other.to_string(),
        },
    })?;
    Ok(config)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn token_env_wins_over_everything() {
        let profile = Profile {
            token: Some("plain".into()),
            token_env: Some("MY_TOKEN".into()),
            ..Profile::default()
        };
        let env = |name: &str| match name {
            "MY_TOKEN" => Some("from-custom".into()),
            TOKEN_ENV => Some("from-well-known".into()),
            _ => None,
        };
        let token = resolve_token_with(&profile, "home", env).unwrap();
        assert_eq!(token.expose_secret(), "from-custom");
    }

    #[test]
    fn well_known_variable_beats_plaintext() {
        let profile = Profile {
            token: Some("plain".into()),
            token_env: Some("UNSET_VAR".into()),
            ..Profile::default()
        };
        let env = |name: &str| (name == TOKEN_ENV).then(|| "from-well-known".to_owned());
        let token = resolve_token_with(&profile, "home", env).unwrap();
        assert_eq!(token.expose_secret(), "from-well-known");
    }

    #[test]
    fn plaintext_is_the_last_resort() {
        let profile = Profile {
            token: Some("plain".into()),
            ..Profile::default()
        };
        let token = resolve_token_with(&profile, "home", no_env).unwrap();
        assert_eq!(token.expose_secret(), "plain");
    }

    #[test]
    fn missing_or_blank_token_is_no_credentials() {
        let profile = Profile {
            token: Some("   ".into()),
            ..Profile::default()
        };
        let err = resolve_token_with(&profile, "home", no_env).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { ref profile } if profile == "home"));
    }

    #[test]
    fn device_entries_accept_numbers_and_strings() {
        let profile: Profile = toml::from_str(r#"devices = [211522, "1110"]"#).unwrap();
        assert_eq!(
            profile.device_ids().unwrap(),
            vec![DeviceId::new(211_522), DeviceId::new(1110)]
        );

        let bad: Profile = toml::from_str(r#"devices = ["ST-00000512"]"#).unwrap();
        assert!(matches!(
            bad.device_ids(),
            Err(ConfigError::Validation { ref field, .. }) if field == "devices"
        ));
    }

    #[test]
    fn profile_builds_websocket_config() {
        let profile = Profile {
            endpoint: Some("ws://127.0.0.1:9000/swd/data".into()),
            devices: vec![DeviceEntry::Id(211_522)],
            close_timeout: Some(1),
            join_timeout: Some(2),
            confirm_unsubscribe: Some(true),
            ..Profile::default()
        };
        let config =
            profile_to_websocket_config(&profile, &Defaults::default(), SecretString::from("t".to_owned()))
                .unwrap();

        assert_eq!(config.endpoint, "ws://127.0.0.1:9000/swd/data");
        assert_eq!(config.devices, vec![DeviceId::new(211_522)]);
        assert_eq!(config.close_step_timeout, Duration::from_secs(1));
        assert_eq!(config.join_timeout, Duration::from_secs(2));
        assert_eq!(config.ack_timeout, Duration::from_secs(5));
        assert!(config.confirm_unsubscribe);
        assert_eq!(config.token.expose_secret(), "t");
    }

    #[test]
    fn bad_endpoint_is_a_validation_error() {
        let profile = Profile {
            endpoint: Some("http://example.com".into()),
            ..Profile::default()
        };
        let err = profile_to_websocket_config(&profile, &Defaults::default(), SecretString::from("t".to_owned()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "endpoint"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.profiles.insert(
            "home".into(),
            Profile {
                token_env: Some("HOME_TOKEN".into()),
                devices: vec![DeviceEntry::Id(211_522)],
                ..Profile::default()
            },
        );
        config.default_profile = Some("home".into());
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.active_profile_name(None), "home");
        assert_eq!(loaded.active_profile_name(Some("other")), "other");
        assert_eq!(loaded.profile("home"), config.profile("home"));
        assert_eq!(loaded.defaults, Defaults::default());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.active_profile_name(None), "default");
        assert!(loaded.profiles.is_empty());
    }

    #[test]
    fn redaction_masks_plaintext_tokens() {
        let mut config = Config::default();
        config.profiles.insert(
            "home".into(),
            Profile {
                token: Some("s3cr3t".into()),
                ..Profile::default()
            },
        );
        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("s3cr3t"));
        assert!(shown.contains(REDACTED));
    }
}
