//! CLI-side configuration: applies global flags on top of the shared
//! `weatherflow_config` profiles and produces a `WebsocketConfig`.

use secrecy::SecretString;

use weatherflow_api::{DeviceId, WebsocketConfig};
use weatherflow_config::{
    Config, Profile, load_config_or_default, profile_to_websocket_config, resolve_token,
};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use weatherflow_config::config_path;

/// Profile name from `--profile`, then the config's default.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    cfg.active_profile_name(global.profile.as_deref())
}

/// Build the client config from the config file, profile, and CLI flags.
///
/// `devices` replaces the profile's device list when non-empty.
pub fn build_websocket_config(
    global: &GlobalOpts,
    devices: &[String],
) -> Result<WebsocketConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let profile = match cfg.profile(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly requested profile must exist; the implicit default may not.
        None if global.profile.is_some() => {
            let available = cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ");
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available
                },
            });
        }
        None => Profile::default(),
    };

    let token = match global.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => SecretString::from(token.to_owned()),
        None => resolve_token(&profile, &profile_name)?,
    };

    let mut config = profile_to_websocket_config(&profile, &cfg.defaults, token)?;

    if let Some(ref endpoint) = global.endpoint {
        config = config.with_endpoint(endpoint.clone());
        config.validate()?;
    }

    if !devices.is_empty() {
        config = config.with_devices(parse_devices(devices)?);
    }

    tracing::debug!(
        profile = %profile_name,
        endpoint = %config.redacted_endpoint(),
        devices = ?config.devices,
        "resolved websocket config"
    );
    Ok(config)
}

pub fn parse_devices(raw: &[String]) -> Result<Vec<DeviceId>, CliError> {
    raw.iter()
        .map(|value| {
            value.parse::<DeviceId>().map_err(|_| CliError::Validation {
                field: "device".into(),
                reason: format!("'{value}' is not a numeric device id"),
            })
        })
        .collect()
}
