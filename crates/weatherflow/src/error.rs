//! CLI error types with miette diagnostics.
//!
//! Maps client and config errors into user-facing errors with help text.

use miette::Diagnostic;
use thiserror::Error;

use weatherflow_api::Error as ApiError;
use weatherflow_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {endpoint}")]
    #[diagnostic(
        code(weatherflow::connection_failed),
        help(
            "Check network access and that the endpoint is correct.\n\
             Endpoint: {endpoint}"
        )
    )]
    ConnectionFailed {
        endpoint: String,
        #[source]
        source: ApiError,
    },

    #[error("The server ended the stream")]
    #[diagnostic(
        code(weatherflow::stream_ended),
        help("The connection dropped. Run the command again to reconnect.")
    )]
    StreamEnded,

    #[error("Streaming client error")]
    #[diagnostic(code(weatherflow::stream))]
    Stream(#[source] ApiError),

    // ── Authentication ───────────────────────────────────────────────
    #[error("No access token configured for profile '{profile}'")]
    #[diagnostic(
        code(weatherflow::no_credentials),
        help(
            "Set WEATHERFLOW_TOKEN, pass --token, or add `token_env` to the\n\
             profile in your config file."
        )
    )]
    NoCredentials { profile: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(weatherflow::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(weatherflow::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(weatherflow::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("The server did not respond within {millis}ms")]
    #[diagnostic(
        code(weatherflow::timeout),
        help("The subscription request may still have been applied.")
    )]
    Timeout { millis: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render event: {0}")]
    #[diagnostic(code(weatherflow::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render config: {0}")]
    #[diagnostic(code(weatherflow::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::StreamEnded => exit_code::CONNECTION,
            Self::NoCredentials { .. } => exit_code::AUTH,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

// ── ApiError → CliError mapping ──────────────────────────────────────

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Configuration { field, reason } => Self::Validation { field, reason },
            ApiError::InvalidUrl(e) => Self::Validation {
                field: "endpoint".into(),
                reason: e.to_string(),
            },
            ApiError::AckTimeout { timeout_ms, .. } | ApiError::SendTimeout { timeout_ms } => {
                Self::Timeout { millis: timeout_ms }
            }
            ApiError::NotConnected | ApiError::AckAbandoned { .. } | ApiError::WebSocketClosed { .. } => {
                Self::StreamEnded
            }
            other => Self::Stream(other),
        }
    }
}
