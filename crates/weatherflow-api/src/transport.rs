// Connection settings for the streaming client.
//
// The access token travels in the endpoint query string, so it is kept as a
// `SecretString` and only exposed when the connect URL is built. Anything
// logged goes through `redacted_endpoint()`.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::Error;
use crate::websocket::DeviceId;

/// Public WeatherFlow streaming endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://ws.weatherflow.com/swd/data";

/// Settings consumed by [`WebsocketClient`](crate::WebsocketClient).
#[derive(Debug, Clone)]
pub struct WebsocketConfig {
    /// Endpoint without credentials. `ws://` or `wss://`.
    pub endpoint: String,
    /// Personal access token, appended as `?token=`.
    pub token: SecretString,
    /// The Subscription Set: devices stopped on close and started by
    /// `subscribe_all()`.
    pub devices: Vec<DeviceId>,
    /// Bound on the opening handshake. Default: 10s.
    pub connect_timeout: Duration,
    /// Bound on each shutdown step. Default: 3s.
    pub close_step_timeout: Duration,
    /// Bound on joining the receive task during shutdown. Default: 5s.
    pub join_timeout: Duration,
    /// Ack wait when `send_and_await_ack` is given no timeout. Default: 5s.
    pub ack_timeout: Duration,
    /// Bound on a single outbound frame write, including waiting for the
    /// sink. Default: 10s.
    pub send_timeout: Duration,
    /// Wait for an ack on each stop message during shutdown.
    pub confirm_unsubscribe: bool,
}

impl WebsocketConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            token: SecretString::from(token.into()),
            devices: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            close_step_timeout: Duration::from_secs(3),
            join_timeout: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(10),
            confirm_unsubscribe: false,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_devices(mut self, devices: impl IntoIterator<Item = DeviceId>) -> Self {
        self.devices = devices.into_iter().collect();
        self
    }

    pub fn with_device(mut self, device: DeviceId) -> Self {
        if !self.devices.contains(&device) {
            self.devices.push(device);
        }
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_close_step_timeout(mut self, timeout: Duration) -> Self {
        self.close_step_timeout = timeout;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_confirm_unsubscribe(mut self, confirm: bool) -> Self {
        self.confirm_unsubscribe = confirm;
        self
    }

    /// Check everything that can be checked without I/O.
    pub fn validate(&self) -> Result<(), Error> {
        if self.token.expose_secret().trim().is_empty() {
            return Err(Error::Configuration {
                field: "token".into(),
                reason: "an access token is required".into(),
            });
        }
        self.parse_endpoint().map(drop)
    }

    /// Endpoint with the token attached. Never log the result.
    pub fn connect_url(&self) -> Result<Url, Error> {
        let mut url = self.parse_endpoint()?;
        url.query_pairs_mut()
            .append_pair("token", self.token.expose_secret());
        Ok(url)
    }

    /// Endpoint with any query string removed, safe for logs.
    pub fn redacted_endpoint(&self) -> String {
        match Url::parse(&self.endpoint) {
            Ok(mut url) => {
                url.set_query(None);
                url.to_string()
            }
            Err(_) => self
                .endpoint
                .split('?')
                .next()
                .unwrap_or_default()
                .to_owned(),
        }
    }

    fn parse_endpoint(&self) -> Result<Url, Error> {
        let url = Url::parse(&self.endpoint)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(Error::Configuration {
                field: "endpoint".into(),
                reason: format!("unsupported scheme `{other}`, expected ws or wss"),
            }),
        }
    }
}
