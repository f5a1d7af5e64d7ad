//! Configuration types for the connection manager.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{NetworkError, Result};

/// Path every session connects to on the server.
pub const ENDPOINT_PATH: &str = "/ws/";

/// Timing and environment settings for a [`ConnectionManager`](crate::ConnectionManager).
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// retry_interval_ms = 5000
/// connect_timeout_ms = 15000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Interval of the periodic reconnect check.
    pub retry_interval_ms: u64,
    /// Delay before polling a new handle for readiness.
    pub settle_delay_ms: u64,
    /// Force-close a handle still connecting after this long. `None` waits
    /// for the transport to report an outcome.
    pub connect_timeout_ms: Option<u64>,
    /// Whether the host reports visibility (foreground/background) changes.
    pub visibility_detection: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 10_000,
            settle_delay_ms: 250,
            connect_timeout_ms: None,
            visibility_detection: true,
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text.
    ///
    /// Zero intervals are rejected with [`NetworkError::Config`].
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every interval is at least one millisecond.
    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("retry_interval_ms", self.retry_interval_ms == 0),
            ("settle_delay_ms", self.settle_delay_ms == 0),
            ("connect_timeout_ms", self.connect_timeout_ms == Some(0)),
        ];
        match zero.iter().find(|(_, is_zero)| *is_zero) {
            Some((key, _)) => Err(NetworkError::Config(format!("{key} must be at least 1"))),
            None => Ok(()),
        }
    }

    /// Read a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| NetworkError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Set the periodic retry interval. Clamped to at least 1 ms.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = whole_millis(interval);
        self
    }

    /// Set the settle delay. Clamped to at least 1 ms.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = whole_millis(delay);
        self
    }

    /// Set the connect timeout. Clamped to at least 1 ms.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(whole_millis(timeout));
        self
    }

    /// Enable or disable visibility handling.
    pub fn visibility_detection(mut self, enabled: bool) -> Self {
        self.visibility_detection = enabled;
        self
    }

    // Never zero, even when a field was set directly.
    pub(crate) fn retry_interval_duration(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.max(1))
    }

    pub(crate) fn settle_delay_duration(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms.max(1))
    }

    pub(crate) fn connect_timeout_duration(&self) -> Option<Duration> {
        self.connect_timeout_ms
            .map(|ms| Duration::from_millis(ms.max(1)))
    }
}

fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Where the session's server lives: the host it was loaded from and
/// whether that load used a secure scheme.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Host name, optionally with `:port`.
    pub host: String,
    /// Select `wss://` instead of `ws://`.
    #[serde(default)]
    pub secure: bool,
}

impl Location {
    /// A location reached over plain `ws://`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            secure: false,
        }
    }

    /// A location reached over `wss://`.
    pub fn secure(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            secure: true,
        }
    }

    /// The WebSocket endpoint, `{ws|wss}://{host}/ws/`.
    pub fn endpoint(&self) -> Result<Url> {
        if self.host.is_empty() || self.host.contains(['/', '?', '#', '@']) {
            return Err(NetworkError::InvalidUrl(format!("bad host '{}'", self.host)));
        }
        let scheme = if self.secure { "wss" } else { "ws" };
        Ok(Url::parse(&format!("{scheme}://{}{ENDPOINT_PATH}", self.host))?)
    }
}
