//! Error types for the networking module.

/// Network-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// A message was sent while no connection handle exists.
    #[error("No connection to remote! - Refresh and try again.")]
    NotConnected,
    /// The transport cannot be used in this environment.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),
    /// Invalid URL or host provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// WebSocket protocol or I/O failure.
    #[error("WebSocket error: {0}")]
    WebSocket(String),
    /// Configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
    /// The session driver has shut down.
    #[error("Session has shut down")]
    SessionClosed,
}

impl From<url::ParseError> for NetworkError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<toml::de::Error> for NetworkError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for NetworkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

/// A specialized Result type for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
