//! Error type for the console binary.

use std::path::PathBuf;

use tether_net::NetworkError;

/// Console errors.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// No host on the command line or in the configuration file.
    #[error("no server host given; pass --host or set [location] host in the config file")]
    MissingHost,

    /// Configuration file could not be read or parsed.
    #[error("failed to load config from {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Configuration text is not valid TOML.
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Logging could not be initialized.
    #[error("failed to initialize logging: {0}")]
    Logging(String),

    /// Connection error.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Terminal I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for console operations.
pub type Result<T> = std::result::Result<T, CliError>;
