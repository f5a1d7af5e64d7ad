//! Console configuration file.
//!
//! The file holds the connection settings at the top level and an optional
//! `[location]` table:
//!
//! ```toml
//! retry_interval_ms = 5000
//!
//! [location]
//! host = "device.local:8080"
//! secure = false
//! ```

use std::path::Path;

use serde::Deserialize;
use tether_net::{ConnectionConfig, Location};

use crate::cli::Args;
use crate::error::{CliError, Result};

#[derive(Debug, Default, Deserialize)]
struct LocationTable {
    location: Option<Location>,
}

/// Everything the console needs to start a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub connection: ConnectionConfig,
    pub location: Option<Location>,
}

impl ConsoleConfig {
    /// Parse the configuration file text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let connection = ConnectionConfig::from_toml_str(text)?;
        let table: LocationTable = toml::from_str(text)?;
        Ok(Self {
            connection,
            location: table.location,
        })
    }

    /// Read the configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let config_error = |message: String| CliError::Config {
            path: path.to_path_buf(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        Self::from_toml_str(&text).map_err(|e| config_error(e.to_string()))
    }

    /// Combine the optional file with command-line flags. A host given on
    /// the command line replaces the file's location entirely.
    pub fn resolve(args: &Args) -> Result<(ConnectionConfig, Location)> {
        let file = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self {
                connection: ConnectionConfig::default(),
                location: None,
            },
        };

        let location = match &args.host {
            Some(host) => Location {
                host: host.clone(),
                secure: args.secure,
            },
            None => {
                let mut location = file.location.ok_or(CliError::MissingHost)?;
                location.secure |= args.secure;
                location
            }
        };

        Ok((file.connection, location))
    }
}
