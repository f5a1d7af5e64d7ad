//! Logging setup for the console.
//!
//! Logs go to stderr so they never interleave with received messages on
//! stdout.

use tether_core::logging::targets;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{CliError, Result};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive (e.g., "info", "tether_net::connection=debug").
    pub filter: String,
    /// Include file/line in log lines.
    pub file_line: bool,
}

impl LogConfig {
    /// Configuration for the given filter.
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            file_line: false,
        }
    }

    /// Debug output from the connection, transport and session, with
    /// file/line.
    pub fn verbose() -> Self {
        let filter = [targets::CONNECTION, targets::WEBSOCKET, targets::SESSION]
            .iter()
            .fold(String::from("warn"), |acc, target| format!("{acc},{target}=debug"));
        Self {
            filter,
            file_line: true,
        }
    }

    /// Build the filter, rejecting malformed directives.
    pub fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.filter)
            .map_err(|e| CliError::Logging(format!("invalid log filter '{}': {e}", self.filter)))
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = config.env_filter()?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_file(config.file_line)
        .with_line_number(config.file_line)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))
}
