//! Command-line argument parsing for the tether console.

use std::path::PathBuf;

use clap::Parser;

/// tether - keep a WebSocket session to a device open from the terminal
///
/// Lines typed on stdin are sent to the server as text messages. Lines
/// starting with `/` are console commands; type `/help` to list them.
#[derive(Parser, Debug)]
#[command(name = "tether", author, version, about)]
pub struct Args {
    /// Server host, optionally with a port (e.g. `device.local:8080`)
    ///
    /// Overrides `[location] host` from the configuration file.
    #[arg(long, env = "TETHER_HOST")]
    pub host: Option<String>,

    /// Connect with `wss://` instead of `ws://`
    #[arg(long, default_value_t = false)]
    pub secure: bool,

    /// Path to a TOML configuration file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Log filter (e.g. "info", "tether_net=debug")
    #[arg(long, env = "TETHER_LOG", default_value = "warn")]
    pub log: String,

    /// Debug-level connection logs with file/line (overrides --log)
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,

    /// Do not open the connection at startup
    #[arg(long, default_value_t = false)]
    pub no_open: bool,
}
