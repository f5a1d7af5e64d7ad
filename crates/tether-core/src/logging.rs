//! Tracing targets used across Tether.
//!
//! Tether emits structured events through the `tracing` crate and never
//! installs a subscriber itself. Applications choose one, for example:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("tether_net::connection=debug")
//!     .init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core primitives target.
    pub const CORE: &str = "tether_core";
    /// Timer system target.
    pub const TIMER: &str = "tether_core::timer";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "tether_core::signal";
    /// Connection state machine target.
    pub const CONNECTION: &str = "tether_net::connection";
    /// WebSocket transport target.
    pub const WEBSOCKET: &str = "tether_net::websocket";
    /// Session driver target.
    pub const SESSION: &str = "tether_net::session";
}
