//! Self-healing WebSocket connection for Tether.
//!
//! This crate keeps a single duplex connection to `{ws|wss}://{host}/ws/`
//! alive across network drops and host suspension:
//!
//! - **Connection manager**: The reconnecting state machine, independent of
//!   any runtime or socket library
//! - **WebSocket transport**: tokio-tungstenite sockets for the manager
//! - **Session**: A tokio task that drives a manager and a cloneable handle
//!   to talk to it
//!
//! # Reconnection
//!
//! Once opened, a repeating timer (10 s by default) checks whether the
//! application still wants a connection, the host is in the foreground and
//! no handle exists; if all three hold, a new connection is opened. The same
//! check runs when the host returns to the foreground and when an
//! established connection fails. [`ConnectionManager::close`] turns
//! reconnection off until the next [`ConnectionManager::open`].
//!
//! # Example
//!
//! ```ignore
//! use tether_net::websocket::TungsteniteTransport;
//! use tether_net::{ConnectionConfig, ConnectionManager, Location, Session};
//!
//! let (transport, events) = TungsteniteTransport::new();
//! let manager = ConnectionManager::new(
//!     ConnectionConfig::default(),
//!     Location::new("device.local"),
//!     transport,
//! );
//!
//! let session = Session::spawn(manager, events);
//! let mut messages = session.subscribe();
//!
//! session.open().await?;
//! session.connectivity().wait_for(|&open| open).await?;
//! session.send("{\"cmd\":\"status\"}").await?;
//!
//! while let Ok(message) = messages.recv().await {
//!     println!("{message:?}");
//! }
//! ```

pub mod config;
mod error;
pub mod manager;
pub mod session;
pub mod transport;
pub mod websocket;

pub use config::{ConnectionConfig, ENDPOINT_PATH, Location};
pub use error::{NetworkError, Result};
pub use manager::{ConnectionManager, ConnectionState};
pub use session::{Session, SessionHandle};
pub use transport::{HandleId, Message, ReadyState, Socket, Transport, TransportEvent};
