//! WebSocket transport backed by tokio-tungstenite.
//!
//! Supports `ws://` and `wss://` endpoints. Ping/pong is handled by
//! tungstenite; text and binary payloads are delivered unchanged.
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
//!     Location::new("localhost:8080"),
//!     transport,
//! );
//! let session = Session::spawn(manager, events);
//! session.open().await?;
//! ```

mod client;

pub use client::{TransportEvents, TungsteniteSocket, TungsteniteTransport};
