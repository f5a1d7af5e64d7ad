//! Core primitives for Tether.
//!
//! This crate provides the building blocks the connection manager is made of:
//!
//! - **Signal/Slot System**: Type-safe notifications with multiple subscribers
//! - **Timers**: One-shot and repeating timers with cancellation
//! - **Clocks**: A monotonic time source that can be swapped for a manual one
//!
//! # Signal Example
//!
//! ```
//! use tether_core::Signal;
//!
//! let connectivity_changed = Signal::<bool>::new();
//!
//! let conn_id = connectivity_changed.connect(|open| {
//!     println!("Connection open: {}", open);
//! });
//!
//! connectivity_changed.emit(true);
//! connectivity_changed.disconnect(conn_id);
//! ```
//!
//! # Timer Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tether_core::{ManualClock, TimerManager};
//!
//! let clock = Arc::new(ManualClock::new());
//! let mut timers = TimerManager::with_clock(clock.clone());
//!
//! let id = timers.start_one_shot(Duration::from_millis(250));
//! assert!(timers.process_expired().is_empty());
//!
//! clock.advance(Duration::from_millis(250));
//! assert_eq!(timers.process_expired(), vec![id]);
//! ```

pub mod clock;
mod error;
pub mod logging;
pub mod signal;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TimerError;
pub use signal::{ConnectionGuard, ConnectionId, Signal};
pub use timer::{TimerId, TimerKind, TimerManager};
