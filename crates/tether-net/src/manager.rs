//! The reconnecting connection state machine.
//!
//! [`ConnectionManager`] keeps one duplex connection to the server alive. It
//! owns at most one socket handle, a repeating retry timer and a one-shot
//! settle timer, and three pieces of intent: whether the application closed
//! the connection, whether the host is suspended (backgrounded), and whether
//! the current handle is confirmed open.
//!
//! The manager does no I/O and never blocks. A driver feeds it three kinds of
//! input, one at a time:
//!
//! - calls from the application ([`open`](ConnectionManager::open),
//!   [`close`](ConnectionManager::close), [`send`](ConnectionManager::send),
//!   [`set_hidden`](ConnectionManager::set_hidden)),
//! - transport callbacks ([`handle_transport_event`](ConnectionManager::handle_transport_event)),
//! - timer expiry ([`process_timers`](ConnectionManager::process_timers)).
//!
//! The only automatic reopen path is level-triggered: the retry timer, the
//! return to foreground and a transport error on an established connection
//! all re-check the current intent, and reopen only when the application
//! wants a connection, the host is in the foreground, and no handle exists.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tether_core::{Clock, Signal, SystemClock, TimerId, TimerManager};

use crate::config::{ConnectionConfig, Location};
use crate::error::{NetworkError, Result};
use crate::transport::{HandleId, Message, ReadyState, Socket, Transport, TransportEvent};

/// Coarse state of a connection session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No handle and none being opened: never opened, or waiting for the
    /// retry timer.
    #[default]
    Idle,
    /// A handle exists but is not confirmed open.
    Connecting,
    /// The handle is confirmed open.
    Open,
    /// The host is backgrounded; reconnection is paused.
    Suspended,
    /// The application closed the connection; reconnection is off until the
    /// next [`ConnectionManager::open`].
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Suspended => write!(f, "Suspended"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// The handle currently owned by the manager.
struct ActiveHandle<S> {
    id: HandleId,
    socket: S,
    created_at: Instant,
    /// Set once the handle has been observed open.
    reached_open: bool,
}

/// A self-healing connection to `{ws|wss}://{host}/ws/`.
///
/// # Signals
///
/// - [`connectivity_changed`](Self::connectivity_changed): emitted exactly
///   once per transition of [`is_open`](Self::is_open), with the new value
/// - [`message_received`](Self::message_received): emitted once per inbound
///   message, with the payload unchanged
///
/// # Example
///
/// ```ignore
/// let (transport, events) = TungsteniteTransport::new();
/// let mut manager = ConnectionManager::new(
///     ConnectionConfig::default(),
///     Location::new("localhost:8080"),
///     transport,
/// );
///
/// manager.connectivity_changed.connect(|open| println!("open: {open}"));
/// manager.message_received.connect(|msg| println!("got {msg:?}"));
///
/// manager.open()?;
/// ```
pub struct ConnectionManager<T: Transport> {
    config: ConnectionConfig,
    location: Location,
    transport: T,
    timers: TimerManager,

    handle: Option<ActiveHandle<T::Socket>>,
    last_handle_id: u64,

    intent_closed: bool,
    suspended: bool,
    opened: bool,

    retry_timer: Option<TimerId>,
    settle_timer: Option<TimerId>,
    visibility_installed: bool,

    /// Signal emitted when the open/closed state changes.
    pub connectivity_changed: Signal<bool>,
    /// Signal emitted when a message arrives.
    pub message_received: Signal<Message>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager on the system clock. Nothing connects until
    /// [`open`](Self::open) is called.
    pub fn new(config: ConnectionConfig, location: Location, transport: T) -> Self {
        Self::with_clock(config, location, transport, Arc::new(SystemClock))
    }

    /// Create a manager whose timers read time from `clock`.
    pub fn with_clock(
        config: ConnectionConfig,
        location: Location,
        transport: T,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            location,
            transport,
            timers: TimerManager::with_clock(clock),
            handle: None,
            last_handle_id: 0,
            intent_closed: true,
            suspended: false,
            opened: false,
            retry_timer: None,
            settle_timer: None,
            visibility_installed: false,
            connectivity_changed: Signal::new(),
            message_received: Signal::new(),
        }
    }

    /// Open the connection, replacing any existing handle.
    ///
    /// Clears a previous [`close`](Self::close). The first successful call
    /// also starts the periodic retry timer and, when configured, begins
    /// honouring [`set_hidden`](Self::set_hidden).
    ///
    /// Returns [`NetworkError::TransportUnavailable`] without changing any
    /// state if the transport cannot be used. Other errors mean the handle
    /// could not be created; the retry timer will try again.
    pub fn open(&mut self) -> Result<()> {
        if let Err(e) = self.transport.check_available() {
            tracing::warn!(target: "tether_net::connection", error = %e, "transport unavailable, not opening");
            return Err(e);
        }

        self.intent_closed = false;
        if let Some(old) = self.handle.take() {
            tracing::debug!(target: "tether_net::connection", handle = %old.id, "closing old connection");
            old.socket.close();
        }
        self.set_opened(false);

        let result = self.begin_connect();
        if let Err(e) = &result {
            tracing::warn!(target: "tether_net::connection", error = %e, "failed to start connection");
        }

        if self.retry_timer.is_none() {
            self.retry_timer = Some(
                self.timers
                    .start_repeating(self.config.retry_interval_duration()),
            );
            if self.config.visibility_detection {
                self.visibility_installed = true;
                tracing::debug!(target: "tether_net::connection", "visibility handling enabled");
            }
        }

        result
    }

    /// Whether the current handle is confirmed open.
    pub fn is_open(&self) -> bool {
        self.opened
    }

    /// Close the connection and stop reconnecting until the next
    /// [`open`](Self::open).
    pub fn close(&mut self) {
        self.intent_closed = true;
        if let Some(active) = &self.handle {
            tracing::info!(target: "tether_net::connection", handle = %active.id, "closing connection");
            active.socket.close();
        }
        self.cancel_settle_timer();
        self.set_opened(false);
    }

    /// Send a message on the current handle.
    ///
    /// Returns [`NetworkError::NotConnected`] immediately when no handle
    /// exists. Nothing is queued or retried; the caller must send again once
    /// the connection is back.
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        match &self.handle {
            Some(active) => active.socket.send(message.into()),
            None => {
                tracing::warn!(target: "tether_net::connection", "send attempted with no connection");
                Err(NetworkError::NotConnected)
            }
        }
    }

    /// Report that the host moved to the background (`true`) or foreground
    /// (`false`).
    ///
    /// Going to the background closes any handle and pauses reconnection.
    /// Returning to the foreground reconnects if nothing else prevents it.
    /// Ignored until the first [`open`](Self::open), and always ignored when
    /// visibility detection is disabled.
    pub fn set_hidden(&mut self, hidden: bool) {
        if !self.visibility_installed {
            tracing::trace!(target: "tether_net::connection", hidden, "visibility change ignored");
            return;
        }

        self.suspended = hidden;
        if hidden {
            tracing::debug!(target: "tether_net::connection", "suspending");
            if let Some(active) = &self.handle {
                active.socket.close();
            }
            self.set_opened(false);
        } else {
            tracing::debug!(target: "tether_net::connection", "resuming");
            self.maybe_reconnect();
        }
    }

    /// Apply a callback from the transport.
    ///
    /// Events from any handle other than the current one are ignored.
    pub fn handle_transport_event(&mut self, id: HandleId, event: TransportEvent) {
        if self.current_handle() != Some(id) {
            tracing::trace!(
                target: "tether_net::connection",
                handle = %id,
                event = event.kind(),
                "ignoring event from stale handle"
            );
            return;
        }

        match event {
            TransportEvent::Ready => {
                tracing::debug!(target: "tether_net::connection", handle = %id, "ready");
                self.check_open_state();
            }
            TransportEvent::Message(message) => {
                self.message_received.emit(message);
            }
            TransportEvent::Error(reason) => {
                tracing::warn!(target: "tether_net::connection", handle = %id, %reason, "transport error");
                let was_open = self.release_handle();
                self.set_opened(false);
                if was_open {
                    self.maybe_reconnect();
                }
            }
            TransportEvent::Closed => {
                tracing::info!(target: "tether_net::connection", handle = %id, "connection closed");
                self.set_opened(false);
                self.handle = None;
                self.cancel_settle_timer();
            }
        }
    }

    /// Run every timer that is due.
    pub fn process_timers(&mut self) {
        for id in self.timers.process_expired() {
            if self.settle_timer == Some(id) {
                // One-shot timers are already gone once fired.
                self.settle_timer = None;
                self.check_open_state();
            } else if self.retry_timer == Some(id) {
                self.maybe_reconnect();
            }
        }
    }

    /// When [`process_timers`](Self::process_timers) next has work.
    pub fn next_timer_deadline(&mut self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// The coarse session state.
    pub fn state(&self) -> ConnectionState {
        if self.retry_timer.is_none() && self.handle.is_none() {
            ConnectionState::Idle
        } else if self.intent_closed {
            ConnectionState::Closed
        } else if self.suspended {
            ConnectionState::Suspended
        } else if self.opened {
            ConnectionState::Open
        } else if self.handle.is_some() {
            ConnectionState::Connecting
        } else {
            ConnectionState::Idle
        }
    }

    /// The ID of the handle currently owned, if any.
    pub fn current_handle(&self) -> Option<HandleId> {
        self.handle.as_ref().map(|active| active.id)
    }

    /// The server location.
    pub fn location(&self) -> &Location {
        &self.location
    }

    fn begin_connect(&mut self) -> Result<()> {
        let url = self.location.endpoint()?;
        self.last_handle_id += 1;
        let id = HandleId(self.last_handle_id);
        tracing::info!(target: "tether_net::connection", handle = %id, %url, "opening connection");

        let socket = self.transport.connect(id, &url)?;
        self.handle = Some(ActiveHandle {
            id,
            socket,
            created_at: self.timers.clock().now(),
            reached_open: false,
        });
        self.arm_settle_timer();
        Ok(())
    }

    fn maybe_reconnect(&mut self) {
        if self.suspended || self.intent_closed || self.handle.is_some() {
            return;
        }
        tracing::debug!(target: "tether_net::connection", "reconnecting");
        // open() logs its own failures and the retry timer keeps running.
        let _ = self.open();
    }

    /// Settle check: flips `opened` once the current handle is ready.
    fn check_open_state(&mut self) {
        self.cancel_settle_timer();

        let now = self.timers.clock().now();
        let Some(active) = self.handle.as_mut() else {
            return;
        };
        let elapsed = now.saturating_duration_since(active.created_at);

        match active.socket.ready_state() {
            ReadyState::Open => {
                active.reached_open = true;
                if !self.opened {
                    self.set_opened(true);
                    tracing::info!(
                        target: "tether_net::connection",
                        elapsed_ms = elapsed.as_millis() as u64,
                        "connected after {} ms",
                        elapsed.as_millis()
                    );
                }
            }
            ReadyState::Connecting => {
                if self.connect_timed_out(elapsed) {
                    tracing::warn!(
                        target: "tether_net::connection",
                        elapsed_ms = elapsed.as_millis() as u64,
                        "still connecting, abandoning handle"
                    );
                    self.release_handle();
                    self.set_opened(false);
                    self.maybe_reconnect();
                } else {
                    self.arm_settle_timer();
                }
            }
            ReadyState::Closing | ReadyState::Closed => {}
        }
    }

    fn connect_timed_out(&self, elapsed: Duration) -> bool {
        self.config
            .connect_timeout_duration()
            .is_some_and(|limit| elapsed >= limit)
    }

    /// Close and drop the current handle. Returns whether it had been open.
    fn release_handle(&mut self) -> bool {
        self.cancel_settle_timer();
        match self.handle.take() {
            Some(active) => {
                let was_open =
                    active.reached_open || active.socket.ready_state() == ReadyState::Open;
                active.socket.close();
                was_open
            }
            None => false,
        }
    }

    fn arm_settle_timer(&mut self) {
        if self.settle_timer.is_none() {
            self.settle_timer = Some(
                self.timers
                    .start_one_shot(self.config.settle_delay_duration()),
            );
        }
    }

    fn cancel_settle_timer(&mut self) {
        if let Some(id) = self.settle_timer.take() {
            // Already gone if it fired in this batch.
            let _ = self.timers.stop(id);
        }
    }

    fn set_opened(&mut self, opened: bool) {
        if self.opened != opened {
            self.opened = opened;
            tracing::debug!(target: "tether_net::connection", opened, "connectivity changed");
            self.connectivity_changed.emit(opened);
        }
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        if let Some(active) = self.handle.take() {
            active.socket.close();
        }
    }
}

impl<T: Transport> fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("location", &self.location)
            .field("state", &self.state())
            .field("handle", &self.current_handle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use parking_lot::Mutex;
    use tether_core::ManualClock;
    use url::Url;

    use super::*;

    #[derive(Default)]
    struct FakeLog {
        connects: Vec<(HandleId, Url)>,
        states: HashMap<HandleId, ReadyState>,
        sent: Vec<(HandleId, Message)>,
        close_requests: Vec<HandleId>,
    }

    struct FakeSocket {
        id: HandleId,
        log: Arc<Mutex<FakeLog>>,
    }

    impl Socket for FakeSocket {
        fn ready_state(&self) -> ReadyState {
            self.log.lock().states[&self.id]
        }

        fn send(&self, message: Message) -> Result<()> {
            self.log.lock().sent.push((self.id, message));
            Ok(())
        }

        fn close(&self) {
            let mut log = self.log.lock();
            log.close_requests.push(self.id);
            let state = log.states.entry(self.id).or_default();
            if *state != ReadyState::Closed {
                *state = ReadyState::Closing;
            }
        }
    }

    struct FakeTransport {
        log: Arc<Mutex<FakeLog>>,
        available: bool,
        refuse_connect: bool,
    }

    impl Transport for FakeTransport {
        type Socket = FakeSocket;

        fn check_available(&self) -> Result<()> {
            if self.available {
                Ok(())
            } else {
                Err(NetworkError::TransportUnavailable("no sockets here".into()))
            }
        }

        fn connect(&mut self, id: HandleId, url: &Url) -> Result<FakeSocket> {
            if self.refuse_connect {
                return Err(NetworkError::WebSocket("refused".into()));
            }
            let mut log = self.log.lock();
            log.connects.push((id, url.clone()));
            log.states.insert(id, ReadyState::Connecting);
            Ok(FakeSocket {
                id,
                log: self.log.clone(),
            })
        }
    }

    struct Harness {
        clock: Arc<ManualClock>,
        log: Arc<Mutex<FakeLog>>,
        manager: ConnectionManager<FakeTransport>,
        changes: Arc<Mutex<Vec<bool>>>,
        messages: Arc<Mutex<Vec<Message>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(ConnectionConfig::default())
        }

        fn with_config(config: ConnectionConfig) -> Self {
            let clock = Arc::new(ManualClock::new());
            let log = Arc::new(Mutex::new(FakeLog::default()));
            let transport = FakeTransport {
                log: log.clone(),
                available: true,
                refuse_connect: false,
            };
            let manager = ConnectionManager::with_clock(
                config,
                Location::new("device.local"),
                transport,
                clock.clone(),
            );

            let changes = Arc::new(Mutex::new(Vec::new()));
            let changes_clone = changes.clone();
            manager
                .connectivity_changed
                .connect(move |&open| changes_clone.lock().push(open));

            let messages = Arc::new(Mutex::new(Vec::new()));
            let messages_clone = messages.clone();
            manager
                .message_received
                .connect(move |msg| messages_clone.lock().push(msg.clone()));

            Self {
                clock,
                log,
                manager,
                changes,
                messages,
            }
        }

        fn advance(&mut self, duration: Duration) {
            self.clock.advance(duration);
            self.manager.process_timers();
        }

        fn connects(&self) -> usize {
            self.log.lock().connects.len()
        }

        fn handle(&self, n: usize) -> HandleId {
            self.log.lock().connects[n].0
        }

        fn state_of(&self, id: HandleId) -> ReadyState {
            self.log.lock().states[&id]
        }

        fn set_state(&self, id: HandleId, state: ReadyState) {
            self.log.lock().states.insert(id, state);
        }

        fn ready(&mut self, id: HandleId) {
            self.set_state(id, ReadyState::Open);
            self.manager.handle_transport_event(id, TransportEvent::Ready);
        }

        fn closed(&mut self, id: HandleId) {
            self.set_state(id, ReadyState::Closed);
            self.manager.handle_transport_event(id, TransportEvent::Closed);
        }

        fn changes(&self) -> Vec<bool> {
            self.changes.lock().clone()
        }

        /// Handles neither closed nor asked to close.
        fn live_handles(&self) -> usize {
            let log = self.log.lock();
            log.states
                .values()
                .filter(|s| matches!(s, ReadyState::Connecting | ReadyState::Open))
                .count()
        }
    }

    fn retry() -> Duration {
        Duration::from_secs(10)
    }

    #[test]
    fn test_open_then_ready_reports_open_once() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        assert_eq!(h.log.lock().connects[0].1.as_str(), "ws://device.local/ws/");

        let id = h.handle(0);
        h.ready(id);

        assert!(h.manager.is_open());
        assert_eq!(h.manager.state(), ConnectionState::Open);
        assert_eq!(h.changes(), vec![true]);
        assert!(h.manager.settle_timer.is_none());

        // The pending settle poll found nothing new to report.
        h.advance(Duration::from_millis(250));
        assert_eq!(h.changes(), vec![true]);
    }

    #[test]
    fn test_secure_location_uses_wss() {
        let clock = Arc::new(ManualClock::new());
        let log = Arc::new(Mutex::new(FakeLog::default()));
        let transport = FakeTransport {
            log: log.clone(),
            available: true,
            refuse_connect: false,
        };
        let mut manager = ConnectionManager::with_clock(
            ConnectionConfig::default(),
            Location::secure("device.local"),
            transport,
            clock,
        );
        manager.open().unwrap();
        assert_eq!(log.lock().connects[0].1.as_str(), "wss://device.local/ws/");
    }

    #[test]
    fn test_closed_then_retry_reopens_once() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        let first = h.handle(0);
        h.ready(first);
        h.closed(first);

        assert!(!h.manager.is_open());
        assert_eq!(h.changes(), vec![true, false]);
        assert_eq!(h.manager.current_handle(), None);
        assert_eq!(h.manager.state(), ConnectionState::Idle);

        h.advance(retry());
        assert_eq!(h.connects(), 2);
        assert_eq!(h.manager.current_handle(), Some(h.handle(1)));
        assert!(h.handle(1) > first);

        // A handle exists, so further ticks do nothing.
        h.advance(retry());
        assert_eq!(h.connects(), 2);
    }

    #[test]
    fn test_repeated_open_keeps_one_handle_and_no_duplicate_notifications() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        h.manager.open().unwrap();

        assert!(h.changes().is_empty());
        assert_eq!(h.connects(), 2);
        let first = h.handle(0);
        assert_eq!(h.log.lock().close_requests, vec![first]);
        assert_eq!(h.live_handles(), 1);

        let current = h.handle(1);
        h.ready(current);
        h.manager.open().unwrap();
        assert_eq!(h.changes(), vec![true, false]);
        assert_eq!(h.live_handles(), 1);
    }

    #[test]
    fn test_close_suppresses_automatic_reopen() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        let id = h.handle(0);
        h.ready(id);

        h.manager.close();
        assert_eq!(h.manager.state(), ConnectionState::Closed);
        assert_eq!(h.changes(), vec![true, false]);
        assert_eq!(h.log.lock().close_requests, vec![id]);

        // Error before the close completes: no reopen.
        h.manager
            .handle_transport_event(id, TransportEvent::Error("reset".into()));
        h.advance(retry());
        h.advance(retry());
        assert_eq!(h.connects(), 1);
        assert_eq!(h.changes(), vec![true, false]);

        h.manager.open().unwrap();
        assert_eq!(h.connects(), 2);
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_close_then_closed_event_stays_down() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        let id = h.handle(0);
        h.ready(id);
        h.manager.close();
        h.closed(id);

        h.advance(retry() * 3);
        assert_eq!(h.connects(), 1);
        assert_eq!(h.manager.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_hidden_then_visible_reopens_exactly_once() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        let id = h.handle(0);
        h.ready(id);

        h.manager.set_hidden(true);
        assert_eq!(h.manager.state(), ConnectionState::Suspended);
        assert_eq!(h.changes(), vec![true, false]);
        assert_eq!(h.log.lock().close_requests, vec![id]);
        h.closed(id);

        h.manager.set_hidden(false);
        assert_eq!(h.connects(), 2);

        h.advance(retry());
        assert_eq!(h.connects(), 2);
    }

    #[test]
    fn test_suspended_blocks_retry_timer() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        let id = h.handle(0);
        h.ready(id);
        h.manager.set_hidden(true);
        h.closed(id);

        h.advance(retry() * 3);
        assert_eq!(h.connects(), 1);
        assert_eq!(h.manager.state(), ConnectionState::Suspended);
    }

    #[test]
    fn test_visible_before_close_completes_waits_for_retry() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        let id = h.handle(0);
        h.ready(id);

        h.manager.set_hidden(true);
        h.manager.set_hidden(false);
        assert_eq!(h.connects(), 1);

        h.closed(id);
        h.advance(retry());
        assert_eq!(h.connects(), 2);
    }

    #[test]
    fn test_visibility_ignored_when_disabled() {
        let mut h = Harness::with_config(ConnectionConfig::new().visibility_detection(false));
        h.manager.open().unwrap();
        let id = h.handle(0);
        h.ready(id);

        h.manager.set_hidden(true);
        assert!(h.manager.is_open());
        assert!(h.log.lock().close_requests.is_empty());
    }

    #[test]
    fn test_visibility_ignored_before_first_open() {
        let mut h = Harness::new();
        h.manager.set_hidden(true);
        h.manager.set_hidden(false);
        assert_eq!(h.connects(), 0);
        assert_eq!(h.manager.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_send_without_handle_fails_synchronously() {
        let h = Harness::new();
        assert_eq!(h.manager.send("hello"), Err(NetworkError::NotConnected));
        assert!(h.log.lock().sent.is_empty());
    }

    #[test]
    fn test_send_forwards_verbatim() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        let id = h.handle(0);

        h.manager.send("{\"led\":1}").unwrap();
        h.manager.send(vec![0u8, 1, 2]).unwrap();

        let sent = h.log.lock().sent.clone();
        assert_eq!(
            sent,
            vec![
                (id, Message::Text("{\"led\":1}".into())),
                (id, Message::Binary(vec![0, 1, 2])),
            ]
        );
    }

    #[test]
    fn test_messages_forwarded_unchanged() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        let id = h.handle(0);
        h.ready(id);

        h.manager
            .handle_transport_event(id, TransportEvent::Message("not json {".into()));
        h.manager
            .handle_transport_event(id, TransportEvent::Message(vec![9u8].into()));

        assert_eq!(
            *h.messages.lock(),
            vec![Message::Text("not json {".into()), Message::Binary(vec![9])]
        );
    }

    #[test]
    fn test_settle_timer_detects_ready_without_callback() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        h.set_state(h.handle(0), ReadyState::Open);

        h.advance(Duration::from_millis(249));
        assert!(!h.manager.is_open());

        h.advance(Duration::from_millis(1));
        assert!(h.manager.is_open());
        assert_eq!(h.changes(), vec![true]);
        assert!(h.manager.settle_timer.is_none());
    }

    #[test]
    fn test_settle_timer_rearms_while_connecting() {
        let mut h = Harness::new();
        h.manager.open().unwrap();

        h.advance(Duration::from_millis(250));
        assert!(!h.manager.is_open());
        assert!(h.manager.settle_timer.is_some());

        h.advance(Duration::from_millis(250));
        h.set_state(h.handle(0), ReadyState::Open);
        h.advance(Duration::from_millis(250));
        assert!(h.manager.is_open());
        assert!(h.manager.settle_timer.is_none());
    }

    #[test]
    fn test_closed_event_cancels_settle_timer() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        let id = h.handle(0);
        assert!(h.manager.settle_timer.is_some());

        h.closed(id);
        assert!(h.manager.settle_timer.is_none());
        assert_eq!(h.manager.next_timer_deadline(), Some(h.clock.now() + retry()));
    }

    #[test]
    fn test_connect_timeout_abandons_stuck_handle() {
        let config = ConnectionConfig::new().connect_timeout(Duration::from_secs(1));
        let mut h = Harness::with_config(config);
        h.manager.open().unwrap();
        let stuck = h.handle(0);

        for _ in 0..4 {
            h.advance(Duration::from_millis(250));
        }

        assert_eq!(h.connects(), 2);
        assert_eq!(h.log.lock().close_requests, vec![stuck]);
        assert_eq!(h.manager.current_handle(), Some(h.handle(1)));
        assert!(h.changes().is_empty());
    }

    #[test]
    fn test_stuck_handle_kept_without_timeout() {
        let mut h = Harness::new();
        h.manager.open().unwrap();

        h.advance(retry() * 3);
        assert_eq!(h.connects(), 1);
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_events_from_replaced_handle_are_ignored() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        let old = h.handle(0);
        h.manager.open().unwrap();
        let new = h.handle(1);

        h.ready(old);
        h.manager
            .handle_transport_event(old, TransportEvent::Message("late".into()));
        h.closed(old);
        h.manager
            .handle_transport_event(old, TransportEvent::Error("late".into()));

        assert!(!h.manager.is_open());
        assert!(h.messages.lock().is_empty());
        assert_eq!(h.manager.current_handle(), Some(new));
        assert!(h.changes().is_empty());
    }

    #[test]
    fn test_error_on_established_connection_reopens_immediately() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        let id = h.handle(0);
        h.ready(id);

        h.manager
            .handle_transport_event(id, TransportEvent::Error("reset by peer".into()));

        assert_eq!(h.changes(), vec![true, false]);
        assert_eq!(h.log.lock().close_requests, vec![id]);
        assert_eq!(h.connects(), 2);
        assert_eq!(h.live_handles(), 1);

        // The superseded handle's close callback changes nothing.
        h.closed(id);
        assert_eq!(h.manager.current_handle(), Some(h.handle(1)));
    }

    #[test]
    fn test_error_while_connecting_waits_for_retry() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        let id = h.handle(0);

        h.manager
            .handle_transport_event(id, TransportEvent::Error("refused".into()));
        assert_eq!(h.connects(), 1);
        assert_eq!(h.manager.current_handle(), None);
        assert!(h.manager.settle_timer.is_none());

        h.advance(retry());
        assert_eq!(h.connects(), 2);
    }

    #[test]
    fn test_unavailable_transport_is_reported() {
        let mut h = Harness::new();
        h.manager.transport.available = false;

        let err = h.manager.open().unwrap_err();
        assert!(matches!(err, NetworkError::TransportUnavailable(_)));
        assert_eq!(h.manager.state(), ConnectionState::Idle);
        assert_eq!(h.manager.next_timer_deadline(), None);

        h.advance(retry());
        assert_eq!(h.connects(), 0);
    }

    #[test]
    fn test_failed_connect_is_retried_by_timer() {
        let mut h = Harness::new();
        h.manager.transport.refuse_connect = true;
        assert!(h.manager.open().is_err());
        assert_eq!(h.manager.state(), ConnectionState::Idle);

        h.manager.transport.refuse_connect = false;
        h.advance(retry());
        assert_eq!(h.connects(), 1);
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_zero_intervals_still_move_deadlines_forward() {
        let config = ConnectionConfig {
            retry_interval_ms: 0,
            settle_delay_ms: 0,
            ..ConnectionConfig::default()
        };
        let mut h = Harness::with_config(config);
        h.manager.open().unwrap();

        for _ in 0..3 {
            let deadline = h.manager.next_timer_deadline().unwrap();
            assert!(deadline > h.clock.now());
            h.advance(Duration::from_millis(1));
        }
        assert_eq!(h.connects(), 1);
    }

    #[test]
    fn test_action_sequences_keep_invariants() {
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for run in 0..1000 {
            let mut h = Harness::new();
            for step in 0..30 {
                let current = h.manager.current_handle();
                match next() % 9 {
                    0 => {
                        let _ = h.manager.open();
                    }
                    1 => h.manager.close(),
                    2 => h.manager.set_hidden(true),
                    3 => h.manager.set_hidden(false),
                    4 => {
                        // Only a handle still handshaking can become ready.
                        if let Some(id) = current
                            && h.state_of(id) == ReadyState::Connecting
                        {
                            h.ready(id);
                        }
                    }
                    5 => {
                        if let Some(id) = current {
                            h.closed(id);
                        }
                    }
                    6 => {
                        if let Some(id) = current {
                            h.manager
                                .handle_transport_event(id, TransportEvent::Error("reset".into()));
                        }
                    }
                    7 => h.advance(Duration::from_millis(250)),
                    _ => h.advance(retry()),
                }

                let at = format!("run {run} step {step}");
                assert!(h.live_handles() <= 1, "{at}: more than one live handle");

                let changes = h.changes();
                assert_ne!(changes.first(), Some(&false), "{at}: first notification was false");
                assert!(
                    changes.windows(2).all(|pair| pair[0] != pair[1]),
                    "{at}: repeated notification {changes:?}"
                );

                if h.manager.is_open() {
                    let id = h.manager.current_handle().expect("open without a handle");
                    assert_eq!(h.state_of(id), ReadyState::Open, "{at}");
                }
            }
        }
    }

    #[test]
    fn test_drop_closes_live_handle() {
        let mut h = Harness::new();
        h.manager.open().unwrap();
        let id = h.handle(0);
        let log = h.log.clone();

        drop(h);
        assert_eq!(log.lock().close_requests, vec![id]);
    }
}
