//! Async driver that owns a [`ConnectionManager`] on a tokio task.
//!
//! The manager is single-threaded. [`Session::spawn`] moves it onto a task
//! that serializes three inputs: commands from [`SessionHandle`]s, transport
//! events, and timer deadlines. No two inputs are ever applied concurrently.

use std::time::Instant;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::error::{NetworkError, Result};
use crate::manager::{ConnectionManager, ConnectionState};
use crate::transport::{Message, Transport};
use crate::websocket::TransportEvents;

/// Inbound messages a lagging subscriber may fall behind by before it
/// starts missing them.
const MESSAGE_BUFFER: usize = 256;

enum Command {
    Open(oneshot::Sender<Result<()>>),
    Close,
    Send(Message, oneshot::Sender<Result<()>>),
    SetHidden(bool),
    State(oneshot::Sender<ConnectionState>),
    Shutdown,
}

/// Spawns connection managers onto the tokio runtime.
pub struct Session;

impl Session {
    /// Move `manager` onto a new task fed by `events`.
    ///
    /// `events` must be the receiver paired with the manager's transport.
    /// The task runs until [`SessionHandle::shutdown`] is called or every
    /// handle is dropped; either way the live connection is closed.
    pub fn spawn<T>(manager: ConnectionManager<T>, events: TransportEvents) -> SessionHandle
    where
        T: Transport + Send + 'static,
        T::Socket: Send,
    {
        let (commands, rx) = mpsc::unbounded_channel();

        let (open_tx, open_rx) = watch::channel(manager.is_open());
        manager.connectivity_changed.connect(move |&open| {
            let _ = open_tx.send(open);
        });

        let (message_tx, _) = broadcast::channel(MESSAGE_BUFFER);
        let forward = message_tx.clone();
        manager.message_received.connect(move |message| {
            // No subscribers is not an error.
            let _ = forward.send(message.clone());
        });

        tokio::spawn(run(manager, events, rx));

        SessionHandle {
            commands,
            connectivity: open_rx,
            messages: message_tx,
        }
    }
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    connectivity: watch::Receiver<bool>,
    messages: broadcast::Sender<Message>,
}

impl SessionHandle {
    /// Open (or reopen) the connection.
    pub async fn open(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.request(Command::Open(tx))?;
        rx.await.map_err(|_| NetworkError::SessionClosed)?
    }

    /// Close the connection and stop reconnecting.
    pub fn close(&self) -> Result<()> {
        self.request(Command::Close)
    }

    /// Send a message on the current connection.
    pub async fn send(&self, message: impl Into<Message>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.request(Command::Send(message.into(), tx))?;
        rx.await.map_err(|_| NetworkError::SessionClosed)?
    }

    /// Report a background (`true`) or foreground (`false`) transition.
    pub fn set_hidden(&self, hidden: bool) -> Result<()> {
        self.request(Command::SetHidden(hidden))
    }

    /// Whether the connection is currently confirmed open.
    pub fn is_open(&self) -> bool {
        *self.connectivity.borrow()
    }

    /// The coarse session state.
    pub async fn state(&self) -> Result<ConnectionState> {
        let (tx, rx) = oneshot::channel();
        self.request(Command::State(tx))?;
        rx.await.map_err(|_| NetworkError::SessionClosed)
    }

    /// A receiver that observes every connectivity change.
    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity.clone()
    }

    /// Subscribe to inbound messages received from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.messages.subscribe()
    }

    /// Stop the session task and close its connection.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    fn request(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| NetworkError::SessionClosed)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("is_open", &self.is_open())
            .finish()
    }
}

async fn run<T>(
    mut manager: ConnectionManager<T>,
    mut events: TransportEvents,
    mut commands: mpsc::UnboundedReceiver<Command>,
) where
    T: Transport,
{
    tracing::debug!(target: "tether_net::session", location = ?manager.location(), "session started");

    loop {
        let deadline = manager.next_timer_deadline();

        tokio::select! {
            cmd = commands.recv() => {
                match cmd {
                    Some(Command::Open(reply)) => {
                        let _ = reply.send(manager.open());
                    }
                    Some(Command::Close) => manager.close(),
                    Some(Command::Send(message, reply)) => {
                        let _ = reply.send(manager.send(message));
                    }
                    Some(Command::SetHidden(hidden)) => manager.set_hidden(hidden),
                    Some(Command::State(reply)) => {
                        let _ = reply.send(manager.state());
                    }
                    Some(Command::Shutdown) | None => break,
                }
            }

            Some((id, event)) = events.recv() => {
                manager.handle_transport_event(id, event);
            }

            _ = sleep_until(deadline) => {
                manager.process_timers();
            }
        }
    }

    tracing::debug!(target: "tether_net::session", "session stopped");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
