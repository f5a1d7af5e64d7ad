//! [`Transport`] implementation over tokio-tungstenite.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::error::{NetworkError, Result};
use crate::transport::{HandleId, Message, ReadyState, Socket, Transport, TransportEvent};

/// Receiving end of the event stream shared by every handle a
/// [`TungsteniteTransport`] creates.
pub type TransportEvents = mpsc::UnboundedReceiver<(HandleId, TransportEvent)>;

type EventSender = mpsc::UnboundedSender<(HandleId, TransportEvent)>;

/// Commands sent to a connection task.
enum Command {
    Send(Message),
    Close,
}

/// Opens WebSocket connections on the current tokio runtime.
///
/// Each [`connect`](Transport::connect) spawns one task that owns the
/// stream. Lifecycle callbacks from every task are funnelled, tagged with
/// their [`HandleId`], into the single [`TransportEvents`] receiver returned
/// by [`new`](Self::new).
#[derive(Debug, Clone)]
pub struct TungsteniteTransport {
    events: EventSender,
}

impl TungsteniteTransport {
    /// Create a transport and the receiver its events arrive on.
    pub fn new() -> (Self, TransportEvents) {
        // wss:// needs a process-wide crypto provider. Ignore the error if
        // one is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }
}

impl Transport for TungsteniteTransport {
    type Socket = TungsteniteSocket;

    fn check_available(&self) -> Result<()> {
        tokio::runtime::Handle::try_current()
            .map(|_| ())
            .map_err(|e| NetworkError::TransportUnavailable(e.to_string()))
    }

    fn connect(&mut self, id: HandleId, url: &Url) -> Result<TungsteniteSocket> {
        let state = Arc::new(AtomicU8::new(encode(ReadyState::Connecting)));
        let (commands, rx) = mpsc::unbounded_channel();

        tokio::spawn(run_connection(
            id,
            url.to_string(),
            state.clone(),
            rx,
            self.events.clone(),
        ));

        Ok(TungsteniteSocket { state, commands })
    }
}

/// A handle to one connection task.
#[derive(Debug)]
pub struct TungsteniteSocket {
    state: Arc<AtomicU8>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Socket for TungsteniteSocket {
    fn ready_state(&self) -> ReadyState {
        decode(self.state.load(Ordering::Acquire))
    }

    fn send(&self, message: Message) -> Result<()> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(NetworkError::WebSocket(format!(
                "cannot send on {} connection",
                state.to_string().to_lowercase()
            )));
        }
        self.commands
            .send(Command::Send(message))
            .map_err(|_| NetworkError::WebSocket("connection task has exited".into()))
    }

    fn close(&self) {
        let _ = self.state.compare_exchange(
            encode(ReadyState::Connecting),
            encode(ReadyState::Closing),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let _ = self.state.compare_exchange(
            encode(ReadyState::Open),
            encode(ReadyState::Closing),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        // The task may already be gone.
        let _ = self.commands.send(Command::Close);
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send(message) => write!(f, "Send({} bytes)", message.len()),
            Self::Close => write!(f, "Close"),
        }
    }
}

fn encode(state: ReadyState) -> u8 {
    match state {
        ReadyState::Connecting => 0,
        ReadyState::Open => 1,
        ReadyState::Closing => 2,
        ReadyState::Closed => 3,
    }
}

fn decode(value: u8) -> ReadyState {
    match value {
        0 => ReadyState::Connecting,
        1 => ReadyState::Open,
        2 => ReadyState::Closing,
        _ => ReadyState::Closed,
    }
}

/// Resolves once a close is requested or every handle is dropped. Sends
/// queued before the handshake completes are discarded.
async fn close_requested(commands: &mut mpsc::UnboundedReceiver<Command>) {
    loop {
        match commands.recv().await {
            Some(Command::Close) | None => return,
            Some(Command::Send(_)) => {}
        }
    }
}

async fn run_connection(
    id: HandleId,
    url: String,
    state: Arc<AtomicU8>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: EventSender,
) {
    let emit = |event: TransportEvent| {
        // Nobody is listening once the session is gone.
        let _ = events.send((id, event));
    };

    let connect_result = tokio::select! {
        result = tokio_tungstenite::connect_async(url.clone()) => result,
        _ = close_requested(&mut commands) => {
            tracing::debug!(target: "tether_net::websocket", handle = %id, "closed before handshake completed");
            state.store(encode(ReadyState::Closed), Ordering::Release);
            emit(TransportEvent::Closed);
            return;
        }
    };

    let ws_stream = match connect_result {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            tracing::debug!(target: "tether_net::websocket", handle = %id, %url, error = %e, "connect failed");
            state.store(encode(ReadyState::Closed), Ordering::Release);
            emit(TransportEvent::Error(e.to_string()));
            emit(TransportEvent::Closed);
            return;
        }
    };

    // A close requested during the handshake leaves the state at Closing and
    // the queued Close command ends the loop below.
    let became_open = state
        .compare_exchange(
            encode(ReadyState::Connecting),
            encode(ReadyState::Open),
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_ok();
    if became_open {
        tracing::debug!(target: "tether_net::websocket", handle = %id, %url, "handshake complete");
        emit(TransportEvent::Ready);
    }

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                match cmd {
                    Some(Command::Send(Message::Text(text))) => {
                        if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                            emit(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    Some(Command::Send(Message::Binary(data))) => {
                        if let Err(e) = write.send(WsMessage::Binary(data.into())).await {
                            emit(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    Some(Command::Close) | None => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        emit(TransportEvent::Message(Message::Text(text.to_string())));
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        emit(TransportEvent::Message(Message::Binary(data.to_vec())));
                    }
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {
                        // Pongs are sent automatically by tungstenite
                    }
                    Some(Ok(WsMessage::Close(_frame))) => {
                        tracing::debug!(target: "tether_net::websocket", handle = %id, "server closed connection");
                        break;
                    }
                    Some(Err(e)) => {
                        emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.store(encode(ReadyState::Closed), Ordering::Release);
    emit(TransportEvent::Closed);
}
