//! The interactive console loop.

use tether_net::{Message, SessionHandle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::error::Result;

const HELP: &str = "\
commands:
  /open     open (or reopen) the connection
  /close    close the connection and stop reconnecting
  /hide     simulate the host going to the background
  /show     simulate the host returning to the foreground
  /status   print the connection state
  /quit     exit
anything else is sent as a text message";

/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Open,
    Close,
    Hide,
    Show,
    Status,
    Help,
    Quit,
    /// Text to send verbatim.
    Send(String),
    Unknown(String),
    Empty,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        match trimmed {
            "/open" => Self::Open,
            "/close" => Self::Close,
            "/hide" => Self::Hide,
            "/show" => Self::Show,
            "/status" => Self::Status,
            "/help" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            // `//text` sends `/text`.
            cmd if cmd.starts_with("//") => Self::Send(line.trim_start()[1..].to_owned()),
            cmd if cmd.starts_with('/') => Self::Unknown(cmd.to_owned()),
            _ => Self::Send(line.to_owned()),
        }
    }
}

/// Run until stdin closes, `/quit`, or Ctrl+C.
pub async fn run(session: SessionHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut messages = session.subscribe();
    let mut connectivity = session.connectivity();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !execute(&session, ConsoleCommand::parse(&line)).await? {
                    break;
                }
            }

            message = messages.recv() => {
                match message {
                    Ok(Message::Text(text)) => println!("< {text}"),
                    Ok(Message::Binary(data)) => println!("< [{} bytes]", data.len()),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "console fell behind, messages dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                let open = *connectivity.borrow_and_update();
                println!("* {}", if open { "connected" } else { "disconnected" });
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown();
    Ok(())
}

/// Returns `false` when the console should exit.
async fn execute(session: &SessionHandle, command: ConsoleCommand) -> Result<bool> {
    match command {
        ConsoleCommand::Open => {
            if let Err(e) = session.open().await {
                eprintln!("! {e}");
            }
        }
        ConsoleCommand::Close => session.close()?,
        ConsoleCommand::Hide => session.set_hidden(true)?,
        ConsoleCommand::Show => session.set_hidden(false)?,
        ConsoleCommand::Status => println!("* {}", session.state().await?),
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => return Ok(false),
        ConsoleCommand::Send(text) => {
            if let Err(e) = session.send(text).await {
                eprintln!("! {e}");
            }
        }
        ConsoleCommand::Unknown(cmd) => eprintln!("! unknown command {cmd}; try /help"),
        ConsoleCommand::Empty => {}
    }
    Ok(true)
}
