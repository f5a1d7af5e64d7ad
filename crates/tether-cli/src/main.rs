//! tether - interactive console for a self-healing WebSocket session.

mod cli;
mod config;
mod console;
mod error;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use tether_net::websocket::TungsteniteTransport;
use tether_net::{ConnectionManager, Session};

use crate::cli::Args;
use crate::config::ConsoleConfig;
use crate::error::Result;
use crate::logging::LogConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_config = if args.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::new(args.log.clone())
    };
    if let Err(e) = logging::init_logging(&log_config) {
        eprintln!("tether: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "exiting");
            eprintln!("tether: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let (connection, location) = ConsoleConfig::resolve(&args)?;
    let endpoint = location.endpoint()?;
    tracing::info!(%endpoint, "starting session");

    let (transport, events) = TungsteniteTransport::new();
    let manager = ConnectionManager::new(connection, location, transport);
    let session = Session::spawn(manager, events);

    if !args.no_open {
        session.open().await?;
    }
    println!("* session to {endpoint}; type /help for commands");

    console::run(session).await
}
