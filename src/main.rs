//! judge-wire
//!
//! Diagnostic CLI for the runner ↔ validator frame protocol.
//! Connection settings come from `JUDGE_WIRE_CONFIG`, overridable by flags.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use judge_wire::config::WireConfig;
use judge_wire::error::WireError;
use judge_wire::frame::FrameType;
use judge_wire::outcome::TestCaseOutcome;
use judge_wire::transport::{TcpTransport, Transport};

#[derive(Parser, Debug)]
#[command(name = "judge-wire")]
#[command(about = "Send and receive judging pipeline frames")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Peer host (or bind host for `listen`)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Peer port (or bind port for `listen`)
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept connections and print each received outcome as JSON
    Listen,
    /// Send a ping frame to a peer
    Ping,
    /// Send a JSON test case outcome as a result frame
    Send {
        /// File containing the outcome JSON
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only received outcomes
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = WireConfig::from_env().context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    match args.command {
        Command::Listen => listen(&config).await,
        Command::Ping => {
            let transport = TcpTransport::connect(&config)
                .await
                .with_context(|| format!("Failed to connect to {}", config.addr()))?;
            transport.ping().await.context("Failed to send ping")?;
            transport.shutdown().await?;
            info!(peer = %transport.peer(), "Ping sent");
            Ok(())
        }
        Command::Send { path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let outcome = TestCaseOutcome::from_json(&text)
                .with_context(|| format!("Invalid outcome in {}", path.display()))?;

            let transport = TcpTransport::connect(&config)
                .await
                .with_context(|| format!("Failed to connect to {}", config.addr()))?;
            transport
                .send_outcome(&outcome)
                .await
                .context("Failed to send outcome")?;
            transport.shutdown().await?;
            info!(peer = %transport.peer(), result = ?outcome.result, "Outcome sent");
            Ok(())
        }
    }
}

/// Serve one connection at a time until the process is stopped.
async fn listen(config: &WireConfig) -> Result<()> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "Listening");

    loop {
        let (stream, _) = listener.accept().await.context("Accept failed")?;
        let transport = match TcpTransport::from_stream(stream, config) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "Failed to set up connection");
                continue;
            }
        };
        info!(peer = %transport.peer(), "Accepted connection");

        loop {
            match transport.recv().await {
                Ok(frame) => match frame.kind() {
                    FrameType::Ping => info!(peer = %transport.peer(), "Ping"),
                    FrameType::TestResult => match TestCaseOutcome::from_frame(&frame) {
                        Ok(outcome) => {
                            println!("{}", serde_json::to_string_pretty(&outcome.to_value())?);
                        }
                        Err(e) => warn!(peer = %transport.peer(), error = %e, "Malformed result payload"),
                    },
                },
                Err(WireError::Closed) => {
                    info!(peer = %transport.peer(), "Connection closed");
                    break;
                }
                Err(e) => {
                    warn!(peer = %transport.peer(), error = %e, "Dropping connection");
                    break;
                }
            }
        }
    }
}
