//! TCP transport for a single runner ↔ validator connection.
//!
//! Owns both halves of a `TcpStream`. Each half sits behind its own mutex so
//! one writer and one reader can proceed independently while concurrent
//! writers queue. Every read and write runs under the configured timeout;
//! on any failure the connection is aborted, since a partial frame cannot be
//! resynchronized.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{recv_frame, write_encoded, Transport};
use crate::config::WireConfig;
use crate::error::{Result, WireError};
use crate::frame::Frame;

pub struct TcpTransport {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    alive: AtomicBool,
    peer: SocketAddr,
    timeout: Duration,
    max_frame_len: u64,
}

impl TcpTransport {
    /// Connect to `config.addr()` within the configured timeout.
    pub async fn connect(config: &WireConfig) -> Result<Self> {
        let addr = config.addr();
        let timeout = config.timeout();
        debug!(addr = %addr, "Connecting");

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| WireError::Timeout(timeout))??;

        Self::from_stream(stream, config)
    }

    /// Wrap an accepted or already connected stream.
    pub fn from_stream(stream: TcpStream, config: &WireConfig) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            alive: AtomicBool::new(true),
            peer,
            timeout: config.timeout(),
            max_frame_len: config.max_frame_len,
        })
    }

    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.alive.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(WireError::Closed)
        }
    }

    /// Mark the connection dead and close our write side.
    async fn abort(&self, err: &WireError) {
        if !self.alive.swap(false, Ordering::Relaxed) {
            return;
        }
        warn!(peer = %self.peer, error = %err, "Aborting connection");
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, frame: &Frame) -> Result<()> {
        self.ensure_alive()?;
        // Encoding errors are local misuse; nothing has been written yet.
        let bytes = frame.encode()?;

        let result = {
            let mut writer = self.writer.lock().await;
            tokio::time::timeout(self.timeout, write_encoded(&mut *writer, &bytes))
                .await
                .unwrap_or_else(|_| Err(WireError::Timeout(self.timeout)))
        };

        match result {
            Ok(()) => {
                debug!(peer = %self.peer, kind = ?frame.kind(), length = frame.length(), "Sent frame");
                Ok(())
            }
            Err(e) => {
                self.abort(&e).await;
                Err(e)
            }
        }
    }

    async fn recv(&self) -> Result<Frame> {
        self.ensure_alive()?;

        let result = {
            let mut reader = self.reader.lock().await;
            tokio::time::timeout(self.timeout, recv_frame(&mut *reader, self.max_frame_len))
                .await
                .unwrap_or_else(|_| Err(WireError::Timeout(self.timeout)))
        };

        match result {
            Ok(frame) => {
                debug!(peer = %self.peer, kind = ?frame.kind(), length = frame.length(), "Received frame");
                Ok(frame)
            }
            Err(e) => {
                self.abort(&e).await;
                Err(e)
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.alive.swap(false, Ordering::Relaxed) {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        debug!(peer = %self.peer, "Connection shut down");
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }
}
