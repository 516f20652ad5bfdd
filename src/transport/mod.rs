//! Frame transport between runner, validator and orchestrator.
//!
//! Provides the `Transport` trait and the two-phase framing functions.
//! A connection carries no message identifiers, so each direction is strictly
//! single-writer/single-reader: one frame is fully written (or read) before
//! the next begins. Any timeout or framing error leaves the stream at an
//! unknown offset, so implementations abort the connection instead of
//! retrying.

pub mod tcp;

pub use tcp::TcpTransport;

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Result, WireError};
use crate::frame::{Frame, FrameType, HEADER_LEN, PING};
use crate::outcome::TestCaseOutcome;

/// Abstraction over a point-to-point frame channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one complete frame.
    ///
    /// Writers are serialized internally, so concurrent callers never interleave.
    async fn send(&self, frame: &Frame) -> Result<()>;

    /// Read one complete frame (header, then exactly `length` payload bytes).
    async fn recv(&self) -> Result<Frame>;

    /// Close the connection.
    async fn shutdown(&self) -> Result<()>;

    /// Whether the connection is still usable.
    fn is_alive(&self) -> bool;

    /// Send a liveness frame.
    async fn ping(&self) -> Result<()> {
        self.send(&PING).await
    }

    async fn send_outcome(&self, outcome: &TestCaseOutcome) -> Result<()> {
        self.send(&outcome.to_frame()?).await
    }

    /// Receive the next test case outcome, skipping interleaved pings.
    async fn recv_outcome(&self) -> Result<TestCaseOutcome> {
        loop {
            let frame = self.recv().await?;
            match frame.kind() {
                FrameType::Ping => debug!("Ping received while waiting for result"),
                FrameType::TestResult => return TestCaseOutcome::from_frame(&frame),
            }
        }
    }
}

/// Write one frame and flush.
pub async fn send_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<()> {
    let bytes = frame.encode()?;
    write_encoded(writer, &bytes).await
}

async fn write_encoded<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// Reads exactly 16 header bytes, checks the declared length against
/// `max_frame_len`, then reads exactly that many payload bytes. A clean EOF
/// before the first header byte is [`WireError::Closed`]; EOF anywhere later
/// is a short header or a truncated payload.
pub async fn recv_frame<R: AsyncRead + Unpin>(reader: &mut R, max_frame_len: u64) -> Result<Frame> {
    let mut header = [0u8; HEADER_LEN];
    let read = read_full(reader, &mut header).await?;
    if read == 0 {
        return Err(WireError::Closed);
    }
    if read < HEADER_LEN {
        return Err(WireError::HeaderLength {
            expected: HEADER_LEN,
            actual: read,
        });
    }

    let frame = Frame::decode_header(&header)?;
    let length = frame.length();
    if length > max_frame_len {
        return Err(WireError::FrameTooLarge {
            length,
            max: max_frame_len,
        });
    }
    let len = usize::try_from(length).map_err(|_| WireError::FrameTooLarge {
        length,
        max: max_frame_len,
    })?;

    let mut body = vec![0u8; len];
    let read = read_full(reader, &mut body).await?;
    if read < len {
        return Err(WireError::Truncated {
            expected: length,
            actual: read as u64,
        });
    }

    frame.with_payload(body)
}

/// [`recv_frame`] with one bounded wait covering both read phases.
pub async fn recv_frame_timeout<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_len: u64,
    timeout: Duration,
) -> Result<Frame> {
    tokio::time::timeout(timeout, recv_frame(reader, max_frame_len))
        .await
        .map_err(|_| WireError::Timeout(timeout))?
}

/// Fill `buf` until it is full or the reader hits EOF. Returns bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
