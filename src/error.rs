//! Typed errors for framing and result decoding.
//!
//! A malformed frame from the peer is an ordinary runtime condition, so every
//! check surfaces here instead of panicking.

use thiserror::Error;

/// Everything that can go wrong while building, encoding or decoding a frame
/// or a test case outcome.
#[derive(Debug, Error)]
pub enum WireError {
    /// Header buffer was not exactly 16 bytes.
    #[error("frame header must be {expected} bytes, got {actual}")]
    HeaderLength { expected: usize, actual: usize },

    /// Type byte violates nibble discipline or is not a registered code.
    #[error("invalid frame type 0x{0:02x}")]
    InvalidType(u8),

    /// Declared length does not match the payload supplied.
    #[error("frame length mismatch: declared {declared}, payload has {actual} bytes")]
    LengthMismatch { declared: u64, actual: u64 },

    /// Fewer payload bytes were available than the header declared.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    /// More than 7 option bytes.
    #[error("frame options must be at most 7 bytes, got {0}")]
    InvalidOptions(usize),

    /// Tried to encode a frame whose payload has not been read yet.
    #[error("frame payload is absent")]
    MissingPayload,

    /// Declared length exceeds the receiver's bound.
    #[error("frame exceeds max size: {length} > {max}")]
    FrameTooLarge { length: u64, max: u64 },

    /// A frame of the wrong kind was handed to a decoder.
    #[error("unexpected frame type 0x{actual:02x}, expected 0x{expected:02x}")]
    UnexpectedType { expected: u8, actual: u8 },

    /// Permission carries bits outside the file mode mask.
    #[error("invalid permission bits: {0:#o}")]
    InvalidPermission(i64),

    /// A file record or its wrapper has the wrong shape.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Result code outside the four known verdicts.
    #[error("invalid result code: {0}")]
    InvalidResult(i64),

    #[error("frame payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bounded wait around a frame read or write expired.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Peer closed the connection cleanly between frames.
    #[error("connection closed")]
    Closed,
}

impl WireError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRecord(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, WireError>;
