//! Binary framing for runner ↔ validator ↔ orchestrator streams.
//!
//! Every frame starts with a fixed 16-byte header:
//!
//! ```text
//! offset  size  field
//! 0       8     payload length (u64, little-endian)
//! 8       1     type code
//! 9       7     options (opaque, zero-padded)
//! 16      n     payload (UTF-8 text, n = length)
//! ```
//!
//! Type codes are split by nibble. Control codes use only the high nibble and
//! never carry a payload; data codes use only the low nibble and always do.
//! A byte with both nibbles set (or neither) is never a valid type.
//!
//! Reading is two-phase: parse the header with [`Frame::decode_header`], then
//! read exactly [`Frame::length`] bytes and attach them with
//! [`Frame::with_payload`].

use crate::error::{Result, WireError};

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 16;

/// Maximum number of option bytes carried in a header.
pub const OPTIONS_LEN: usize = 7;

const CONTROL_MASK: u8 = 0xf0;
const DATA_MASK: u8 = 0x0f;

/// Registered frame type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Liveness check. Control, no payload.
    Ping = 0x10,
    /// Text-encoded `TestCaseOutcome`. Data.
    TestResult = 0x01,
}

impl FrameType {
    /// Control codes (high nibble only).
    pub const CONTROL: &'static [Self] = &[Self::Ping];

    /// Data codes (low nibble only).
    pub const DATA: &'static [Self] = &[Self::TestResult];

    /// The on-wire byte for this type.
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn is_control(self) -> bool {
        let code = self.code();
        code & DATA_MASK == 0 && code & CONTROL_MASK != 0
    }

    pub const fn is_data(self) -> bool {
        let code = self.code();
        code & CONTROL_MASK == 0 && code & DATA_MASK != 0
    }

    /// Parse a type byte.
    ///
    /// Rejects bytes where both or neither nibble is set before consulting the
    /// registry, so an unknown code in the right namespace and a
    /// namespace-violating code both fail with [`WireError::InvalidType`].
    pub fn from_byte(byte: u8) -> Result<Self> {
        let control = byte & CONTROL_MASK != 0;
        let data = byte & DATA_MASK != 0;
        if control == data {
            return Err(WireError::InvalidType(byte));
        }

        let registry = if control { Self::CONTROL } else { Self::DATA };
        registry
            .iter()
            .copied()
            .find(|t| t.code() == byte)
            .ok_or(WireError::InvalidType(byte))
    }
}

impl TryFrom<u8> for FrameType {
    type Error = WireError;

    fn try_from(byte: u8) -> Result<Self> {
        Self::from_byte(byte)
    }
}

// Registry must stay nibble-consistent when new codes are added.
const _: () = {
    let mut i = 0;
    while i < FrameType::CONTROL.len() {
        assert!(FrameType::CONTROL[i].is_control());
        i += 1;
    }
    let mut i = 0;
    while i < FrameType::DATA.len() {
        assert!(FrameType::DATA[i].is_data());
        i += 1;
    }
};

/// Up to seven opaque header option bytes.
///
/// Stored zero-padded, so two values compare equal when their wire form is
/// identical. A locally built value keeps the caller's length; a decoded one
/// cannot tell trailing zero bytes from padding and drops them.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameOptions {
    bytes: [u8; OPTIONS_LEN],
    len: u8,
}

impl FrameOptions {
    pub const EMPTY: Self = Self {
        bytes: [0; OPTIONS_LEN],
        len: 0,
    };

    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > OPTIONS_LEN {
            return Err(WireError::InvalidOptions(bytes.len()));
        }
        let mut padded = [0; OPTIONS_LEN];
        padded[..bytes.len()].copy_from_slice(bytes);
        Ok(Self::with_len(padded, bytes.len()))
    }

    /// Build from the padded header field, stripping trailing zero padding.
    fn from_wire(bytes: [u8; OPTIONS_LEN]) -> Self {
        let len = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Self::with_len(bytes, len)
    }

    #[allow(clippy::cast_possible_truncation)] // len <= OPTIONS_LEN
    const fn with_len(bytes: [u8; OPTIONS_LEN], len: usize) -> Self {
        Self {
            bytes,
            len: len as u8,
        }
    }

    /// Option bytes without padding.
    ///
    /// Exactly what was passed to [`Self::new`]; for a decoded header,
    /// trailing zero bytes are gone.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    /// Zero-padded header field.
    pub const fn to_wire(&self) -> [u8; OPTIONS_LEN] {
        self.bytes
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl PartialEq for FrameOptions {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for FrameOptions {}

/// A single protocol message.
///
/// `payload` is `None` only between the two read phases: the header has been
/// parsed but the body has not been read yet. An empty body is `Some("")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameType,
    length: u64,
    options: FrameOptions,
    payload: Option<String>,
}

/// Shared liveness frame. Zero length, empty payload.
pub static PING: Frame = Frame {
    kind: FrameType::Ping,
    length: 0,
    options: FrameOptions::EMPTY,
    payload: Some(String::new()),
};

impl Frame {
    /// Build a frame from explicit parts.
    ///
    /// `payload`, when present, must be exactly `length` bytes. Control frames
    /// must have zero length.
    pub fn new(
        kind: FrameType,
        length: u64,
        payload: Option<String>,
        options: &[u8],
    ) -> Result<Self> {
        let options = FrameOptions::new(options)?;

        if kind.is_control() && length != 0 {
            return Err(WireError::LengthMismatch {
                declared: length,
                actual: 0,
            });
        }

        if let Some(ref body) = payload {
            let actual = body.len() as u64;
            if actual != length {
                return Err(WireError::LengthMismatch {
                    declared: length,
                    actual,
                });
            }
        }

        Ok(Self {
            kind,
            length,
            options,
            payload,
        })
    }

    /// Build a data frame, deriving the length from the payload.
    pub fn data(kind: FrameType, payload: impl Into<String>) -> Result<Self> {
        if !kind.is_data() {
            return Err(WireError::InvalidType(kind.code()));
        }
        let payload = payload.into();
        Ok(Self {
            kind,
            length: payload.len() as u64,
            options: FrameOptions::EMPTY,
            payload: Some(payload),
        })
    }

    /// Parse a 16-byte header. The returned frame has no payload yet.
    pub fn decode_header(raw: &[u8]) -> Result<Self> {
        let raw: &[u8; HEADER_LEN] = raw.try_into().map_err(|_| WireError::HeaderLength {
            expected: HEADER_LEN,
            actual: raw.len(),
        })?;

        let mut length = [0u8; 8];
        length.copy_from_slice(&raw[..8]);
        let length = u64::from_le_bytes(length);

        let kind = FrameType::from_byte(raw[8])?;

        let mut options = [0u8; OPTIONS_LEN];
        options.copy_from_slice(&raw[9..]);

        if kind.is_control() && length != 0 {
            return Err(WireError::LengthMismatch {
                declared: length,
                actual: 0,
            });
        }

        Ok(Self {
            kind,
            length,
            options: FrameOptions::from_wire(options),
            payload: None,
        })
    }

    /// Attach the payload read in the second phase.
    ///
    /// `raw` must be exactly [`Self::length`] bytes of UTF-8.
    pub fn with_payload(mut self, raw: Vec<u8>) -> Result<Self> {
        let actual = raw.len() as u64;
        if actual < self.length {
            return Err(WireError::Truncated {
                expected: self.length,
                actual,
            });
        }
        if actual > self.length {
            return Err(WireError::LengthMismatch {
                declared: self.length,
                actual,
            });
        }
        self.payload = Some(String::from_utf8(raw)?);
        Ok(self)
    }

    /// Decode a complete frame (header followed by payload) from one buffer.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_LEN {
            return Err(WireError::HeaderLength {
                expected: HEADER_LEN,
                actual: raw.len(),
            });
        }
        let (header, body) = raw.split_at(HEADER_LEN);
        Self::decode_header(header)?.with_payload(body.to_vec())
    }

    /// The 16-byte header for this frame.
    pub fn encode_header(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[..8].copy_from_slice(&self.length.to_le_bytes());
        header[8] = self.kind.code();
        header[9..].copy_from_slice(&self.options.to_wire());
        header
    }

    /// Serialize header and payload. Fails if the payload is absent.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = self.payload.as_deref().ok_or(WireError::MissingPayload)?;
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&self.encode_header());
        out.extend_from_slice(payload.as_bytes());
        Ok(out)
    }

    pub const fn kind(&self) -> FrameType {
        self.kind
    }

    pub const fn length(&self) -> u64 {
        self.length
    }

    pub const fn options(&self) -> &FrameOptions {
        &self.options
    }

    /// Payload text, or `None` if only the header has been read.
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn into_payload(self) -> Option<String> {
        self.payload
    }

    pub const fn is_control(&self) -> bool {
        self.kind.is_control()
    }

    pub const fn is_data(&self) -> bool {
        self.kind.is_data()
    }

    /// Whether the payload has been materialized.
    pub const fn is_complete(&self) -> bool {
        self.payload.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_wire_bytes() {
        let bytes = PING.encode().unwrap();
        assert_eq!(
            bytes,
            [0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0, 0, 0, 0, 0, 0, 0]
        );
        assert!(PING.is_control());
        assert!(!PING.is_data());
    }

    #[test]
    fn data_frame_wire_bytes() {
        let frame = Frame::data(FrameType::TestResult, "OK").unwrap();
        assert_eq!(frame.length(), 2);

        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 2);
        assert_eq!(&bytes[..8], &[2, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(bytes[8], 0x01);
        assert_eq!(&bytes[9..16], &[0; 7]);
        assert_eq!(&bytes[16..], b"OK");
    }

    #[test]
    fn length_is_little_endian() {
        let body = "x".repeat(0x0102);
        let bytes = Frame::data(FrameType::TestResult, body).unwrap().encode().unwrap();
        assert_eq!(&bytes[..8], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn roundtrip_two_phase() {
        let frame = Frame::new(
            FrameType::TestResult,
            5,
            Some("héllo".chars().take(4).collect()),
            &[7, 0, 9],
        )
        .unwrap();
        let bytes = frame.encode().unwrap();

        let header = Frame::decode_header(&bytes[..HEADER_LEN]).unwrap();
        assert!(!header.is_complete());
        assert_eq!(header.length(), 5);
        assert_eq!(header.kind(), FrameType::TestResult);
        assert_eq!(header.options().as_bytes(), &[7, 0, 9]);

        let decoded = header.with_payload(bytes[HEADER_LEN..].to_vec()).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.payload(), Some("héll"));
    }

    #[test]
    fn multibyte_payload_length_counts_bytes() {
        let frame = Frame::data(FrameType::TestResult, "é").unwrap();
        assert_eq!(frame.length(), 2);
        assert_eq!(Frame::decode(&frame.encode().unwrap()).unwrap(), frame);
    }

    #[test]
    fn options_padding_stripped_on_decode() {
        let frame = Frame::new(FrameType::Ping, 0, Some(String::new()), b"ab").unwrap();
        let bytes = frame.encode().unwrap();
        assert_eq!(&bytes[9..16], b"ab\0\0\0\0\0");

        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded.options().as_bytes(), b"ab");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn constructed_options_keep_trailing_zeros() {
        let frame = Frame::new(FrameType::Ping, 0, Some(String::new()), &[7, 0]).unwrap();
        assert_eq!(frame.options().as_bytes(), &[7, 0]);

        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded.options().as_bytes(), &[7]);
        // Same wire form, so the frames still compare equal.
        assert_eq!(decoded, frame);
    }

    #[test]
    fn full_options_roundtrip() {
        let frame = Frame::new(FrameType::Ping, 0, Some(String::new()), b"1234567").unwrap();
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded.options().as_bytes(), b"1234567");
    }

    #[test]
    fn too_many_options_rejected() {
        let err = Frame::new(FrameType::Ping, 0, Some(String::new()), b"12345678").unwrap_err();
        assert!(matches!(err, WireError::InvalidOptions(8)));
    }

    #[test]
    fn header_must_be_sixteen_bytes() {
        for len in [0, 1, 15, 17, 32] {
            let err = Frame::decode_header(&vec![0x10; len]).unwrap_err();
            assert!(
                matches!(err, WireError::HeaderLength { expected: 16, actual } if actual == len),
                "len {len}: {err}"
            );
        }
    }

    #[test]
    fn both_nibbles_set_is_invalid() {
        let mut header = PING.encode_header();
        header[8] = 0x11;
        let err = Frame::decode_header(&header).unwrap_err();
        assert!(matches!(err, WireError::InvalidType(0x11)));
    }

    #[test]
    fn type_byte_acceptance() {
        for byte in 0..=u8::MAX {
            let accepted = FrameType::from_byte(byte).is_ok();
            let one_nibble = (byte & 0xf0 == 0) != (byte & 0x0f == 0);
            let registered = matches!(byte, 0x10 | 0x01);
            assert_eq!(accepted, one_nibble && registered, "byte 0x{byte:02x}");
        }
    }

    #[test]
    fn registry_is_disjoint() {
        for c in FrameType::CONTROL {
            assert!(!FrameType::DATA.contains(c));
            assert_eq!(c.code() & 0x0f, 0);
        }
        for d in FrameType::DATA {
            assert_eq!(d.code() & 0xf0, 0);
        }
    }

    #[test]
    fn short_payload_is_truncated() {
        let bytes = Frame::data(FrameType::TestResult, "hello").unwrap().encode().unwrap();
        let err = Frame::decode(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(
            err,
            WireError::Truncated {
                expected: 5,
                actual: 3
            }
        ));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = Frame::data(FrameType::TestResult, "hi").unwrap().encode().unwrap();
        bytes.push(b'!');
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(err, WireError::LengthMismatch { declared: 2, actual: 3 }));
    }

    #[test]
    fn payload_length_must_match() {
        let err = Frame::new(FrameType::TestResult, 3, Some("ab".into()), &[]).unwrap_err();
        assert!(matches!(err, WireError::LengthMismatch { declared: 3, actual: 2 }));
    }

    #[test]
    fn control_frame_cannot_carry_length() {
        let err = Frame::new(FrameType::Ping, 1, None, &[]).unwrap_err();
        assert!(matches!(err, WireError::LengthMismatch { .. }));

        let mut header = PING.encode_header();
        header[0] = 4;
        assert!(Frame::decode_header(&header).is_err());
    }

    #[test]
    fn data_constructor_requires_data_type() {
        let err = Frame::data(FrameType::Ping, "x").unwrap_err();
        assert!(matches!(err, WireError::InvalidType(0x10)));
    }

    #[test]
    fn encode_without_payload_fails() {
        let header = Frame::data(FrameType::TestResult, "abc").unwrap().encode_header();
        let frame = Frame::decode_header(&header).unwrap();
        assert!(matches!(frame.encode(), Err(WireError::MissingPayload)));
    }

    #[test]
    fn invalid_utf8_payload() {
        let header = Frame::new(FrameType::TestResult, 2, None, &[]).unwrap();
        let err = header.with_payload(vec![0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, WireError::InvalidUtf8(_)));
    }
}
