//! Protocol error types
//!
//! Errors that can occur while reading or writing protocol frames. The enum
//! is `Clone` (I/O sources are reference-counted) so a single failure can be
//! fanned out to every pending caller.

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during frame codec operations
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// Underlying transport failure, including end-of-stream mid-frame
    #[error("transport error: {0}")]
    Io(Arc<std::io::Error>),

    /// Frame header with an unrecognized version/code combination
    #[error("unknown frame: version {version:#04x}, code {code:#04x}")]
    UnknownFrame { version: u8, code: u8 },

    /// A well-formed frame arrived where a different frame was required
    #[error("expected {expected} frame, got version {version:#04x}, code {code:#04x}")]
    UnexpectedFrame {
        expected: &'static str,
        version: u8,
        code: u8,
    },

    /// Declared field length exceeds the configured cap
    #[error("field length {len} exceeds cap {max}")]
    FieldTooLarge { len: usize, max: usize },

    /// Declared compressed payload length exceeds the cap
    #[error("compressed payload length {len} exceeds cap {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// A compressed substream ended in the middle of a frame
    #[error("compressed payload ended mid-frame")]
    TruncatedPayload,

    /// Compressed frames nested beyond the recursion bound
    #[error("compressed frames nested deeper than {max}")]
    NestingTooDeep { max: usize },

    /// zlib stream could not be decoded
    #[error("zlib decode failed: {0}")]
    Zlib(String),

    /// ACK sequence went backwards within one window
    #[error("ACK sequence went backwards: {prev} then {got}")]
    NonMonotonicAck { prev: u32, got: u32 },

    /// ACK sequence beyond the announced window count
    #[error("ACK sequence {seq} exceeds window of {window}")]
    AckOutOfWindow { seq: u32, window: u32 },
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl ProtocolError {
    /// Whether this error came from the transport rather than the peer's
    /// framing
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
