//! Client error types
//!
//! Everything here is `Clone`: a single connection failure fans out to every
//! pending callback, so errors hold their sources behind `Arc`.

use std::sync::Arc;

use thiserror::Error;

use lumber_protocol::ProtocolError;

/// Boxed error returned by event encoders
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the client
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Malformed or unexpected frames from the peer
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// Underlying transport failure
    #[error("transport error: {0}")]
    Io(Arc<std::io::Error>),

    /// No ACK frame arrived within the configured deadline
    #[error("timed out waiting for ACK after {0:?}")]
    Timeout(std::time::Duration),

    /// The event codec rejected one or more events
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// The client is closed, or the peer ended the stream cleanly
    #[error("client closed")]
    Closed,

    /// Rejected configuration value
    #[error("invalid configuration: {0}")]
    Config(&'static str),
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(source) => Self::Io(source),
            other => Self::Protocol(other),
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// The event codec refused an event
///
/// Carries the position of the first offender; the send itself is not
/// aborted, so this usually rides along with a partially successful batch.
#[derive(Debug, Clone, Error)]
#[error("failed to serialize event at index {index}: {reason}")]
pub struct SerializationError {
    /// 0-based index of the first rejected event within the submitted batch
    pub index: usize,
    reason: Arc<BoxError>,
}

impl SerializationError {
    pub(crate) fn new(index: usize, reason: BoxError) -> Self {
        Self {
            index,
            reason: Arc::new(reason),
        }
    }

    /// The original error reported by the codec
    pub fn reason(&self) -> &(dyn std::error::Error + Send + Sync) {
        &**self.reason
    }
}

/// A send failed before the batch reached the wire
#[derive(Debug, Clone, Error)]
#[error("{source}")]
pub struct SendError {
    /// Events already dropped by the codec when the failure hit
    pub dropped: usize,
    /// What went wrong
    pub source: ClientError,
}

/// An ACK wait ended without confirming the full window
#[derive(Debug, Clone, Error)]
#[error("{source}")]
pub struct AckError {
    /// Highest sequence the peer confirmed before the failure
    pub acked: u32,
    /// What went wrong
    pub source: ClientError,
}
