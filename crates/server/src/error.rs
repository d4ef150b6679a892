//! Server error types

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use lumber_protocol::ProtocolError;

/// Errors that can occur while serving lumberjack connections
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listener
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed or unexpected frames from the peer
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// Underlying transport failure
    #[error("transport error: {0}")]
    Io(Arc<std::io::Error>),

    /// The window did not complete within the per-batch deadline
    #[error("batch read timed out after {0:?}")]
    Timeout(Duration),

    /// The peer ended the stream cleanly between batches
    #[error("connection closed")]
    Closed,

    /// The application stopped consuming batches
    #[error("batch queue closed")]
    QueueClosed,

    /// A batch was dropped without being acknowledged
    #[error("batch dropped without acknowledgement")]
    BatchDropped,
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(source) => Self::Io(source),
            other => Self::Protocol(other),
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl ServerError {
    /// Whether this is the normal end of a connection rather than a failure
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(source) => source.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}
