//! Client configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::{BoxError, ClientError};

/// Default deadline for each ACK frame read (30s)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default zlib level for outbound batches
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 3;

/// Pluggable event codec: serializes one event to its wire bytes
///
/// The protocol layer never inspects the output; it only frames it. A codec
/// failure drops the event without consuming a sequence slot.
pub type EventEncoder = Arc<dyn Fn(&Value) -> Result<Vec<u8>, BoxError> + Send + Sync>;

/// Client configuration
#[derive(Clone)]
pub struct ClientConfig {
    /// Deadline applied to each ACK frame read
    pub timeout: Duration,

    /// zlib level in `[0, 9]` for outbound batches; 0 writes plain JSON
    /// frames instead of a compressed frame
    pub compression_level: u32,

    /// Event codec; defaults to `serde_json::to_vec`
    pub encoder: EventEncoder,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            encoder: Arc::new(|event| Ok(serde_json::to_vec(event)?)),
        }
    }
}

impl ClientConfig {
    /// Check option ranges
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.compression_level > 9 {
            return Err(ClientError::Config("compression_level must be in [0, 9]"));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::Config("timeout must be non-zero"));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("timeout", &self.timeout)
            .field("compression_level", &self.compression_level)
            .finish_non_exhaustive()
    }
}
