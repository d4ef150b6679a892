//! Window-to-batch assembly for one connection
//!
//! Between batches the reader waits on the window header with no deadline -
//! idle connections are fine. Once the header is in, the rest of the window
//! has to arrive within one per-batch deadline; tripping it is a
//! [`ServerError::Timeout`], distinct from protocol errors, and fails the
//! batch.

use std::time::Duration;

use tokio::io::{AsyncRead, BufReader};
use tokio::time::timeout;

use lumber_protocol::{FrameReader, Version, DEFAULT_MAX_FIELD_LEN};

use crate::batch::{Batch, ConnectionInfo};
use crate::error::ServerError;

/// Default per-batch read deadline (30s)
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the event capacity reserved ahead of parsing, so a hostile
/// window count cannot force a huge allocation
const MAX_PREALLOC_EVENTS: usize = 4096;

/// Batch reader configuration
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Deadline for completing a window once its header arrived
    pub timeout: Duration,

    /// Per-field length cap handed to the frame codec
    pub max_field_len: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_BATCH_TIMEOUT,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
        }
    }
}

/// Reads batches off one connection
pub struct BatchReader<R> {
    frames: FrameReader<BufReader<R>>,
    timeout: Duration,
    conn: ConnectionInfo,
}

impl<R: AsyncRead + Unpin> BatchReader<R> {
    /// Wrap the read side of a connection
    pub fn new(inner: R, conn: ConnectionInfo, config: ReaderConfig) -> Self {
        Self {
            frames: FrameReader::with_max_field_len(BufReader::new(inner), config.max_field_len),
            timeout: config.timeout,
            conn,
        }
    }

    /// Read the next batch
    ///
    /// `Ok(None)` is a zero-count keep-alive window: no batch, no ACK owed,
    /// connection stays alive. A cleanly closed connection surfaces as
    /// [`ServerError::Closed`]. Any other error abandons the batch; the
    /// caller decides whether to close the connection.
    pub async fn read_batch(&mut self) -> Result<Option<Batch>, ServerError> {
        // wait for the next window without a deadline
        let Some((version, count)) = self.frames.read_window_size().await? else {
            return Err(ServerError::Closed);
        };
        if count == 0 {
            return Ok(None);
        }

        let mut events = Vec::with_capacity((count as usize).min(MAX_PREALLOC_EVENTS));
        let read = self.frames.read_frames(&mut events, count as usize);
        let max_seq = match timeout(self.timeout, read).await {
            Err(_) => return Err(ServerError::Timeout(self.timeout)),
            Ok(Err(err)) => return Err(err.into()),
            Ok(Ok(max_seq)) => max_seq,
        };

        // the ACK sequence: highest observed for v1, the count for v2
        let seq = match version {
            Version::V1 => max_seq,
            Version::V2 => count,
        };
        Ok(Some(Batch::new(events, seq, version, self.conn.clone())))
    }
}
