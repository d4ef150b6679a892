//! Per-connection server loop
//!
//! One session per connection: read a batch, hand it to the application's
//! channel, wait for the application to ACK it, write the ACK frame back.
//! A full channel blocks the session before it reads the next window, which
//! is how server-side backpressure reaches the peer.
//!
//! While a batch sits unacknowledged with the application, the session emits
//! keep-alive `ACK 0` frames so the client's ACK deadline does not fire on a
//! slow consumer.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufWriter, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use lumber_protocol::{FrameWriter, DEFAULT_MAX_FIELD_LEN};

use crate::batch::{Batch, ConnectionInfo};
use crate::error::ServerError;
use crate::reader::{BatchReader, ReaderConfig, DEFAULT_BATCH_TIMEOUT};

/// Default keep-alive interval while a batch awaits its ACK (3s)
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(3);

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Per-batch read deadline
    pub timeout: Duration,

    /// Interval between keep-alive `ACK 0` frames while the application
    /// holds a batch
    pub keepalive: Duration,

    /// Per-field length cap handed to the frame codec
    pub max_field_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_BATCH_TIMEOUT,
            keepalive: DEFAULT_KEEPALIVE,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
        }
    }
}

/// Serves one connection
pub struct Session<T> {
    reader: BatchReader<ReadHalf<T>>,
    writer: FrameWriter<BufWriter<WriteHalf<T>>>,
    sink: mpsc::Sender<Batch>,
    keepalive: Duration,
    cancel: CancellationToken,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Session<T> {
    /// Build a session over an established transport
    ///
    /// TLS termination stays outside: hand in the decrypted stream plus a
    /// [`ConnectionInfo`] carrying the TLS metadata.
    pub fn new(
        transport: T,
        conn: ConnectionInfo,
        sink: mpsc::Sender<Batch>,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (read, write) = tokio::io::split(transport);
        Self {
            reader: BatchReader::new(
                read,
                conn,
                ReaderConfig {
                    timeout: config.timeout,
                    max_field_len: config.max_field_len,
                },
            ),
            writer: FrameWriter::new(BufWriter::new(write)),
            sink,
            keepalive: config.keepalive,
            cancel,
        }
    }

    /// Run until the connection closes, the session is cancelled, or an
    /// error terminates it
    ///
    /// A clean close by the peer is `Ok`. Batches already delivered to the
    /// application remain owned by it either way.
    pub async fn run(mut self) -> Result<(), ServerError> {
        loop {
            let read = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                read = self.reader.read_batch() => read,
            };
            let batch = match read {
                Ok(Some(batch)) => batch,
                // zero-count window: a keep-alive, nothing to ACK
                Ok(None) => continue,
                Err(err) if err.is_closed() => return Ok(()),
                Err(err) => return Err(err),
            };

            let seq = batch.seq();
            let version = batch.version();
            let mut acked = batch.acked();

            // a full queue blocks here, refusing to read the next window
            self.sink
                .send(batch)
                .await
                .map_err(|_| ServerError::QueueClosed)?;

            let mut ticker = if self.keepalive.is_zero() {
                None
            } else {
                let mut ticker = tokio::time::interval(self.keepalive);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker.reset(); // skip the immediate first tick
                Some(ticker)
            };

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(()),
                    result = acked.wait() => {
                        result?;
                        break;
                    }
                    _ = keepalive_tick(&mut ticker) => {
                        self.writer.write_ack(version, 0).await?;
                        self.writer.flush().await?;
                    }
                }
            }

            self.writer.write_ack(version, seq).await?;
            self.writer.flush().await?;
        }
    }
}

/// Tick the keep-alive timer, or park forever when keep-alives are disabled
async fn keepalive_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
