//! Synchronous client core
//!
//! One connection, one batch at a time. `send` serializes the batch and
//! writes a window frame followed by the surviving data frames (wrapped in a
//! single compressed frame when compression is on); `await_ack` reads ACK
//! frames until the window is confirmed or the connection fails.
//!
//! The read and write halves of the connection carry no shared mutable
//! state, so [`Client::into_split`] can hand them to different tasks - the
//! async client calls `send` from the caller's task and `await_ack` from its
//! ACK worker.

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;

use lumber_protocol::{
    compress_frames, encode_json_frame, FrameReader, FrameWriter, ProtocolError, Version,
};

use crate::config::{ClientConfig, EventEncoder};
use crate::error::{AckError, ClientError, SendError, SerializationError};

/// Byte stream a client can run over
///
/// Implemented for anything async-readable and -writable; TLS streams and
/// in-memory duplex pipes plug in through [`Client::new`].
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Transport for T {}

type TransportReader = BufReader<ReadHalf<Box<dyn Transport>>>;
type TransportWriter = BufWriter<WriteHalf<Box<dyn Transport>>>;

/// Outcome of a send whose surviving events reached the wire
///
/// When every event was dropped (`sent == 0`) nothing was written and no ACK
/// is owed.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Events written, which is also the sequence the final ACK must reach
    pub sent: u32,
    /// Events the codec refused
    pub dropped: usize,
    /// First codec failure, present whenever `dropped > 0`
    pub dropped_err: Option<SerializationError>,
}

/// Synchronous lumberjack client
///
/// Not reentrant: only one `send` or `await_ack` may run at a time, which
/// `&mut self` enforces. Pipelining callers use
/// [`AsyncClient`](crate::AsyncClient).
pub struct Client {
    send: SendHalf,
    ack: AckHalf,
}

impl Client {
    /// Connect to a lumberjack endpoint over TCP
    pub async fn connect(
        addr: impl ToSocketAddrs,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Self::new(stream, config)
    }

    /// Wrap an established transport
    ///
    /// This is the seam for custom dialers: anything that yields a
    /// [`Transport`] (a TLS stream, a proxied connection, an in-memory
    /// duplex) becomes a client connection here.
    pub fn new<T: Transport>(transport: T, config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let (read, write) = tokio::io::split(Box::new(transport) as Box<dyn Transport>);
        Ok(Self {
            send: SendHalf {
                writer: FrameWriter::new(BufWriter::new(write)),
                frame_buf: Vec::new(),
                encoder: config.encoder,
                compression_level: config.compression_level,
                window_size: 0,
            },
            ack: AckHalf {
                reader: FrameReader::new(BufReader::new(read)),
                timeout: config.timeout,
                seq: 0,
            },
        })
    }

    /// Publish a batch of events
    ///
    /// Events the codec rejects are dropped; the rest are written as one
    /// window. The returned [`SendOutcome`] reports both counts along with
    /// the first codec failure. Transport failures come back as
    /// [`SendError`].
    pub async fn send(&mut self, events: &[Value]) -> Result<SendOutcome, SendError> {
        self.send.send(events).await
    }

    /// Wait until the peer has ACKed sequence `expected`
    ///
    /// Interim ACKs advance the internal counter; the final sequence is
    /// returned. A non-ACK frame, a sequence beyond `expected`, or a
    /// sequence moving backwards fails the wait with a protocol error.
    pub async fn await_ack(&mut self, expected: u32) -> Result<u32, AckError> {
        self.ack.await_ack(expected).await
    }

    /// Highest sequence the peer has ACKed
    pub fn acked_seq(&self) -> u32 {
        self.ack.seq
    }

    /// Count announced by the most recent window frame
    pub fn window_size(&self) -> u32 {
        self.send.window_size
    }

    /// Flush and close the connection
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.send.shutdown().await
    }

    /// Split into independent send and ACK halves
    pub(crate) fn into_split(self) -> (SendHalf, AckHalf) {
        (self.send, self.ack)
    }
}

/// Write side: serialization, window and data frames
pub(crate) struct SendHalf {
    writer: FrameWriter<TransportWriter>,
    /// Reused staging buffer for frames that go into a compressed payload
    frame_buf: Vec<u8>,
    encoder: EventEncoder,
    compression_level: u32,
    window_size: u32,
}

impl SendHalf {
    pub(crate) async fn send(&mut self, events: &[Value]) -> Result<SendOutcome, SendError> {
        if events.is_empty() {
            return Ok(SendOutcome {
                sent: 0,
                dropped: 0,
                dropped_err: None,
            });
        }

        let mut bodies = Vec::with_capacity(events.len());
        let mut dropped = 0usize;
        let mut dropped_err = None;
        for (index, event) in events.iter().enumerate() {
            match (self.encoder)(event) {
                Ok(body) => bodies.push(body),
                Err(reason) => {
                    dropped += 1;
                    if dropped_err.is_none() {
                        dropped_err = Some(SerializationError::new(index, reason));
                    }
                }
            }
        }

        if bodies.is_empty() {
            // nothing survived: no window goes out and no ACK is owed
            return Ok(SendOutcome {
                sent: 0,
                dropped,
                dropped_err,
            });
        }

        let sent = bodies.len() as u32;
        if let Err(source) = self.write_batch(&bodies, sent).await {
            return Err(SendError { dropped, source });
        }
        self.window_size = sent;

        Ok(SendOutcome {
            sent,
            dropped,
            dropped_err,
        })
    }

    async fn write_batch(&mut self, bodies: &[Vec<u8>], count: u32) -> Result<(), ClientError> {
        self.writer.write_window_size(Version::V2, count).await?;

        if self.compression_level > 0 {
            self.frame_buf.clear();
            for (i, body) in bodies.iter().enumerate() {
                encode_json_frame(&mut self.frame_buf, (i + 1) as u32, body);
            }
            let payload = compress_frames(&self.frame_buf, self.compression_level)?;
            self.writer.write_compressed(Version::V2, &payload).await?;
        } else {
            for (i, body) in bodies.iter().enumerate() {
                self.writer.write_json((i + 1) as u32, body).await?;
            }
        }

        self.writer.flush().await?;
        Ok(())
    }

    pub(crate) async fn shutdown(&mut self) -> Result<(), ClientError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Read side: the ACK counter
pub(crate) struct AckHalf {
    reader: FrameReader<TransportReader>,
    timeout: std::time::Duration,
    /// Highest sequence ACKed by the peer
    seq: u32,
}

impl AckHalf {
    pub(crate) async fn await_ack(&mut self, expected: u32) -> Result<u32, AckError> {
        let mut last = 0u32;
        loop {
            let seq = match timeout(self.timeout, self.reader.read_ack()).await {
                Err(_) => {
                    return Err(AckError {
                        acked: last,
                        source: ClientError::Timeout(self.timeout),
                    })
                }
                Ok(Err(err)) => {
                    return Err(AckError {
                        acked: last,
                        source: err.into(),
                    })
                }
                Ok(Ok(seq)) => seq,
            };

            if seq > expected {
                return Err(AckError {
                    acked: last,
                    source: ProtocolError::AckOutOfWindow {
                        seq,
                        window: expected,
                    }
                    .into(),
                });
            }
            if seq < last {
                return Err(AckError {
                    acked: last,
                    source: ProtocolError::NonMonotonicAck {
                        prev: last,
                        got: seq,
                    }
                    .into(),
                });
            }

            last = seq;
            self.seq = seq;
            if seq >= expected {
                return Ok(seq);
            }
        }
    }

    pub(crate) fn last_acked(&self) -> u32 {
        self.seq
    }
}
