//! Frame decoding
//!
//! [`FrameReader`] reads frames off an async byte stream. String and payload
//! fields go through a growable scratch buffer that is reused across frames
//! (sized up, never down); events are always copied out of it, so nothing
//! returned to the caller aliases the scratch.
//!
//! Compressed frames are length-prefixed, so the payload is read off the
//! transport in one `read_exact` and handed to the nested decoder for
//! streaming decompression. That keeps the outer stream aligned no matter
//! how much of its input the zlib decoder actually consumes.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ProtocolError;
use crate::event::Event;
use crate::frame::{Version, CODE_ACK, CODE_COMPRESSED, CODE_DATA, CODE_JSON_DATA, CODE_WINDOW_SIZE};
use crate::{inflate, Result, DEFAULT_MAX_FIELD_LEN, MAX_COMPRESSED_LEN};

/// Reads protocol frames from an async byte stream
pub struct FrameReader<R> {
    inner: R,
    /// Reusable field scratch, grown on demand
    scratch: Vec<u8>,
    /// Reusable compressed payload buffer
    payload: Vec<u8>,
    max_field_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a transport with the default field cap
    pub fn new(inner: R) -> Self {
        Self::with_max_field_len(inner, DEFAULT_MAX_FIELD_LEN)
    }

    /// Wrap a transport with a custom per-field length cap
    pub fn with_max_field_len(inner: R, max_field_len: usize) -> Self {
        Self {
            inner,
            scratch: Vec::with_capacity(64),
            payload: Vec::new(),
            max_field_len,
        }
    }

    /// Read a window size frame
    ///
    /// Returns `Ok(None)` when the stream ends cleanly before the frame
    /// starts; end-of-stream inside the frame is a transport error.
    pub async fn read_window_size(&mut self) -> Result<Option<(Version, u32)>> {
        let first = match self.inner.read_u8().await {
            Ok(byte) => byte,
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let code = self.inner.read_u8().await?;

        let version = Version::from_wire(first).filter(|_| code == CODE_WINDOW_SIZE);
        let Some(version) = version else {
            return Err(ProtocolError::UnexpectedFrame {
                expected: "window size",
                version: first,
                code,
            });
        };

        let count = self.inner.read_u32().await?;
        Ok(Some((version, count)))
    }

    /// Read an ACK frame, returning the acknowledged sequence
    pub async fn read_ack(&mut self) -> Result<u32> {
        let version = self.inner.read_u8().await?;
        let code = self.inner.read_u8().await?;
        if Version::from_wire(version).is_none() || code != CODE_ACK {
            return Err(ProtocolError::UnexpectedFrame {
                expected: "ACK",
                version,
                code,
            });
        }
        Ok(self.inner.read_u32().await?)
    }

    /// Read data frames until `events` holds `capacity` entries
    ///
    /// Compressed frames are decoded in place and may contribute any number
    /// of nested events. Returns the highest sequence number observed across
    /// all parsed frames, nested ones included.
    pub async fn read_frames(&mut self, events: &mut Vec<Event>, capacity: usize) -> Result<u32> {
        let mut max_seq = 0u32;
        while events.len() < capacity {
            let version = self.inner.read_u8().await?;
            let code = self.inner.read_u8().await?;

            let seq = match (Version::from_wire(version), code) {
                (Some(Version::V1), CODE_DATA) => {
                    let (event, seq) = self.read_data_v1().await?;
                    events.push(event);
                    seq
                }
                (Some(Version::V2), CODE_JSON_DATA) => {
                    let (event, seq) = self.read_json().await?;
                    events.push(event);
                    seq
                }
                (Some(_), CODE_COMPRESSED) => self.read_compressed(events, capacity).await?,
                _ => return Err(ProtocolError::UnknownFrame { version, code }),
            };
            max_seq = max_seq.max(seq);
        }
        Ok(max_seq)
    }

    /// Consume the reader, returning the transport
    pub fn into_inner(self) -> R {
        self.inner
    }

    async fn read_data_v1(&mut self) -> Result<(Event, u32)> {
        let seq = self.inner.read_u32().await?;
        let pairs = self.inner.read_u32().await? as usize;

        let mut fields = HashMap::with_capacity(pairs.min(64));
        for _ in 0..pairs {
            let key = self.read_string().await?;
            let value = self.read_string().await?;
            fields.insert(key, value);
        }
        Ok((Event::Fields(fields), seq))
    }

    async fn read_json(&mut self) -> Result<(Event, u32)> {
        let seq = self.inner.read_u32().await?;
        let len = self.checked_field_len().await?;
        self.fill_scratch(len).await?;
        // copy out: returned events must not alias the reusable scratch
        Ok((Event::Json(Bytes::copy_from_slice(&self.scratch[..len])), seq))
    }

    async fn read_compressed(&mut self, events: &mut Vec<Event>, capacity: usize) -> Result<u32> {
        let len = self.inner.read_u32().await? as usize;
        if len > MAX_COMPRESSED_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                len,
                max: MAX_COMPRESSED_LEN,
            });
        }

        if self.payload.len() < len {
            self.payload.resize(len, 0);
        }
        self.inner.read_exact(&mut self.payload[..len]).await?;

        inflate::read_frames(&self.payload[..len], events, capacity, self.max_field_len)
    }

    async fn read_string(&mut self) -> Result<String> {
        let len = self.checked_field_len().await?;
        self.fill_scratch(len).await?;
        Ok(String::from_utf8_lossy(&self.scratch[..len]).into_owned())
    }

    async fn checked_field_len(&mut self) -> Result<usize> {
        let len = self.inner.read_u32().await? as usize;
        if len > self.max_field_len {
            return Err(ProtocolError::FieldTooLarge {
                len,
                max: self.max_field_len,
            });
        }
        Ok(len)
    }

    async fn fill_scratch(&mut self, len: usize) -> Result<()> {
        if self.scratch.len() < len {
            self.scratch.resize(len, 0);
        }
        self.inner.read_exact(&mut self.scratch[..len]).await?;
        Ok(())
    }
}
