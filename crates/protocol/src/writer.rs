//! Frame encoding
//!
//! [`FrameWriter`] writes frames to an async byte stream. Each frame is
//! staged in a reusable buffer and written with a single `write_all`, so one
//! frame never interleaves with another on an unbuffered transport.
//!
//! The free functions encode data frames into a plain `Vec<u8>`; callers use
//! them to assemble the concatenated frames that go inside a compressed
//! payload before handing the result to [`compress_frames`].

use std::collections::HashMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::frame::{
    Version, CODE_ACK, CODE_COMPRESSED, CODE_DATA, CODE_JSON_DATA, CODE_WINDOW_SIZE, VERSION_1,
    VERSION_2,
};
use crate::Result;

/// Append a v2 JSON data frame to `buf`
pub fn encode_json_frame(buf: &mut Vec<u8>, seq: u32, body: &[u8]) {
    buf.extend_from_slice(&[VERSION_2, CODE_JSON_DATA]);
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(body);
}

/// Append a v1 key/value data frame to `buf`
pub fn encode_data_frame(buf: &mut Vec<u8>, seq: u32, fields: &HashMap<String, String>) {
    buf.extend_from_slice(&[VERSION_1, CODE_DATA]);
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&(fields.len() as u32).to_be_bytes());
    for (key, value) in fields {
        buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
        buf.extend_from_slice(key.as_bytes());
        buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
        buf.extend_from_slice(value.as_bytes());
    }
}

/// zlib-compress a buffer of pre-encoded frames into a `C` frame payload
///
/// `level` follows zlib conventions: 0 stores, 9 compresses hardest.
pub fn compress_frames(frames: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(frames.len() / 2 + 64),
        Compression::new(level),
    );
    encoder.write_all(frames)?;
    Ok(encoder.finish()?)
}

/// Writes protocol frames to an async byte stream
pub struct FrameWriter<W> {
    inner: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap a transport
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(256),
        }
    }

    /// Write a window size frame announcing `count` upcoming events
    pub async fn write_window_size(&mut self, version: Version, count: u32) -> Result<()> {
        let mut frame = [version.wire_byte(), CODE_WINDOW_SIZE, 0, 0, 0, 0];
        frame[2..].copy_from_slice(&count.to_be_bytes());
        self.inner.write_all(&frame).await?;
        Ok(())
    }

    /// Write an ACK frame for `seq`
    pub async fn write_ack(&mut self, version: Version, seq: u32) -> Result<()> {
        let mut frame = [version.wire_byte(), CODE_ACK, 0, 0, 0, 0];
        frame[2..].copy_from_slice(&seq.to_be_bytes());
        self.inner.write_all(&frame).await?;
        Ok(())
    }

    /// Write a v2 JSON data frame; `body` is pre-serialized by the caller
    pub async fn write_json(&mut self, seq: u32, body: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_json_frame(&mut self.buf, seq, body);
        self.inner.write_all(&self.buf).await?;
        Ok(())
    }

    /// Write a v1 key/value data frame
    pub async fn write_data(&mut self, seq: u32, fields: &HashMap<String, String>) -> Result<()> {
        self.buf.clear();
        encode_data_frame(&mut self.buf, seq, fields);
        self.inner.write_all(&self.buf).await?;
        Ok(())
    }

    /// Write a compressed frame from an already-compressed payload
    pub async fn write_compressed(&mut self, version: Version, payload: &[u8]) -> Result<()> {
        let mut header = [version.wire_byte(), CODE_COMPRESSED, 0, 0, 0, 0];
        header[2..].copy_from_slice(&(payload.len() as u32).to_be_bytes());
        self.inner.write_all(&header).await?;
        self.inner.write_all(payload).await?;
        Ok(())
    }

    /// Flush the transport
    pub async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Flush and shut the write side down
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Consume the writer, returning the transport
    pub fn into_inner(self) -> W {
        self.inner
    }
}
