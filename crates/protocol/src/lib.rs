//! Lumberjack wire protocol - frame codec for the batch/ACK transport
//!
//! This crate implements the framing layer shared by the client and server
//! crates: reading and writing individual protocol frames against an async
//! byte stream, including the zlib-compressed substreams that carry nested
//! frames.
//!
//! # Wire Format
//!
//! Every frame starts with a 2-byte header: a protocol version byte (ASCII
//! `'1'` or `'2'`) followed by a frame code. All integers are big-endian.
//!
//! ```text
//! 'W'  window size   u32 count
//! 'D'  data (v1)     u32 seq, u32 pairs, pairs x (u32 klen, key, u32 vlen, value)
//! 'J'  JSON data     u32 seq, u32 len, raw JSON bytes
//! 'C'  compressed    u32 len, zlib stream of further frames
//! 'A'  ACK           u32 seq
//! ```
//!
//! Sequence numbers are 1-based and reset with every window. The final ACK
//! for a window must carry the window count.
//!
//! # Design
//!
//! - [`FrameReader`] and [`FrameWriter`] are generic over the transport, so
//!   TCP, TLS, and in-memory test streams all work unchanged
//! - Decoded v2 payloads are copied into `bytes::Bytes`; the reader's scratch
//!   buffer is reused across frames and never aliases returned events
//! - Compressed payloads are length-bounded on the wire and decoded through
//!   a streaming zlib reader; nested compressed frames read through a
//!   length-limited sub-reader whose remainder is drained after decode

mod error;
mod event;
mod frame;
mod inflate;
mod reader;
mod writer;

pub use error::ProtocolError;
pub use event::Event;
pub use frame::{
    Version, CODE_ACK, CODE_COMPRESSED, CODE_DATA, CODE_JSON_DATA, CODE_WINDOW_SIZE, VERSION_1,
    VERSION_2,
};
pub use reader::FrameReader;
pub use writer::{compress_frames, encode_data_frame, encode_json_frame, FrameWriter};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Default cap on a single wire field (v1 key or value, v2 JSON body)
pub const DEFAULT_MAX_FIELD_LEN: usize = 1024 * 1024;

/// Cap on one compressed frame payload (the compressed byte count)
pub const MAX_COMPRESSED_LEN: usize = 64 * 1024 * 1024;
