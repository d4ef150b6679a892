//! Nested frame decoding for compressed payloads
//!
//! A `C` frame carries a zlib stream that itself contains concatenated
//! frames, possibly including further `C` frames. The decompressed stream is
//! parsed here with blocking reads over the in-memory payload.
//!
//! Nested compressed frames are decoded through a length-limited sub-reader
//! (`Read::take`); the zlib decoder does not always consume its trailer, so
//! whatever the decoder leaves of the limit is drained afterwards to keep
//! the enclosing stream aligned on the next frame header.
//!
//! A substream that ends cleanly on a frame boundary simply returns control
//! to the caller - the window may still be satisfied by later frames.
//! Ending mid-frame is an error.

use std::collections::HashMap;
use std::io::{self, Read};

use bytes::Bytes;
use flate2::read::ZlibDecoder;

use crate::error::ProtocolError;
use crate::event::Event;
use crate::frame::{Version, CODE_COMPRESSED, CODE_DATA, CODE_JSON_DATA};
use crate::{Result, MAX_COMPRESSED_LEN};

/// Nesting bound for compressed-in-compressed frames
const MAX_DEPTH: usize = 8;

/// Decode the contents of a compressed frame payload into `events`
///
/// Parses decompressed frames until `events` reaches `capacity` or the
/// stream ends. Returns the highest sequence number observed.
pub(crate) fn read_frames(
    payload: &[u8],
    events: &mut Vec<Event>,
    capacity: usize,
    max_field_len: usize,
) -> Result<u32> {
    let mut scratch = Vec::with_capacity(64);
    let mut decoder = ZlibDecoder::new(payload);
    read_nested(&mut decoder, events, capacity, max_field_len, &mut scratch, 0)
}

fn read_nested(
    input: &mut dyn Read,
    events: &mut Vec<Event>,
    capacity: usize,
    max_field_len: usize,
    scratch: &mut Vec<u8>,
    depth: usize,
) -> Result<u32> {
    if depth > MAX_DEPTH {
        return Err(ProtocolError::NestingTooDeep { max: MAX_DEPTH });
    }

    let mut max_seq = 0u32;
    while events.len() < capacity {
        let Some((version, code)) = read_header(input)? else {
            break;
        };

        let seq = match (Version::from_wire(version), code) {
            (Some(Version::V1), CODE_DATA) => {
                let (event, seq) = read_data_v1(input, scratch, max_field_len)?;
                events.push(event);
                seq
            }
            (Some(Version::V2), CODE_JSON_DATA) => {
                let (event, seq) = read_json(input, scratch, max_field_len)?;
                events.push(event);
                seq
            }
            (Some(_), CODE_COMPRESSED) => {
                let len = read_u32(input)? as usize;
                if len > MAX_COMPRESSED_LEN {
                    return Err(ProtocolError::PayloadTooLarge {
                        len,
                        max: MAX_COMPRESSED_LEN,
                    });
                }

                let mut sub = (&mut *input).take(len as u64);
                let seq = {
                    let mut decoder = ZlibDecoder::new(&mut sub);
                    read_nested(&mut decoder, events, capacity, max_field_len, scratch, depth + 1)?
                };
                // the decoder may leave trailer bytes unread; drain the
                // limit so the enclosing stream stays frame-aligned
                io::copy(&mut sub, &mut io::sink()).map_err(map_err)?;
                seq
            }
            _ => return Err(ProtocolError::UnknownFrame { version, code }),
        };
        max_seq = max_seq.max(seq);
    }
    Ok(max_seq)
}

/// Read a 2-byte frame header; `None` on clean end-of-stream
fn read_header(input: &mut dyn Read) -> Result<Option<(u8, u8)>> {
    let mut first = [0u8; 1];
    loop {
        match input.read(&mut first) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(map_err(err)),
        }
    }

    let mut second = [0u8; 1];
    read_exact(input, &mut second)?;
    Ok(Some((first[0], second[0])))
}

fn read_data_v1(
    input: &mut dyn Read,
    scratch: &mut Vec<u8>,
    max_field_len: usize,
) -> Result<(Event, u32)> {
    let seq = read_u32(input)?;
    let pairs = read_u32(input)? as usize;

    let mut fields = HashMap::with_capacity(pairs.min(64));
    for _ in 0..pairs {
        let key = read_string(input, scratch, max_field_len)?;
        let value = read_string(input, scratch, max_field_len)?;
        fields.insert(key, value);
    }
    Ok((Event::Fields(fields), seq))
}

fn read_json(
    input: &mut dyn Read,
    scratch: &mut Vec<u8>,
    max_field_len: usize,
) -> Result<(Event, u32)> {
    let seq = read_u32(input)?;
    let len = checked_field_len(input, max_field_len)?;
    fill_scratch(input, scratch, len)?;
    Ok((Event::Json(Bytes::copy_from_slice(&scratch[..len])), seq))
}

fn read_string(input: &mut dyn Read, scratch: &mut Vec<u8>, max_field_len: usize) -> Result<String> {
    let len = checked_field_len(input, max_field_len)?;
    fill_scratch(input, scratch, len)?;
    Ok(String::from_utf8_lossy(&scratch[..len]).into_owned())
}

fn checked_field_len(input: &mut dyn Read, max_field_len: usize) -> Result<usize> {
    let len = read_u32(input)? as usize;
    if len > max_field_len {
        return Err(ProtocolError::FieldTooLarge {
            len,
            max: max_field_len,
        });
    }
    Ok(len)
}

fn fill_scratch(input: &mut dyn Read, scratch: &mut Vec<u8>, len: usize) -> Result<()> {
    if scratch.len() < len {
        scratch.resize(len, 0);
    }
    read_exact(input, &mut scratch[..len])
}

fn read_u32(input: &mut dyn Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(input, &mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_exact(input: &mut dyn Read, buf: &mut [u8]) -> Result<()> {
    input.read_exact(buf).map_err(map_err)
}

/// Errors inside a substream are either truncation or decoder failures;
/// there is no live transport underneath
fn map_err(err: io::Error) -> ProtocolError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ProtocolError::TruncatedPayload
    } else {
        ProtocolError::Zlib(err.to_string())
    }
}
