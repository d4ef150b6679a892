//! Decoded event representation
//!
//! The protocol layer is opaque to v2 event contents: a `J` frame body is
//! handed through as raw bytes, exactly as received. v1 events are concrete
//! string maps.

use std::collections::HashMap;

use bytes::Bytes;

use crate::frame::Version;

/// A single event decoded from a data frame
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// v1 key/value event
    Fields(HashMap<String, String>),
    /// v2 event: a JSON document, raw bytes as received
    Json(Bytes),
}

impl Event {
    /// The key/value map of a v1 event, `None` for v2 events
    #[inline]
    pub fn fields(&self) -> Option<&HashMap<String, String>> {
        match self {
            Self::Fields(fields) => Some(fields),
            Self::Json(_) => None,
        }
    }

    /// The raw JSON bytes of a v2 event, `None` for v1 events
    #[inline]
    pub fn json(&self) -> Option<&Bytes> {
        match self {
            Self::Fields(_) => None,
            Self::Json(body) => Some(body),
        }
    }

    /// Protocol version this event arrived under
    #[inline]
    pub fn version(&self) -> Version {
        match self {
            Self::Fields(_) => Version::V1,
            Self::Json(_) => Version::V2,
        }
    }
}
