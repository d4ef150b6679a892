//! Frame codes and protocol versions

/// Version byte for v1 frames
pub const VERSION_1: u8 = b'1';

/// Version byte for v2 frames
pub const VERSION_2: u8 = b'2';

/// Window size frame code
pub const CODE_WINDOW_SIZE: u8 = b'W';

/// v1 key/value data frame code
pub const CODE_DATA: u8 = b'D';

/// v2 JSON data frame code
pub const CODE_JSON_DATA: u8 = b'J';

/// Compressed frame code
pub const CODE_COMPRESSED: u8 = b'C';

/// ACK frame code
pub const CODE_ACK: u8 = b'A';

/// Protocol version carried in every frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// v1: key/value map events in `D` frames
    V1,
    /// v2: opaque JSON events in `J` frames
    V2,
}

impl Version {
    /// Parse a wire version byte
    #[inline]
    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            VERSION_1 => Some(Self::V1),
            VERSION_2 => Some(Self::V2),
            _ => None,
        }
    }

    /// Byte written on the wire for this version
    #[inline]
    pub const fn wire_byte(self) -> u8 {
        match self {
            Self::V1 => VERSION_1,
            Self::V2 => VERSION_2,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 => write!(f, "v1"),
            Self::V2 => write!(f, "v2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_wire_round_trip() {
        assert_eq!(Version::from_wire(b'1'), Some(Version::V1));
        assert_eq!(Version::from_wire(b'2'), Some(Version::V2));
        assert_eq!(Version::V1.wire_byte(), b'1');
        assert_eq!(Version::V2.wire_byte(), b'2');
    }

    #[test]
    fn test_version_rejects_unknown_bytes() {
        assert_eq!(Version::from_wire(b'3'), None);
        assert_eq!(Version::from_wire(0), None);
        assert_eq!(Version::from_wire(1), None);
    }
}
