//! Length-prefix framing for application messages
//!
//! ```text
//! +----------------------+------------------------+
//! | length (N bytes, BE) | ciphertext (length B)  |
//! +----------------------+------------------------+
//! ```
//!
//! `N` is the configured `number_size`. Handshake messages are not framed.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{ProtocolError, ProtocolResult, MAX_NUMBER_SIZE};

/// Fixed-width big-endian length prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPrefix {
    width: usize,
}

impl LengthPrefix {
    /// Create a prefix codec `width` bytes wide (1-8)
    pub fn new(width: usize) -> ProtocolResult<Self> {
        if width == 0 || width > MAX_NUMBER_SIZE {
            return Err(ProtocolError::InvalidConfig(format!(
                "number_size must be between 1 and {}, got {}",
                MAX_NUMBER_SIZE, width
            )));
        }
        Ok(Self { width })
    }

    /// Width in bytes
    pub fn width(&self) -> usize {
        self.width
    }

    /// Largest length representable, `2^(8N) - 1`
    pub fn max_length(&self) -> u64 {
        if self.width == MAX_NUMBER_SIZE {
            u64::MAX
        } else {
            (1u64 << (8 * self.width)) - 1
        }
    }

    /// Encode a payload length
    pub fn encode(&self, length: u64) -> ProtocolResult<Bytes> {
        if length > self.max_length() {
            return Err(ProtocolError::LengthOverflow {
                size: length,
                max: self.max_length(),
            });
        }

        let mut buf = BytesMut::with_capacity(self.width);
        buf.put_uint(length, self.width);
        Ok(buf.freeze())
    }

    /// Decode a prefix read off the wire
    pub fn decode(&self, mut data: &[u8]) -> ProtocolResult<u64> {
        if data.len() != self.width {
            return Err(ProtocolError::PrefixLength {
                expected: self.width,
                actual: data.len(),
            });
        }
        Ok(data.get_uint(self.width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_width_is_big_endian() {
        let prefix = LengthPrefix::new(5).unwrap();
        let encoded = prefix.encode(0x01_0203_0405).unwrap();
        assert_eq!(&encoded[..], &[0x01, 0x02, 0x03, 0x04, 0x05]);

        let encoded = prefix.encode(256).unwrap();
        assert_eq!(&encoded[..], &[0, 0, 0, 1, 0]);
        assert_eq!(prefix.decode(&encoded).unwrap(), 256);
    }

    #[test]
    fn test_max_length_per_width() {
        assert_eq!(LengthPrefix::new(1).unwrap().max_length(), 255);
        assert_eq!(LengthPrefix::new(2).unwrap().max_length(), 65_535);
        assert_eq!(LengthPrefix::new(5).unwrap().max_length(), (1u64 << 40) - 1);
        assert_eq!(LengthPrefix::new(8).unwrap().max_length(), u64::MAX);
    }

    #[test]
    fn test_overflow_is_rejected() {
        let prefix = LengthPrefix::new(1).unwrap();
        assert_eq!(&prefix.encode(255).unwrap()[..], &[0xFF]);
        assert!(matches!(
            prefix.encode(256),
            Err(ProtocolError::LengthOverflow { size: 256, max: 255 })
        ));
    }

    #[test]
    fn test_wide_prefix() {
        let prefix = LengthPrefix::new(8).unwrap();
        let encoded = prefix.encode(1).unwrap();
        assert_eq!(&encoded[..], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(prefix.decode(&encoded).unwrap(), 1);
    }

    #[test]
    fn test_invalid_width() {
        assert!(LengthPrefix::new(0).is_err());
        assert!(LengthPrefix::new(9).is_err());
    }

    #[test]
    fn test_decode_wrong_size() {
        let prefix = LengthPrefix::new(5).unwrap();
        assert!(matches!(
            prefix.decode(&[0, 1]),
            Err(ProtocolError::PrefixLength { expected: 5, actual: 2 })
        ));
    }
}
