//! Sender authentication tokens

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Random bytes a side prepends to every message it sends
///
/// Each side generates its own and learns the peer's during the handshake.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Token {
    bytes: Vec<u8>,
}

impl Token {
    /// Generate `size` random bytes from the OS RNG
    pub fn generate(size: usize) -> Self {
        let mut bytes = vec![0u8; size];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Wrap token bytes received from the peer
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Get the raw token bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Token length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the token has no bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Position of the first occurrence of this token in `payload`
    pub fn find_in(&self, payload: &[u8]) -> Option<usize> {
        if self.bytes.is_empty() || payload.len() < self.bytes.len() {
            return None;
        }
        payload
            .windows(self.bytes.len())
            .position(|window| window == self.bytes.as_slice())
    }

    /// Remove the first occurrence of this token from `payload`
    ///
    /// Returns `None` if the token does not appear.
    pub fn strip_from(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let start = self.find_in(payload)?;
        let mut rest = Vec::with_capacity(payload.len() - self.bytes.len());
        rest.extend_from_slice(&payload[..start]);
        rest.extend_from_slice(&payload[start + self.bytes.len()..]);
        Some(rest)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({} bytes)", self.bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_size_and_randomness() {
        let a = Token::generate(32);
        let b = Token::generate(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert!(Token::generate(0).is_empty());
    }

    #[test]
    fn test_strip_prefix() {
        let token = Token::from_bytes(b"TOK".to_vec());
        assert_eq!(token.strip_from(b"TOKhello").unwrap(), b"hello");
        assert_eq!(token.strip_from(b"TOK").unwrap(), b"");
    }

    #[test]
    fn test_strip_removes_only_first_occurrence() {
        let token = Token::from_bytes(b"TOK".to_vec());
        assert_eq!(token.strip_from(b"TOKsay TOK").unwrap(), b"say TOK");
        assert_eq!(token.strip_from(b"xxTOKyyTOK").unwrap(), b"xxyyTOK");
    }

    #[test]
    fn test_missing_token() {
        let token = Token::from_bytes(b"TOK".to_vec());
        assert!(token.strip_from(b"hello").is_none());
        assert!(token.strip_from(b"TO").is_none());
        assert!(token.strip_from(b"").is_none());
    }

    #[test]
    fn test_debug_is_redacted() {
        let token = Token::from_bytes(vec![0x41; 4]);
        assert_eq!(format!("{:?}", token), "Token(4 bytes)");
    }
}
