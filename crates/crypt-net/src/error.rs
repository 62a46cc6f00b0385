//! Session error types

use std::string::FromUtf8Error;

use crypt_cipher::CryptoError;
use crypt_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Key exchange failed: {0}")]
    KeyExchangeFailed(String),

    #[error("Peer disconnected: {0}")]
    PeerDisconnected(String),

    #[error("Unable to decrypt the peer message")]
    UnableToDecrypt,

    #[error("The peer token does not match the one exchanged during the handshake")]
    InvalidToken,

    #[error("Invalid key size: {bits} bits (must be a multiple of 8 and >= 1024)")]
    InvalidKeySize { bits: usize },

    #[error("Message too large: {size} ciphertext bytes (max: {max})")]
    MessageTooLarge { size: u64, max: u64 },

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: u64, max: u64 },

    #[error("Message is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ProtocolError),

    #[error("Cipher error: {0}")]
    Cipher(CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the session is unusable after this error
    ///
    /// `UnableToDecrypt` is only fatal on the accepting side, which closes
    /// the connection; check `Session::is_closed` for that case.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::KeyExchangeFailed(_)
                | SessionError::PeerDisconnected(_)
                | SessionError::FrameTooLarge { .. }
        )
    }
}

impl From<CryptoError> for SessionError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKeySize { bits } => SessionError::InvalidKeySize { bits },
            other => SessionError::Cipher(other),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
