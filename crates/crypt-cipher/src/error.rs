//! Cipher error types

use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key size: {bits} bits (must be a multiple of 8 and >= 1024)")]
    InvalidKeySize { bits: usize },

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Key encoding failed: {0}")]
    Encoding(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Ciphertext length {len} is not a multiple of the {block}-byte block size")]
    TruncatedCiphertext { len: usize, block: usize },

    #[error("Decryption failed")]
    DecryptionFailed,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
