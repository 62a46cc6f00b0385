//! Crypt Cipher - RSA-OAEP block encryption for Cryptsock
//!
//! Provides key pairs, chunked asymmetric encryption and the random
//! tokens each side uses to stamp its messages.

mod block;
mod error;
mod keys;
mod token;

pub use block::*;
pub use error::*;
pub use keys::*;
pub use token::*;

pub use rsa::traits::PublicKeyParts;
pub use rsa::{RsaPrivateKey, RsaPublicKey};

/// Smallest key size accepted for freshly generated keys
pub const MIN_KEY_BITS: usize = 1024;

/// OAEP overhead in bits, folded into the block capacity formula
pub const OAEP_OVERHEAD_BITS: usize = 384;

/// Bytes added back after removing the OAEP overhead
pub const OAEP_CAPACITY_SLACK: usize = 6;
