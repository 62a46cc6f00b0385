//! Chunked RSA-OAEP encryption of arbitrary-length payloads
//!
//! Plaintext is cut into chunks of at most [`max_block_size`] bytes and each
//! chunk is encrypted on its own. Every OAEP block serializes to exactly one
//! modulus-sized ciphertext block, so decryption cuts on the modulus size and
//! never needs the original chunk boundaries.

use bytes::BytesMut;
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use tracing::debug;

use crate::{CryptoError, CryptoResult, OAEP_CAPACITY_SLACK, OAEP_OVERHEAD_BITS};

/// OAEP with SHA-1 for both the label hash and MGF1
fn padding() -> Oaep {
    Oaep::new::<Sha1>()
}

/// Plaintext capacity of one block for a modulus of `bits` bits
///
/// `floor((bits - 384) / 8) + 6`, which is `bytes - 2 * 20 - 2` for OAEP
/// with SHA-1.
pub fn block_capacity(bits: usize) -> CryptoResult<usize> {
    if bits < OAEP_OVERHEAD_BITS {
        return Err(CryptoError::InvalidKeySize { bits });
    }
    Ok((bits - OAEP_OVERHEAD_BITS) / 8 + OAEP_CAPACITY_SLACK)
}

/// Maximum plaintext bytes per block when encrypting to `public_key`
pub fn max_block_size(public_key: &RsaPublicKey) -> CryptoResult<usize> {
    block_capacity(public_key.n().bits())
}

/// Exact ciphertext size `encrypt` produces for `plaintext_len` bytes
pub fn ciphertext_len(plaintext_len: usize, public_key: &RsaPublicKey) -> CryptoResult<usize> {
    let capacity = max_block_size(public_key)?;
    Ok(plaintext_len.div_ceil(capacity) * public_key.size())
}

/// Encrypt `plaintext` to `public_key`, block by block
///
/// An empty plaintext produces an empty ciphertext.
pub fn encrypt(plaintext: &[u8], public_key: &RsaPublicKey) -> CryptoResult<Vec<u8>> {
    let capacity = max_block_size(public_key)?;
    let mut out = BytesMut::with_capacity(ciphertext_len(plaintext.len(), public_key)?);

    for chunk in plaintext.chunks(capacity) {
        let block = public_key
            .encrypt(&mut OsRng, padding(), chunk)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        out.extend_from_slice(&block);
    }

    Ok(out.to_vec())
}

/// Decrypt `ciphertext` with `private_key`
///
/// Fails as a whole if any block is short or does not decrypt.
pub fn decrypt(ciphertext: &[u8], private_key: &RsaPrivateKey) -> CryptoResult<Vec<u8>> {
    let block_size = private_key.size();
    if ciphertext.len() % block_size != 0 {
        return Err(CryptoError::TruncatedCiphertext {
            len: ciphertext.len(),
            block: block_size,
        });
    }

    let mut out = BytesMut::with_capacity(ciphertext.len());
    for (index, block) in ciphertext.chunks(block_size).enumerate() {
        let plain = private_key.decrypt(padding(), block).map_err(|e| {
            debug!("Block {} failed to decrypt: {}", index, e);
            CryptoError::DecryptionFailed
        })?;
        out.extend_from_slice(&plain);
    }

    Ok(out.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::fixtures;

    #[test]
    fn test_block_capacity() {
        assert_eq!(block_capacity(1024).unwrap(), 86);
        assert_eq!(block_capacity(2048).unwrap(), 214);
        assert_eq!(block_capacity(4096).unwrap(), 470);
        assert_eq!(block_capacity(384).unwrap(), 6);
        assert!(block_capacity(383).is_err());
    }

    #[test]
    fn test_max_block_size_matches_oaep_sha1_limit() {
        let (a, _) = fixtures::key_pairs();
        let capacity = max_block_size(a.public_key()).unwrap();
        assert_eq!(capacity, a.public_key().size() - 2 * 20 - 2);

        // A block of exactly the capacity must still encrypt
        let full = vec![0xAB; capacity];
        let ciphertext = encrypt(&full, a.public_key()).unwrap();
        assert_eq!(ciphertext.len(), a.public_key().size());
    }

    #[test]
    fn test_round_trip_lengths() {
        let (a, _) = fixtures::key_pairs();
        let capacity = max_block_size(a.public_key()).unwrap();

        for len in [0, 1, capacity - 1, capacity, capacity + 1, 3 * capacity + 17] {
            let message: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let ciphertext = encrypt(&message, a.public_key()).unwrap();
            let decrypted = decrypt(&ciphertext, a.private_key()).unwrap();
            assert_eq!(decrypted, message, "length {}", len);
        }
    }

    #[test]
    fn test_chunk_count() {
        let (a, _) = fixtures::key_pairs();
        let capacity = max_block_size(a.public_key()).unwrap();
        let block = a.public_key().size();

        // k * L + r with k = 2, r = 5
        let message = vec![7u8; 2 * capacity + 5];
        let ciphertext = encrypt(&message, a.public_key()).unwrap();
        assert_eq!(ciphertext.len(), 3 * block);
        assert_eq!(ciphertext_len(message.len(), a.public_key()).unwrap(), 3 * block);

        for chunk in ciphertext.chunks(block) {
            assert!(a.private_key().decrypt(padding(), chunk).is_ok());
        }
        assert_eq!(decrypt(&ciphertext, a.private_key()).unwrap(), message);
    }

    #[test]
    fn test_empty_plaintext() {
        let (a, _) = fixtures::key_pairs();
        assert!(encrypt(b"", a.public_key()).unwrap().is_empty());
        assert!(decrypt(b"", a.private_key()).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_fails() {
        let (a, b) = fixtures::key_pairs();
        let ciphertext = encrypt(b"secret", a.public_key()).unwrap();
        assert!(matches!(
            decrypt(&ciphertext, b.private_key()),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let (a, _) = fixtures::key_pairs();
        let ciphertext = encrypt(&[1u8; 200], a.public_key()).unwrap();
        let truncated = &ciphertext[..ciphertext.len() - 1];
        assert!(matches!(
            decrypt(truncated, a.private_key()),
            Err(CryptoError::TruncatedCiphertext { .. })
        ));
    }

    #[test]
    fn test_corrupted_block_fails_whole_message() {
        let (a, _) = fixtures::key_pairs();
        let mut ciphertext = encrypt(&[1u8; 200], a.public_key()).unwrap();
        let last = ciphertext.len() - 10;
        ciphertext[last] ^= 0xFF;
        assert!(matches!(
            decrypt(&ciphertext, a.private_key()),
            Err(CryptoError::DecryptionFailed)
        ));
    }
}
