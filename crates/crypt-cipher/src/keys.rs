//! RSA key pairs and public key encoding

use std::fmt;

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{CryptoError, CryptoResult, MIN_KEY_BITS};

/// Check a requested key size before generating anything
pub fn validate_key_bits(bits: usize) -> CryptoResult<()> {
    if bits % 8 != 0 || bits < MIN_KEY_BITS {
        return Err(CryptoError::InvalidKeySize { bits });
    }
    Ok(())
}

/// RSA key pair owned by one side of a connection
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a new key pair of `bits` bits
    ///
    /// This is CPU heavy for large sizes; async callers should run it on a
    /// blocking thread.
    pub fn generate(bits: usize) -> CryptoResult<Self> {
        validate_key_bits(bits)?;

        debug!("Generating {}-bit RSA key pair", bits);
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

        Ok(Self::from_private_key(private))
    }

    /// Wrap an existing private key (not re-validated)
    pub fn from_private_key(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        Self { private, public }
    }

    /// Load a private key from PKCS#8 or PKCS#1 PEM
    pub fn from_private_key_pem(pem: &str) -> CryptoResult<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self::from_private_key(private))
    }

    /// Load a passphrase-protected PKCS#8 private key
    pub fn from_encrypted_private_key_pem(pem: &str, passphrase: &str) -> CryptoResult<Self> {
        let private = RsaPrivateKey::from_pkcs8_encrypted_pem(pem, passphrase.as_bytes())
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self::from_private_key(private))
    }

    /// Export the private key as PKCS#8 PEM
    pub fn private_key_pem(&self) -> CryptoResult<Zeroizing<String>> {
        self.private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Encoding(e.to_string()))
    }

    /// Export the private key as encrypted PKCS#8 PEM
    ///
    /// Uses PBES2 with scrypt and AES-256-CBC.
    pub fn encrypted_private_key_pem(&self, passphrase: &str) -> CryptoResult<Zeroizing<String>> {
        self.private
            .to_pkcs8_encrypted_pem(OsRng, passphrase.as_bytes(), LineEnding::LF)
            .map_err(|e| CryptoError::Encoding(e.to_string()))
    }

    /// Export the public key as it travels on the wire
    pub fn public_key_pem(&self) -> CryptoResult<String> {
        encode_public_key(&self.public)
    }

    /// Get the public half
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Get the private half
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.public.n().bits()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// Encode a public key as SubjectPublicKeyInfo PEM
pub fn encode_public_key(key: &RsaPublicKey) -> CryptoResult<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::Encoding(e.to_string()))
}

/// Decode a peer's public key
///
/// Accepts SubjectPublicKeyInfo PEM and falls back to PKCS#1 PEM.
pub fn decode_public_key(data: &[u8]) -> CryptoResult<RsaPublicKey> {
    let pem = std::str::from_utf8(data)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?
        .trim();

    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::OnceLock;

    use super::KeyPair;

    /// Two independent 1024-bit key pairs, generated once per test binary
    pub fn key_pairs() -> &'static (KeyPair, KeyPair) {
        static KEYS: OnceLock<(KeyPair, KeyPair)> = OnceLock::new();
        KEYS.get_or_init(|| {
            (
                KeyPair::generate(1024).unwrap(),
                KeyPair::generate(1024).unwrap(),
            )
        })
    }
}
