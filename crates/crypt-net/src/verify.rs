//! Peer identity hook called during the handshake

use crypt_cipher::RsaPublicKey;

/// Which side of the handshake a session was established on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// We connected and sent the first encrypted message
    Initiator,
    /// We accepted the connection and sent our public key first
    Acceptor,
}

/// Decides whether a peer's public key is acceptable
///
/// The protocol itself has no trust anchor: without a verifier that pins or
/// otherwise checks keys, the first key seen is trusted.
pub trait PeerVerifier: Send + Sync {
    /// Return `Err(reason)` to abort the handshake
    fn verify(&self, role: Role, peer_public_key: &RsaPublicKey) -> Result<(), String>;
}

/// Accepts every key
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustOnFirstUse;

impl PeerVerifier for TrustOnFirstUse {
    fn verify(&self, _role: Role, _peer_public_key: &RsaPublicKey) -> Result<(), String> {
        Ok(())
    }
}

impl<F> PeerVerifier for F
where
    F: Fn(Role, &RsaPublicKey) -> Result<(), String> + Send + Sync,
{
    fn verify(&self, role: Role, peer_public_key: &RsaPublicKey) -> Result<(), String> {
        self(role, peer_public_key)
    }
}
