//! Four-message key and token exchange
//!
//! ```text
//! Acceptor                                  Initiator
//!    | 1. acceptor public key (PEM, plain)      |
//!    |----------------------------------------->|
//!    | 2. E(acceptor_pk, initiator public key)  |
//!    |<-----------------------------------------|
//!    | 3. E(initiator_pk, acceptor token)       |
//!    |----------------------------------------->|
//!    | 4. E(acceptor_pk, initiator token)       |
//!    |<-----------------------------------------|
//! ```
//!
//! None of the messages is length-prefixed. Key messages are read until they
//! are structurally complete; token messages are read at the exact size a
//! `token_size` token encrypts to, so the acceptor never consumes the start
//! of the first application frame. Both ends must use the same `token_size`.
//!
//! Any failure shuts the transport down and surfaces as
//! [`SessionError::KeyExchangeFailed`]; no partial session is returned.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use crypt_cipher::{KeyPair, PublicKeyParts, RsaPublicKey, Token};
use crypt_protocol::{LengthPrefix, SessionConfig};
use tracing::{debug, info, warn};

use crate::transport::{self, Transport};
use crate::{PeerVerifier, Role, Session, SessionError, SessionResult};

const PEM_BEGIN: &[u8] = b"-----BEGIN";
const PEM_END: &[u8] = b"-----END ";
const PEM_DASHES: &[u8] = b"-----";

/// How long to wait for a PEM end line's terminator that trails the marker
const TERMINATOR_GRACE: Duration = Duration::from_millis(250);

/// Keys and tokens learned during a successful exchange
struct Exchanged {
    peer_public_key: RsaPublicKey,
    own_token: Token,
    peer_token: Token,
}

/// Run the accepting side of the handshake over `stream`
///
/// `keys` is the acceptor's long-lived key pair. `timeout` bounds each raw
/// read and write.
pub async fn accept_handshake<S: Transport>(
    mut stream: S,
    keys: Arc<KeyPair>,
    config: &SessionConfig,
    verifier: &dyn PeerVerifier,
    timeout: Option<Duration>,
) -> SessionResult<Session<S>> {
    config.validate()?;
    let prefix = LengthPrefix::new(config.number_size)?;

    match run_acceptor(&mut stream, &keys, config, verifier, timeout).await {
        Ok(exchanged) => {
            info!("Handshake complete (acceptor)");
            Ok(Session::new(
                stream,
                Role::Acceptor,
                keys,
                exchanged.peer_public_key,
                exchanged.own_token,
                exchanged.peer_token,
                prefix,
                config.max_frame_size,
            ))
        }
        Err(reason) => {
            warn!("Handshake failed (acceptor): {}", reason);
            transport::shutdown(&mut stream).await;
            Err(SessionError::KeyExchangeFailed(reason))
        }
    }
}

/// Run the initiating side of the handshake over `stream`
///
/// `keys` is the initiator's own key pair, usually generated per connection.
pub async fn initiate_handshake<S: Transport>(
    mut stream: S,
    keys: Arc<KeyPair>,
    config: &SessionConfig,
    verifier: &dyn PeerVerifier,
    timeout: Option<Duration>,
) -> SessionResult<Session<S>> {
    config.validate()?;
    let prefix = LengthPrefix::new(config.number_size)?;

    match run_initiator(&mut stream, &keys, config, verifier, timeout).await {
        Ok(exchanged) => {
            info!("Handshake complete (initiator)");
            Ok(Session::new(
                stream,
                Role::Initiator,
                keys,
                exchanged.peer_public_key,
                exchanged.own_token,
                exchanged.peer_token,
                prefix,
                config.max_frame_size,
            ))
        }
        Err(reason) => {
            warn!("Handshake failed (initiator): {}", reason);
            transport::shutdown(&mut stream).await;
            Err(SessionError::KeyExchangeFailed(reason))
        }
    }
}

async fn run_acceptor<S: Transport>(
    stream: &mut S,
    keys: &KeyPair,
    config: &SessionConfig,
    verifier: &dyn PeerVerifier,
    timeout: Option<Duration>,
) -> Result<Exchanged, String> {
    // 1. Our public key, in the clear
    let own_pem = keys.public_key_pem().map_err(step("export public key"))?;
    transport::write_all(stream, own_pem.as_bytes(), timeout)
        .await
        .map_err(step("send public key"))?;
    debug!("Sent {}-byte public key", own_pem.len());

    // 2. The initiator's public key, encrypted to us
    let peer_pem = read_sealed_key(stream, keys, config.tunnel_anchor, timeout).await?;
    let peer_public_key =
        crypt_cipher::decode_public_key(&peer_pem).map_err(step("decode peer key"))?;
    verifier
        .verify(Role::Acceptor, &peer_public_key)
        .map_err(step("peer key rejected"))?;
    debug!("Received {}-bit peer key", peer_public_key.n().bits());

    // 3. Our token, encrypted to the initiator
    let own_token = Token::generate(config.token_size);
    let sealed = crypt_cipher::encrypt(own_token.as_bytes(), &peer_public_key)
        .map_err(step("encrypt token"))?;
    transport::write_all(stream, &sealed, timeout)
        .await
        .map_err(step("send token"))?;

    // 4. The initiator's token, encrypted to us
    let peer_token = read_sealed_token(stream, keys, config, timeout).await?;

    Ok(Exchanged {
        peer_public_key,
        own_token,
        peer_token,
    })
}

async fn run_initiator<S: Transport>(
    stream: &mut S,
    keys: &KeyPair,
    config: &SessionConfig,
    verifier: &dyn PeerVerifier,
    timeout: Option<Duration>,
) -> Result<Exchanged, String> {
    // 1. The acceptor's public key, in the clear
    let mut peer_pem =
        transport::read_unframed(stream, config.tunnel_anchor, timeout, pem_complete)
            .await
            .map_err(step("read acceptor key"))?;
    while missing_terminator(&peer_pem) {
        match transport::read_trailing(stream, 1, TERMINATOR_GRACE, timeout)
            .await
            .map_err(step("read acceptor key"))?
        {
            Some(byte) => peer_pem.extend_from_slice(&byte),
            None => break,
        }
    }
    let peer_public_key =
        crypt_cipher::decode_public_key(&peer_pem).map_err(step("decode acceptor key"))?;
    verifier
        .verify(Role::Initiator, &peer_public_key)
        .map_err(step("acceptor key rejected"))?;
    debug!("Received {}-bit acceptor key", peer_public_key.n().bits());

    // 2. Our public key, encrypted to the acceptor
    let own_pem = keys.public_key_pem().map_err(step("export public key"))?;
    let sealed = crypt_cipher::encrypt(own_pem.as_bytes(), &peer_public_key)
        .map_err(step("encrypt public key"))?;
    transport::write_all(stream, &sealed, timeout)
        .await
        .map_err(step("send public key"))?;

    // 3. The acceptor's token, encrypted to us
    let peer_token = read_sealed_token(stream, keys, config, timeout).await?;

    // 4. Our token, encrypted to the acceptor
    let own_token = Token::generate(config.token_size);
    let sealed = crypt_cipher::encrypt(own_token.as_bytes(), &peer_public_key)
        .map_err(step("encrypt token"))?;
    transport::write_all(stream, &sealed, timeout)
        .await
        .map_err(step("send token"))?;

    Ok(Exchanged {
        peer_public_key,
        own_token,
        peer_token,
    })
}

/// Read a PEM public key encrypted to `keys`
///
/// Stops once the received blocks decrypt to a complete PEM document, or as
/// soon as an aligned read fails to decrypt. When the last block is full and
/// the end line is unterminated, the terminator may still follow in a block
/// of its own.
async fn read_sealed_key<S: Transport>(
    stream: &mut S,
    keys: &KeyPair,
    cap: usize,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, String> {
    let block = keys.private_key().size();
    let capacity =
        crypt_cipher::max_block_size(keys.public_key()).map_err(step("size peer key"))?;
    let mut opened = None;

    let sealed = transport::read_unframed(stream, cap, timeout, |buf| {
        if buf.is_empty() || buf.len() % block != 0 {
            return false;
        }
        match crypt_cipher::decrypt(buf, keys.private_key()) {
            Ok(plain) if pem_complete(&plain) => {
                opened = Some(plain);
                true
            }
            Ok(_) => false,
            Err(_) => true,
        }
    })
    .await
    .map_err(step("read peer key"))?;

    let Some(mut plain) = opened else {
        return crypt_cipher::decrypt(&sealed, keys.private_key())
            .map_err(step("decrypt peer key"));
    };

    let mut received = sealed.len();
    while plain.len() % capacity == 0 && missing_terminator(&plain) {
        if received + block > cap {
            break;
        }
        let Some(tail) = transport::read_trailing(stream, block, TERMINATOR_GRACE, timeout)
            .await
            .map_err(step("read peer key"))?
        else {
            break;
        };
        received += block;
        let tail = crypt_cipher::decrypt(&tail, keys.private_key())
            .map_err(step("decrypt peer key"))?;
        plain.extend_from_slice(&tail);
    }

    Ok(plain)
}

/// Read a `token_size` token encrypted to `keys`
async fn read_sealed_token<S: Transport>(
    stream: &mut S,
    keys: &KeyPair,
    config: &SessionConfig,
    timeout: Option<Duration>,
) -> Result<Token, String> {
    let expected = crypt_cipher::ciphertext_len(config.token_size, keys.public_key())
        .map_err(step("size peer token"))?;
    let sealed = transport::read_exact_capped(stream, expected, config.tunnel_anchor, timeout)
        .await
        .map_err(step("read peer token"))?;
    let token = crypt_cipher::decrypt(&sealed, keys.private_key())
        .map_err(step("decrypt peer token"))?;

    if token.is_empty() {
        return Err("peer token is empty".to_string());
    }
    debug!("Received {}-byte peer token", token.len());
    Ok(Token::from_bytes(token))
}

/// Whether `buf` holds a whole PEM document, or clearly is not PEM at all
fn pem_complete(buf: &[u8]) -> bool {
    let head = &buf[..buf.len().min(PEM_BEGIN.len())];
    if !PEM_BEGIN.starts_with(head) {
        return true;
    }
    match find(buf, PEM_END) {
        Some(pos) => find(&buf[pos + PEM_END.len()..], PEM_DASHES).is_some(),
        None => false,
    }
}

/// Whether `buf` is a PEM document whose end line has no terminator yet
fn missing_terminator(buf: &[u8]) -> bool {
    find(buf, PEM_END).is_some() && (buf.ends_with(PEM_DASHES) || buf.ends_with(b"\r"))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn step<E: Display>(what: &'static str) -> impl FnOnce(E) -> String {
    move |e| format!("{}: {}", what, e)
}
