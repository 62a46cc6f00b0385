//! Established session: framed, encrypted, token-stamped messages

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use crypt_cipher::{KeyPair, RsaPublicKey, Token};
use crypt_protocol::LengthPrefix;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::transport::{self, Transport};
use crate::{Role, SessionError, SessionResult};

/// Per-connection state produced by a successful handshake
///
/// Owns the transport. `send` and `recv` take `&mut self`, so a session has
/// exactly one user at a time; share it across tasks behind a lock. The
/// transport is shut down by [`Session::close`], on fatal errors, and closed
/// when the session is dropped.
pub struct Session<S> {
    stream: Option<S>,
    role: Role,
    keys: Arc<KeyPair>,
    peer_public_key: RsaPublicKey,
    own_token: Token,
    peer_token: Token,
    prefix: LengthPrefix,
    max_frame_size: u64,
}

impl<S> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("closed", &self.stream.is_none())
            .field("prefix", &self.prefix)
            .field("max_frame_size", &self.max_frame_size)
            .finish_non_exhaustive()
    }
}

impl<S: Transport> Session<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        stream: S,
        role: Role,
        keys: Arc<KeyPair>,
        peer_public_key: RsaPublicKey,
        own_token: Token,
        peer_token: Token,
        prefix: LengthPrefix,
        max_frame_size: u64,
    ) -> Self {
        Self {
            stream: Some(stream),
            role,
            keys,
            peer_public_key,
            own_token,
            peer_token,
            prefix,
            max_frame_size,
        }
    }

    /// Send one message to the peer
    ///
    /// The frame is `length || encrypt(own_token || message)`. A write
    /// failure closes the session.
    pub async fn send(&mut self, message: &str) -> SessionResult<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(SessionError::PeerDisconnected(
                "session already closed".to_string(),
            ));
        };

        let mut payload = BytesMut::with_capacity(self.own_token.len() + message.len());
        payload.extend_from_slice(self.own_token.as_bytes());
        payload.extend_from_slice(message.as_bytes());

        let size = crypt_cipher::ciphertext_len(payload.len(), &self.peer_public_key)? as u64;
        if size > self.prefix.max_length() {
            return Err(SessionError::MessageTooLarge {
                size,
                max: self.prefix.max_length(),
            });
        }

        let ciphertext = crypt_cipher::encrypt(&payload, &self.peer_public_key)?;
        let header = self.prefix.encode(ciphertext.len() as u64)?;

        if let Err(e) = write_frame(stream, &header, &ciphertext).await {
            warn!("Send failed on {:?} session: {}", self.role, e);
            self.close().await;
            return Err(SessionError::PeerDisconnected(e.to_string()));
        }

        debug!("Sent frame of {} bytes", ciphertext.len());
        Ok(())
    }

    /// Receive one message from the peer
    ///
    /// `timeout` bounds this call only. Transport failures, timeouts and
    /// oversized frames close the session. A frame that fails to decrypt
    /// closes it on the accepting side only. A frame without the peer token
    /// is rejected but the session stays open.
    pub async fn recv(&mut self, timeout: Option<Duration>) -> SessionResult<String> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(SessionError::PeerDisconnected(
                "session already closed".to_string(),
            ));
        };

        let read = read_frame(stream, self.prefix, self.max_frame_size);
        let frame = match timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(frame) => frame,
                Err(_) => Err(SessionError::PeerDisconnected(format!(
                    "no message within {:?}",
                    limit
                ))),
            },
            None => read.await,
        };

        let ciphertext = match frame {
            Ok(ciphertext) => ciphertext,
            Err(e) => {
                warn!("Receive failed on {:?} session: {}", self.role, e);
                self.close().await;
                return Err(e);
            }
        };

        let plaintext = match crypt_cipher::decrypt(&ciphertext, self.keys.private_key()) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!("Dropping undecryptable frame: {}", e);
                if self.role == Role::Acceptor {
                    self.close().await;
                }
                return Err(SessionError::UnableToDecrypt);
            }
        };

        let Some(message) = self.peer_token.strip_from(&plaintext) else {
            warn!("Dropping frame without the peer token");
            return Err(SessionError::InvalidToken);
        };

        Ok(String::from_utf8(message)?)
    }

    /// Shut the transport down; later calls fail with `PeerDisconnected`
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            transport::shutdown(&mut stream).await;
            info!("{:?} session closed", self.role);
        }
    }

    /// Whether the transport has been shut down
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Side of the handshake this session was built on
    pub fn role(&self) -> Role {
        self.role
    }

    /// Token this side stamps on every outgoing message
    pub fn own_token(&self) -> &Token {
        &self.own_token
    }

    /// Token every incoming message must carry
    pub fn peer_token(&self) -> &Token {
        &self.peer_token
    }

    /// Key outgoing messages are encrypted to
    pub fn peer_public_key(&self) -> &RsaPublicKey {
        &self.peer_public_key
    }

    /// Public half of the key incoming messages are decrypted with
    pub fn own_public_key(&self) -> &RsaPublicKey {
        self.keys.public_key()
    }

    /// The underlying transport, for inspection only
    ///
    /// Reading or writing it directly desynchronizes the framing.
    pub fn get_ref(&self) -> Option<&S> {
        self.stream.as_ref()
    }
}

impl Session<TcpStream> {
    /// Remote address, or `None` once closed
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }
}

async fn write_frame<S: Transport>(
    stream: &mut S,
    header: &[u8],
    ciphertext: &[u8],
) -> std::io::Result<()> {
    stream.write_all(header).await?;
    stream.write_all(ciphertext).await?;
    stream.flush().await
}

async fn read_frame<S>(
    stream: &mut S,
    prefix: LengthPrefix,
    max_frame_size: u64,
) -> SessionResult<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut header = vec![0u8; prefix.width()];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|e| SessionError::PeerDisconnected(format!("reading length prefix: {}", e)))?;

    let length = prefix.decode(&header)?;
    if length == 0 {
        return Err(SessionError::PeerDisconnected("empty frame".to_string()));
    }
    if length > max_frame_size {
        return Err(SessionError::FrameTooLarge {
            size: length,
            max: max_frame_size,
        });
    }

    let mut ciphertext = vec![0u8; length as usize];
    stream.read_exact(&mut ciphertext).await.map_err(|e| {
        SessionError::PeerDisconnected(format!("reading {}-byte frame: {}", length, e))
    })?;

    Ok(ciphertext)
}
