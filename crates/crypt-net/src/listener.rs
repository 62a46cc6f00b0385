//! Server side: accepts raw connections and runs the acceptor handshake

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crypt_cipher::KeyPair;
use crypt_protocol::SessionConfig;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream, ToSocketAddrs};
use tracing::{debug, info};

use crate::handshake::accept_handshake;
use crate::transport::{with_timeout, Transport};
use crate::{PeerVerifier, Session, SessionResult, TrustOnFirstUse};

/// Listening socket plus the server's long-lived key pair
pub struct Listener {
    listener: TcpListener,
    keys: Arc<KeyPair>,
    config: SessionConfig,
    verifier: Arc<dyn PeerVerifier>,
}

impl Listener {
    /// Bind to `addr` and start listening
    ///
    /// Generates a `server_key_bits` key pair when `keys` is `None`. The
    /// socket uses `SO_REUSEADDR` and a `backlog`-sized pending queue.
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        keys: Option<KeyPair>,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        config.validate()?;

        let keys = match keys {
            Some(keys) => keys,
            None => generate_keys(config.server_key_bits).await?,
        };

        let addr = lookup_host(addr).await?.next().ok_or_else(|| {
            io::Error::new(ErrorKind::AddrNotAvailable, "address resolved to nothing")
        })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.backlog)?;

        info!("Listening on {} ({}-bit key)", listener.local_addr()?, keys.bits());

        Ok(Self {
            listener,
            keys: Arc::new(keys),
            config,
            verifier: Arc::new(TrustOnFirstUse),
        })
    }

    /// Check initiator keys with `verifier` during every handshake
    pub fn with_verifier(mut self, verifier: Arc<dyn PeerVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SessionResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Long-lived key pair used for every accepted session
    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    /// Configuration applied to every accepted session
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Wait for the next raw connection
    ///
    /// Fails with a `TimedOut` IO error if `timeout` elapses first.
    pub async fn accept(&self, timeout: Option<Duration>) -> SessionResult<TcpStream> {
        let (stream, peer) = with_timeout(timeout, self.listener.accept()).await?;
        debug!("Accepted connection from {}", peer);
        Ok(stream)
    }

    /// Run the acceptor handshake on a raw connection
    pub async fn handshake<S: Transport>(
        &self,
        stream: S,
        timeout: Option<Duration>,
    ) -> SessionResult<Session<S>> {
        accept_handshake(
            stream,
            self.keys.clone(),
            &self.config,
            self.verifier.as_ref(),
            timeout,
        )
        .await
    }

    /// Accept a connection and run the handshake on it
    ///
    /// `timeout` bounds the accept and each handshake step separately.
    pub async fn accept_session(
        &self,
        timeout: Option<Duration>,
    ) -> SessionResult<Session<TcpStream>> {
        let stream = self.accept(timeout).await?;
        self.handshake(stream, timeout).await
    }
}

/// Generate a key pair on the blocking pool
pub(crate) async fn generate_keys(bits: usize) -> SessionResult<KeyPair> {
    crypt_cipher::validate_key_bits(bits)?;
    let keys = tokio::task::spawn_blocking(move || KeyPair::generate(bits))
        .await
        .map_err(io::Error::other)??;
    Ok(keys)
}
