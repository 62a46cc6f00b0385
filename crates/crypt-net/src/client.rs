//! Client side: connects and runs the initiator handshake

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crypt_cipher::KeyPair;
use crypt_protocol::SessionConfig;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::info;

use crate::handshake::initiate_handshake;
use crate::listener::generate_keys;
use crate::transport::{with_timeout, Transport};
use crate::{PeerVerifier, Session, SessionResult, TrustOnFirstUse};

/// Builds initiator sessions
///
/// Without supplied keys, every connection gets a fresh `client_key_bits`
/// key pair.
#[derive(Clone)]
pub struct Connector {
    keys: Option<Arc<KeyPair>>,
    config: SessionConfig,
    verifier: Arc<dyn PeerVerifier>,
}

impl Connector {
    /// Connector with generated keys and [`TrustOnFirstUse`]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            keys: None,
            config,
            verifier: Arc::new(TrustOnFirstUse),
        }
    }

    /// Use a fixed key pair instead of generating one per connection
    pub fn with_keys(mut self, keys: KeyPair) -> Self {
        self.keys = Some(Arc::new(keys));
        self
    }

    /// Check the acceptor's key with `verifier`
    pub fn with_verifier(mut self, verifier: Arc<dyn PeerVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Configuration applied to every session
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connect to `addr` and run the handshake
    ///
    /// Keys are generated before any I/O, so a bad `client_key_bits` fails
    /// without touching the network. `timeout` bounds the connect and each
    /// handshake step separately.
    pub async fn connect<A: ToSocketAddrs>(
        &self,
        addr: A,
        timeout: Option<Duration>,
    ) -> SessionResult<Session<TcpStream>> {
        self.config.validate()?;
        let keys = self.session_keys().await?;

        let stream = with_timeout(timeout, TcpStream::connect(addr)).await?;
        stream.set_nodelay(true)?;
        let peer: Option<SocketAddr> = stream.peer_addr().ok();
        info!("Connected to {:?}", peer);

        initiate_handshake(stream, keys, &self.config, self.verifier.as_ref(), timeout).await
    }

    /// Run the handshake on an already-connected transport
    pub async fn handshake<S: Transport>(
        &self,
        stream: S,
        timeout: Option<Duration>,
    ) -> SessionResult<Session<S>> {
        let keys = self.session_keys().await?;
        initiate_handshake(stream, keys, &self.config, self.verifier.as_ref(), timeout).await
    }

    async fn session_keys(&self) -> SessionResult<Arc<KeyPair>> {
        match &self.keys {
            Some(keys) => Ok(keys.clone()),
            None => Ok(Arc::new(generate_keys(self.config.client_key_bits).await?)),
        }
    }
}
