//! Crypt Echo
//!
//! Demo for encrypted sessions: a server that echoes every message back and
//! a client that sends messages and prints the replies.
//!
//! ```text
//! crypt-echo [--config <path>] server <addr> [--key <pem> [--passphrase <pass>]]
//! crypt-echo [--config <path>] client <addr> <message>...
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crypt_net::{Connector, KeyPair, Listener, Session, SessionError};
use crypt_protocol::SessionConfig;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// Per-step bound for handshakes and replies
const IO_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "crypt-echo")]
#[command(about = "Encrypted echo server and client")]
struct Cli {
    /// JSON session config; missing fields keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept sessions and echo every message back
    Server {
        /// Address to listen on (host:port)
        addr: String,

        /// PKCS#8 or PKCS#1 private key PEM; a fresh key is generated if absent
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Passphrase for an encrypted PKCS#8 key
        #[arg(short, long, requires = "key")]
        passphrase: Option<String>,
    },

    /// Send messages and print the replies
    Client {
        /// Server address (host:port)
        addr: String,

        /// Messages to send, one per frame
        #[arg(required = true)]
        messages: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("crypt_echo=debug".parse()?)
                .add_directive("crypt_net=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SessionConfig::default(),
    };

    match cli.command {
        Command::Server {
            addr,
            key,
            passphrase,
        } => {
            let keys = match key {
                Some(path) => Some(load_keys(&path, passphrase.as_deref())?),
                None => None,
            };
            run_server(&addr, keys, config).await
        }
        Command::Client { addr, messages } => run_client(&addr, config, &messages).await,
    }
}

fn load_config(path: &Path) -> anyhow::Result<SessionConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: SessionConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn load_keys(path: &Path, passphrase: Option<&str>) -> anyhow::Result<KeyPair> {
    let pem = std::fs::read_to_string(path)
        .with_context(|| format!("reading key {}", path.display()))?;
    let keys = match passphrase {
        Some(passphrase) => KeyPair::from_encrypted_private_key_pem(&pem, passphrase),
        None => KeyPair::from_private_key_pem(&pem),
    }
    .with_context(|| format!("loading key {}", path.display()))?;
    Ok(keys)
}

async fn run_server(
    addr: &str,
    keys: Option<KeyPair>,
    config: SessionConfig,
) -> anyhow::Result<()> {
    match &keys {
        Some(keys) => info!("Starting Crypt Echo server with a {}-bit key", keys.bits()),
        None => info!(
            "Starting Crypt Echo server, generating {}-bit key",
            config.server_key_bits
        ),
    }

    let listener = Arc::new(Listener::bind(addr, keys, config).await?);
    info!("Listening on {}", listener.local_addr()?);

    loop {
        let stream = listener.accept(None).await?;
        let listener = listener.clone();

        tokio::spawn(async move {
            match listener.handshake(stream, Some(IO_TIMEOUT)).await {
                Ok(session) => echo(session).await,
                Err(e) => warn!("Handshake failed: {}", e),
            }
        });
    }
}

async fn echo(mut session: Session<TcpStream>) {
    let peer = session.peer_addr();
    info!("Session established with {:?}", peer);

    loop {
        match session.recv(None).await {
            Ok(message) => {
                debug!("{:?} sent {} bytes", peer, message.len());
                if let Err(e) = session.send(&message).await {
                    warn!("Failed to echo to {:?}: {}", peer, e);
                    break;
                }
            }
            Err(SessionError::PeerDisconnected(_)) => break,
            Err(e) if e.is_fatal() || session.is_closed() => {
                error!("Session with {:?} failed: {}", peer, e);
                break;
            }
            Err(e) => warn!("Dropping message from {:?}: {}", peer, e),
        }
    }

    session.close().await;
    info!("Session with {:?} closed", peer);
}

async fn run_client(
    addr: &str,
    config: SessionConfig,
    messages: &[String],
) -> anyhow::Result<()> {
    let connector = Connector::new(config);
    let mut session = connector
        .connect(addr, Some(IO_TIMEOUT))
        .await
        .with_context(|| format!("connecting to {}", addr))?;

    for message in messages {
        session.send(message).await?;
        let reply = session.recv(Some(IO_TIMEOUT)).await?;
        println!("{}", reply);
    }

    session.close().await;
    Ok(())
}
