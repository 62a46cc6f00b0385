//! Crypt Net - secure sessions over TCP for Cryptsock
//!
//! Runs the four-message key/token exchange on a raw stream and exposes the
//! resulting [`Session`] for framed, encrypted, token-stamped messages.

mod client;
mod error;
pub mod handshake;
mod listener;
mod session;
mod transport;
mod verify;

pub use client::*;
pub use error::*;
pub use listener::*;
pub use session::*;
pub use transport::Transport;
pub use verify::*;

pub use crypt_cipher::{KeyPair, RsaPublicKey, Token};
pub use crypt_protocol::SessionConfig;
