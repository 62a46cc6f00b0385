//! Shared Protocol Definitions for Cryptsock
//!
//! Wire constants, session configuration and the length-prefix frame codec
//! shared by both ends of a connection.

mod config;
mod error;
mod frame;

pub use config::*;
pub use error::*;
pub use frame::*;

/// Default width in bytes of the frame length prefix
pub const DEFAULT_NUMBER_SIZE: usize = 5;

/// Widest supported length prefix (a `u64`)
pub const MAX_NUMBER_SIZE: usize = 8;

/// Default authentication token size in bytes
pub const DEFAULT_TOKEN_SIZE: usize = 32;

/// Default cap on a single raw handshake message (1 MiB)
pub const DEFAULT_TUNNEL_ANCHOR: usize = 1024 * 1024;

/// Default pending-connection queue for the listener
pub const DEFAULT_BACKLOG: u32 = 5;

/// Default cap on a declared frame length (64 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: u64 = 64 * 1024 * 1024;

/// Default size of the listener's long-lived key
pub const DEFAULT_SERVER_KEY_BITS: usize = 4096;

/// Default size of a client's generated key
pub const DEFAULT_CLIENT_KEY_BITS: usize = 1024;
