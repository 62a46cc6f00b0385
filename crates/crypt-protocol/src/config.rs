//! Session configuration shared by listener and client

use serde::{Deserialize, Serialize};

use crate::{
    ProtocolError, ProtocolResult, DEFAULT_BACKLOG, DEFAULT_CLIENT_KEY_BITS,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_NUMBER_SIZE, DEFAULT_SERVER_KEY_BITS, DEFAULT_TOKEN_SIZE,
    DEFAULT_TUNNEL_ANCHOR, MAX_NUMBER_SIZE,
};

/// Session configuration
///
/// Nothing here is negotiated on the wire. Both ends must agree on
/// `number_size` out of band or framing breaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Width in bytes of the big-endian frame length prefix (1-8)
    pub number_size: usize,
    /// Size of the authentication token each side generates
    pub token_size: usize,
    /// Read cap for each raw handshake message
    pub tunnel_anchor: usize,
    /// Pending-connection queue size for the listener
    pub backlog: u32,
    /// Largest declared frame length `recv` accepts
    pub max_frame_size: u64,
    /// Key size generated for a listener without supplied keys
    pub server_key_bits: usize,
    /// Key size generated for a client without supplied keys
    pub client_key_bits: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            number_size: DEFAULT_NUMBER_SIZE,
            token_size: DEFAULT_TOKEN_SIZE,
            tunnel_anchor: DEFAULT_TUNNEL_ANCHOR,
            backlog: DEFAULT_BACKLOG,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            server_key_bits: DEFAULT_SERVER_KEY_BITS,
            client_key_bits: DEFAULT_CLIENT_KEY_BITS,
        }
    }
}

impl SessionConfig {
    /// Set the length prefix width
    pub fn with_number_size(mut self, number_size: usize) -> Self {
        self.number_size = number_size;
        self
    }

    /// Set the token size
    pub fn with_token_size(mut self, token_size: usize) -> Self {
        self.token_size = token_size;
        self
    }

    /// Set the handshake read cap
    pub fn with_tunnel_anchor(mut self, tunnel_anchor: usize) -> Self {
        self.tunnel_anchor = tunnel_anchor;
        self
    }

    /// Set the listener backlog
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Set the largest accepted frame
    pub fn with_max_frame_size(mut self, max_frame_size: u64) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Set the generated server key size
    pub fn with_server_key_bits(mut self, bits: usize) -> Self {
        self.server_key_bits = bits;
        self
    }

    /// Set the generated client key size
    pub fn with_client_key_bits(mut self, bits: usize) -> Self {
        self.client_key_bits = bits;
        self
    }

    /// Check that every field is usable
    ///
    /// Key sizes are checked at generation time instead.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.number_size == 0 || self.number_size > MAX_NUMBER_SIZE {
            return Err(ProtocolError::InvalidConfig(format!(
                "number_size must be between 1 and {}, got {}",
                MAX_NUMBER_SIZE, self.number_size
            )));
        }
        if self.token_size == 0 {
            return Err(ProtocolError::InvalidConfig(
                "token_size must be non-zero".to_string(),
            ));
        }
        if self.tunnel_anchor == 0 {
            return Err(ProtocolError::InvalidConfig(
                "tunnel_anchor must be non-zero".to_string(),
            ));
        }
        if self.backlog == 0 {
            return Err(ProtocolError::InvalidConfig(
                "backlog must be non-zero".to_string(),
            ));
        }
        if self.max_frame_size == 0 {
            return Err(ProtocolError::InvalidConfig(
                "max_frame_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
