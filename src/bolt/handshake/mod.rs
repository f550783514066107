//! Bolt protocol handshake.
//!
//! The Bolt handshake consists of:
//! 1. Client sends 4-byte magic number (0x6060B017)
//! 2. Client sends 4 x 4-byte version proposals (preferred first)
//! 3. Server responds with the 4-byte agreed version, or zeros and closes

mod negotiation;
mod version;

#[cfg(test)]
pub(crate) use negotiation::Handshake;
pub use negotiation::{build_client_handshake, default_client_handshake, parse_server_reply};
pub use version::{BoltVersion, VersionProposal, DEFAULT_PROPOSALS};

pub use super::error::HandshakeError;

/// Bolt protocol magic number: 0x6060B017
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Size of the client handshake (magic + 4 versions)
pub const HANDSHAKE_SIZE: usize = 20;

/// Size of the server reply
pub const HANDSHAKE_RESPONSE_SIZE: usize = 4;
