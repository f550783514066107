//! Bolt handshake negotiation, both sides.

use super::version::{VersionProposal, DEFAULT_PROPOSALS};
use super::{BoltVersion, HandshakeError, BOLT_MAGIC, HANDSHAKE_SIZE};

/// Build the 20-byte client handshake: magic plus up to 4 proposals.
pub fn build_client_handshake(proposals: &[VersionProposal]) -> [u8; HANDSHAKE_SIZE] {
    let mut data = [0u8; HANDSHAKE_SIZE];
    data[0..4].copy_from_slice(&BOLT_MAGIC);
    for (i, proposal) in proposals.iter().take(4).enumerate() {
        let offset = 4 + i * 4;
        data[offset..offset + 4].copy_from_slice(&proposal.to_bytes());
    }
    data
}

/// Interpret the server's 4-byte reply against what the client proposed.
pub fn parse_server_reply(
    reply: [u8; 4],
    proposals: &[VersionProposal],
) -> Result<BoltVersion, HandshakeError> {
    if &reply == b"HTTP" {
        return Err(HandshakeError::NotBolt(reply));
    }
    let version = BoltVersion::from_bytes(reply).ok_or(HandshakeError::Rejected)?;
    if proposals.iter().any(|p| p.accepts(version)) && version.is_supported() {
        Ok(version)
    } else {
        Err(HandshakeError::UnexpectedVersion(version))
    }
}

/// Client handshake with the default proposals.
pub fn default_client_handshake() -> [u8; HANDSHAKE_SIZE] {
    build_client_handshake(&DEFAULT_PROPOSALS)
}

/// Server side of the handshake.
///
/// Walks the client's proposals in order and answers with the first
/// version it supports.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct Handshake {
    supported_versions: Vec<BoltVersion>,
}

#[cfg(test)]
impl Handshake {
    /// Accept every version the crate knows.
    pub fn new() -> Self {
        Self::with_versions(BoltVersion::ALL.to_vec())
    }

    /// Accept only the given versions.
    pub fn with_versions(versions: Vec<BoltVersion>) -> Self {
        Self {
            supported_versions: versions,
        }
    }

    /// Validate a client handshake and pick a version.
    pub fn process(&self, data: &[u8; HANDSHAKE_SIZE]) -> Result<BoltVersion, HandshakeError> {
        let magic = [data[0], data[1], data[2], data[3]];
        if magic != BOLT_MAGIC {
            return Err(HandshakeError::InvalidMagic {
                expected: BOLT_MAGIC,
                received: magic,
            });
        }

        data[4..]
            .chunks_exact(4)
            .map(|slot| VersionProposal::from_bytes([slot[0], slot[1], slot[2], slot[3]]))
            .find_map(|proposal| {
                proposal
                    .versions()
                    .find(|v| self.supported_versions.contains(v))
            })
            .ok_or(HandshakeError::Rejected)
    }

    /// Reply bytes for a negotiation outcome; all zeros on failure.
    pub fn generate_response(result: &Result<BoltVersion, HandshakeError>) -> [u8; 4] {
        match result {
            Ok(version) => version.to_bytes(),
            Err(_) => [0x00; 4],
        }
    }
}

#[cfg(test)]
impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}
