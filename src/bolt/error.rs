//! Bolt protocol error types.

use std::fmt;
use std::io;

use super::handshake::BoltVersion;
use super::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Wire-level errors raised below the driver.
#[derive(Debug)]
pub enum BoltError {
    /// I/O error
    Io(io::Error),

    /// Handshake error
    Handshake(HandshakeError),

    /// PackStream serialization error
    PackStream(PackStreamError),

    /// Peer broke the message protocol (unexpected message, bad framing, ...)
    Protocol(String),

    /// Message exceeds the configured ceiling
    MessageTooLarge { size: usize, max: usize },

    /// Read or write timed out
    Timeout,

    /// Peer closed the stream
    ConnectionClosed,
}

impl fmt::Display for BoltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoltError::Io(e) => write!(f, "I/O error: {}", e),
            BoltError::Handshake(e) => write!(f, "Handshake error: {}", e),
            BoltError::PackStream(e) => write!(f, "PackStream error: {}", e),
            BoltError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            BoltError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max: {})", size, max)
            }
            BoltError::Timeout => write!(f, "Operation timed out"),
            BoltError::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for BoltError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BoltError::Io(e) => Some(e),
            BoltError::Handshake(e) => Some(e),
            BoltError::PackStream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BoltError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            BoltError::ConnectionClosed
        } else {
            BoltError::Io(err)
        }
    }
}

impl From<HandshakeError> for BoltError {
    fn from(err: HandshakeError) -> Self {
        BoltError::Handshake(err)
    }
}

impl From<PackStreamError> for BoltError {
    fn from(err: PackStreamError) -> Self {
        BoltError::PackStream(err)
    }
}

/// Handshake-specific errors. None of them are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Peer did not open with the Bolt preamble
    InvalidMagic { expected: [u8; 4], received: [u8; 4] },

    /// Server answered with version zero: none of the proposals is supported
    Rejected,

    /// Server picked a version the client never proposed
    UnexpectedVersion(BoltVersion),

    /// Peer does not speak Bolt at all (e.g. an HTTP endpoint)
    NotBolt([u8; 4]),

    /// Connection closed during handshake
    ConnectionClosed,

    /// Handshake timeout
    Timeout,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::InvalidMagic { expected, received } => write!(
                f,
                "Invalid magic number: expected {:02X?}, received {:02X?}",
                expected, received
            ),
            HandshakeError::Rejected => {
                write!(f, "Server rejected all proposed protocol versions")
            }
            HandshakeError::UnexpectedVersion(v) => {
                write!(f, "Server selected unproposed protocol version {}", v)
            }
            HandshakeError::NotBolt(bytes) => {
                write!(f, "Peer does not speak Bolt (replied {:02X?})", bytes)
            }
            HandshakeError::ConnectionClosed => write!(f, "Connection closed during handshake"),
            HandshakeError::Timeout => write!(f, "Handshake timed out"),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Server status codes the driver inspects.
pub struct BoltErrorCode;

impl BoltErrorCode {
    pub const SYNTAX_ERROR: &'static str = "Neo.ClientError.Statement.SyntaxError";
    pub const CONSTRAINT_VIOLATION: &'static str =
        "Neo.ClientError.Schema.ConstraintValidationFailed";
    pub const AUTHENTICATION_FAILED: &'static str = "Neo.ClientError.Security.Unauthorized";

    // Leader switches surface as client errors but are safe to retry.
    pub const NOT_A_LEADER: &'static str = "Neo.ClientError.Cluster.NotALeader";
    pub const FORBIDDEN_ON_READ_ONLY: &'static str =
        "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase";

    // Transient codes that must not be retried: the user stopped the work.
    pub const TRANSACTION_TERMINATED: &'static str =
        "Neo.TransientError.Transaction.Terminated";
    pub const LOCK_CLIENT_STOPPED: &'static str =
        "Neo.TransientError.Transaction.LockClientStopped";

    pub const DEADLOCK_DETECTED: &'static str = "Neo.TransientError.Transaction.DeadlockDetected";
    pub const DATABASE_UNAVAILABLE: &'static str =
        "Neo.TransientError.General.DatabaseUnavailable";
    pub const GENERAL_ERROR: &'static str = "Neo.DatabaseError.General.UnknownError";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_error_display() {
        let err = HandshakeError::InvalidMagic {
            expected: [0x60, 0x60, 0xB0, 0x17],
            received: [0x00, 0x00, 0x00, 0x00],
        };
        assert!(err.to_string().contains("Invalid magic"));
        assert!(HandshakeError::Rejected.to_string().contains("rejected"));
        assert!(HandshakeError::UnexpectedVersion(BoltVersion::new(3, 0))
            .to_string()
            .contains("3.0"));
    }

    #[test]
    fn test_eof_maps_to_connection_closed() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(BoltError::from(eof), BoltError::ConnectionClosed));

        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(BoltError::from(refused), BoltError::Io(_)));
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;
        let err = BoltError::from(PackStreamError::InvalidMapKey);
        assert!(err.source().is_some());
        assert!(BoltError::Timeout.source().is_none());
    }
}
