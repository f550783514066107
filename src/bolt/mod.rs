//! # Bolt Protocol
//!
//! Wire layer of the driver: everything needed to talk to a Bolt server
//! byte-for-byte, with no connection or session state.
//!
//! - [`packstream`] - Binary value serialization
//! - [`message`] - Request/response messages (HELLO, RUN, PULL, ...)
//! - [`handshake`] - Magic preamble and version negotiation
//! - [`codec`] - Chunked framing as tokio_util codecs
//! - [`error`] - Wire-level error types
//!
//! Most users want the [`crate::driver`] module instead.

pub mod codec;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;

pub use codec::{BoltCodec, BoltResponseCodec};
#[cfg(test)]
pub(crate) use codec::BoltRequestCodec;
pub use error::{BoltError, BoltErrorCode, BoltResult, HandshakeError};
pub use handshake::{BoltVersion, VersionProposal, BOLT_MAGIC, HANDSHAKE_RESPONSE_SIZE};
pub use message::{
    AccessMode, AuthToken, BeginMessage, BoltRequest, BoltResponse, DiscardMessage,
    FailureMessage, HelloMessage, Notification, NotificationSeverity, PullMessage, QueryStats,
    RecordMessage, RouteMessage, RoutingInfo, RunMessage, ServerRole, SuccessMessage,
    TransactionExtra,
};
pub use packstream::{
    DecodeContext, PackStreamDecoder, PackStreamEncoder, PackStreamError, PackStreamNode,
    PackStreamPath, PackStreamRelationship, PackStreamStructure, PackStreamUnboundRelationship,
    PackStreamValue,
};
