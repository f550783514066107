//! PackStream serialization format.
//!
//! PackStream is the self-describing binary format carried inside Bolt
//! messages. Every value starts with a marker byte naming its type and,
//! for sized types, the smallest length header that fits.
//!
//! # Supported Types
//!
//! - **Null**, **Boolean**, **Integer** (i64), **Float** (f64)
//! - **String** (UTF-8), **Bytes**
//! - **List**, **Map** (string keys, no duplicates)
//! - **Structure**: a tag byte plus up to 15 fields
//!
//! # Graph Structures
//!
//! - **Node**: id, labels, properties
//! - **Relationship**: id, start_id, end_id, type, properties
//! - **UnboundRelationship**: id, type, properties
//! - **Path**: nodes, unbound relationships, signed traversal indices
//!
//! Graph structures are only valid in server responses; a decoder running
//! in [`DecodeContext::Request`] rejects them.

pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod structures;
pub mod types;

pub use decoder::{decode, decode_with_context, PackStreamDecoder, MAX_NESTING_DEPTH};
pub use encoder::{encode, PackStreamEncoder};
pub use structures::{
    PackStreamNode, PackStreamPath, PackStreamRelationship, PackStreamUnboundRelationship,
};
pub use types::{PackStreamStructure, PackStreamValue};

use std::fmt;

/// Direction of the message being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeContext {
    /// Server to client; graph structures allowed
    #[default]
    Response,
    /// Client to server; graph structures rejected
    Request,
}

/// PackStream errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamError {
    /// Unexpected end of input
    UnexpectedEof,
    /// Unknown marker byte
    UnknownMarker(u8),
    /// Invalid UTF-8 in string
    InvalidUtf8(String),
    /// Map key is not a string
    InvalidMapKey,
    /// Same key appears twice in one map
    DuplicateMapKey(String),
    /// Value too large to encode
    ValueTooLarge(&'static str, usize),
    /// Structure does not match its expected layout
    InvalidStructure(String),
    /// Graph structure found where only client values may appear
    UnexpectedStructure(u8),
    /// Bytes left over after a complete value
    TrailingBytes(usize),
    /// Containers nested deeper than the decoder allows
    NestingTooDeep(usize),
}

impl fmt::Display for PackStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackStreamError::UnexpectedEof => write!(f, "Unexpected end of PackStream data"),
            PackStreamError::UnknownMarker(m) => write!(f, "Unknown PackStream marker: 0x{:02X}", m),
            PackStreamError::InvalidUtf8(e) => write!(f, "Invalid UTF-8 in string: {}", e),
            PackStreamError::InvalidMapKey => write!(f, "Map keys must be strings"),
            PackStreamError::DuplicateMapKey(k) => write!(f, "Duplicate map key: {:?}", k),
            PackStreamError::ValueTooLarge(t, s) => write!(f, "{} too large: {}", t, s),
            PackStreamError::InvalidStructure(msg) => write!(f, "Invalid structure: {}", msg),
            PackStreamError::UnexpectedStructure(tag) => {
                write!(f, "Graph structure 0x{:02X} is not allowed in a request", tag)
            }
            PackStreamError::TrailingBytes(n) => write!(f, "{} trailing bytes after value", n),
            PackStreamError::NestingTooDeep(max) => write!(f, "Values nested deeper than {} levels", max),
        }
    }
}

impl std::error::Error for PackStreamError {}
