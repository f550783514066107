//! Bolt protocol response messages.
//!
//! Response messages are sent from the server to the client. SUCCESS,
//! FAILURE and IGNORED are summaries and close the reply to one request;
//! RECORD is streamed ahead of the summary of a PULL.

use std::collections::HashMap;

use super::tag;
use crate::bolt::packstream::{PackStreamError, PackStreamStructure, PackStreamValue};

/// All Bolt response messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltResponse {
    /// SUCCESS - Request completed
    Success(SuccessMessage),
    /// RECORD - One result row
    Record(RecordMessage),
    /// FAILURE - Request failed; the connection is now in the FAILED state
    Failure(FailureMessage),
    /// IGNORED - Request skipped because the connection is FAILED
    Ignored,
}

impl BoltResponse {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltResponse::Success(_) => tag::SUCCESS,
            BoltResponse::Record(_) => tag::RECORD,
            BoltResponse::Failure(_) => tag::FAILURE,
            BoltResponse::Ignored => tag::IGNORED,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltResponse::Success(_) => "SUCCESS",
            BoltResponse::Record(_) => "RECORD",
            BoltResponse::Failure(_) => "FAILURE",
            BoltResponse::Ignored => "IGNORED",
        }
    }

    /// Summaries terminate the reply to a request.
    pub fn is_summary(&self) -> bool {
        !matches!(self, BoltResponse::Record(_))
    }

    /// Convert to PackStream structure.
    #[cfg(test)]
    pub fn to_structure(&self) -> PackStreamStructure {
        match self {
            BoltResponse::Success(msg) => PackStreamStructure::new(
                tag::SUCCESS,
                vec![PackStreamValue::Map(msg.metadata.clone())],
            ),
            BoltResponse::Record(msg) => PackStreamStructure::new(
                tag::RECORD,
                vec![PackStreamValue::List(msg.fields.clone())],
            ),
            BoltResponse::Failure(msg) => PackStreamStructure::new(
                tag::FAILURE,
                vec![PackStreamValue::map([
                    ("code", msg.code.as_str().into()),
                    ("message", msg.message.as_str().into()),
                ])],
            ),
            BoltResponse::Ignored => PackStreamStructure::new(tag::IGNORED, vec![]),
        }
    }

    /// Parse from PackStream structure, taking ownership of its fields.
    pub fn from_structure(s: PackStreamStructure) -> Result<Self, PackStreamError> {
        let tag = s.tag;
        let first = s.fields.into_iter().next();
        match (tag, first) {
            (tag::SUCCESS, Some(PackStreamValue::Map(metadata))) => {
                Ok(BoltResponse::Success(SuccessMessage { metadata }))
            }
            (tag::SUCCESS, None) => Ok(BoltResponse::Success(SuccessMessage::new())),
            (tag::RECORD, Some(PackStreamValue::List(fields))) => {
                Ok(BoltResponse::Record(RecordMessage { fields }))
            }
            (tag::FAILURE, Some(PackStreamValue::Map(metadata))) => {
                let get = |key: &str| {
                    metadata
                        .get(key)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                };
                Ok(BoltResponse::Failure(FailureMessage {
                    code: get("code"),
                    message: get("message"),
                }))
            }
            (tag::IGNORED, _) => Ok(BoltResponse::Ignored),
            (tag::SUCCESS | tag::RECORD | tag::FAILURE, _) => Err(PackStreamError::InvalidStructure(
                format!("Malformed response message 0x{:02X}", tag),
            )),
            _ => Err(PackStreamError::InvalidStructure(format!(
                "Unknown response message tag: 0x{:02X}",
                tag
            ))),
        }
    }
}

/// SUCCESS message with its metadata map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessMessage {
    /// Response metadata
    pub metadata: HashMap<String, PackStreamValue>,
}

impl SuccessMessage {
    /// Create a new SUCCESS message with empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a SUCCESS message with metadata.
    pub fn with_metadata(metadata: HashMap<String, PackStreamValue>) -> Self {
        Self { metadata }
    }

    /// Add metadata entry.
    pub fn add(mut self, key: &str, value: impl Into<PackStreamValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Get metadata entry.
    pub fn get(&self, key: &str) -> Option<&PackStreamValue> {
        self.metadata.get(key)
    }

    /// Server agent string (HELLO).
    pub fn server(&self) -> Option<&str> {
        self.metadata.get("server").and_then(|v| v.as_str())
    }

    /// Connection id assigned by the server (HELLO).
    pub fn connection_id(&self) -> Option<&str> {
        self.metadata.get("connection_id").and_then(|v| v.as_str())
    }

    /// Milliseconds until the first record was available (RUN).
    pub fn result_available_after(&self) -> Option<i64> {
        self.metadata.get("t_first").and_then(|v| v.as_int())
    }

    /// Milliseconds until the last record was consumed (PULL).
    pub fn result_consumed_after(&self) -> Option<i64> {
        self.metadata.get("t_last").and_then(|v| v.as_int())
    }

    /// Result column names (RUN).
    pub fn fields(&self) -> Vec<String> {
        self.metadata
            .get("fields")
            .and_then(|v| v.as_string_list())
            .unwrap_or_default()
    }

    /// Statement id inside an explicit transaction (RUN).
    pub fn qid(&self) -> Option<i64> {
        self.metadata.get("qid").and_then(|v| v.as_int())
    }

    /// Update counters (PULL/DISCARD).
    pub fn stats(&self) -> Option<&HashMap<String, PackStreamValue>> {
        self.metadata.get("stats").and_then(|v| v.as_map())
    }

    /// Whether the stream has more records (PULL/DISCARD).
    pub fn has_more(&self) -> bool {
        self.metadata
            .get("has_more")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Bookmark (COMMIT, or end of an autocommit stream).
    pub fn bookmark(&self) -> Option<&str> {
        self.metadata.get("bookmark").and_then(|v| v.as_str())
    }

    /// Database the query ran against.
    pub fn db(&self) -> Option<&str> {
        self.metadata.get("db").and_then(|v| v.as_str())
    }

    /// Query type ("r", "rw", "w", "s").
    pub fn query_type(&self) -> Option<&str> {
        self.metadata.get("type").and_then(|v| v.as_str())
    }

    /// Build a HELLO reply.
    #[cfg(test)]
    pub fn hello_success(server: &str, connection_id: &str) -> Self {
        Self::new()
            .add("server", server)
            .add("connection_id", connection_id)
    }

    /// Build a RUN reply.
    #[cfg(test)]
    pub fn run_success(fields: &[&str], qid: Option<i64>) -> Self {
        let msg = Self::new()
            .add("fields", PackStreamValue::string_list(fields))
            .add("t_first", 0i64);
        match qid {
            Some(id) => msg.add("qid", id),
            None => msg,
        }
    }

    /// Build a PULL/DISCARD reply.
    #[cfg(test)]
    pub fn streaming_success(has_more: bool, bookmark: Option<&str>) -> Self {
        let mut msg = Self::new();
        if has_more {
            msg = msg.add("has_more", true);
        } else {
            msg = msg.add("t_last", 0i64).add("type", "r");
        }
        if let Some(bm) = bookmark {
            msg = msg.add("bookmark", bm);
        }
        msg
    }

    /// Build a COMMIT reply.
    #[cfg(test)]
    pub fn commit_success(bookmark: &str) -> Self {
        Self::new().add("bookmark", bookmark)
    }
}

/// RECORD message - One result row.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMessage {
    /// Field values, aligned with the RUN `fields`
    pub fields: Vec<PackStreamValue>,
}

impl RecordMessage {
    /// Create a new RECORD message.
    pub fn new(fields: Vec<PackStreamValue>) -> Self {
        Self { fields }
    }
}

/// FAILURE message - Request failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMessage {
    /// Status code, e.g. `Neo.ClientError.Statement.SyntaxError`
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl FailureMessage {
    /// Create a new FAILURE message.
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Classification segment of the code ("ClientError", "TransientError", ...).
    pub fn classification(&self) -> &str {
        self.code.split('.').nth(1).unwrap_or("")
    }

    /// Check if this is a client error.
    pub fn is_client_error(&self) -> bool {
        self.classification() == "ClientError"
    }

    /// Check if this is a transient error.
    pub fn is_transient(&self) -> bool {
        self.classification() == "TransientError"
    }

    /// Check if this is a database error.
    pub fn is_database_error(&self) -> bool {
        self.classification() == "DatabaseError"
    }
}
