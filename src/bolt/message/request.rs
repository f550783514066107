//! Bolt protocol request messages.
//!
//! Request messages are sent from the client to the server.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use super::tag;
#[cfg(test)]
use crate::bolt::packstream::PackStreamError;
use crate::bolt::packstream::{PackStreamStructure, PackStreamValue};

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    /// Read-write access (default)
    #[default]
    Write,
    /// Read-only access
    Read,
}

impl AccessMode {
    /// Parse the wire form; anything but "r" is write.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "r" => AccessMode::Read,
            _ => AccessMode::Write,
        }
    }

    /// Convert to string for metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::Write => "w",
        }
    }
}

/// Authentication token sent in HELLO.
#[derive(Clone, PartialEq)]
pub struct AuthToken {
    /// Authentication scheme ("none", "basic", "bearer", ...)
    pub scheme: String,
    /// Principal (username)
    pub principal: Option<String>,
    /// Credentials (password or token)
    pub credentials: Option<String>,
    /// Realm
    pub realm: Option<String>,
    /// Scheme-specific parameters
    pub parameters: HashMap<String, PackStreamValue>,
}

impl AuthToken {
    #[cfg(test)]
    const RESERVED_KEYS: [&'static str; 4] = ["scheme", "principal", "credentials", "realm"];

    /// No authentication.
    pub fn none() -> Self {
        Self::custom("none", None, None, None, HashMap::new())
    }

    /// Username and password.
    pub fn basic(principal: impl Into<String>, credentials: impl Into<String>) -> Self {
        Self::custom(
            "basic",
            Some(principal.into()),
            Some(credentials.into()),
            None,
            HashMap::new(),
        )
    }

    /// Username and password within a realm.
    pub fn basic_with_realm(
        principal: impl Into<String>,
        credentials: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            realm: Some(realm.into()),
            ..Self::basic(principal, credentials)
        }
    }

    /// SSO bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::custom("bearer", None, Some(token.into()), None, HashMap::new())
    }

    /// Arbitrary scheme understood by the server.
    pub fn custom(
        scheme: impl Into<String>,
        principal: Option<String>,
        credentials: Option<String>,
        realm: Option<String>,
        parameters: HashMap<String, PackStreamValue>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            principal,
            credentials,
            realm,
            parameters,
        }
    }

    /// Fields merged into the HELLO extra map.
    pub fn to_map(&self) -> HashMap<String, PackStreamValue> {
        let mut map = self.parameters.clone();
        map.insert("scheme".to_string(), self.scheme.as_str().into());
        for (key, value) in [
            ("principal", &self.principal),
            ("credentials", &self.credentials),
            ("realm", &self.realm),
        ] {
            if let Some(v) = value {
                map.insert(key.to_string(), v.as_str().into());
            }
        }
        map
    }

    /// Extract the token from a HELLO extra map. Unknown keys are left out.
    #[cfg(test)]
    pub fn from_map(map: &HashMap<String, PackStreamValue>, known: &[&str]) -> Self {
        let get = |key: &str| map.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let parameters = map
            .iter()
            .filter(|(k, _)| !Self::RESERVED_KEYS.contains(&k.as_str()) && !known.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            scheme: get("scheme").unwrap_or_else(|| "none".to_string()),
            principal: get("principal"),
            credentials: get("credentials"),
            realm: get("realm"),
            parameters,
        }
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("scheme", &self.scheme)
            .field("principal", &self.principal)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("realm", &self.realm)
            .finish()
    }
}

/// All Bolt request messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltRequest {
    /// HELLO - Initialize connection
    Hello(HelloMessage),
    /// GOODBYE - Close connection gracefully
    Goodbye,
    /// RESET - Return the connection to a clean state
    Reset,
    /// RUN - Execute a query
    Run(RunMessage),
    /// PULL - Stream records
    Pull(PullMessage),
    /// DISCARD - Drop records
    Discard(DiscardMessage),
    /// BEGIN - Start transaction
    Begin(BeginMessage),
    /// COMMIT - Commit transaction
    Commit,
    /// ROLLBACK - Rollback transaction
    Rollback,
    /// ROUTE - Request routing information (Bolt 4.3+)
    Route(RouteMessage),
}

impl BoltRequest {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltRequest::Hello(_) => tag::HELLO,
            BoltRequest::Goodbye => tag::GOODBYE,
            BoltRequest::Reset => tag::RESET,
            BoltRequest::Run(_) => tag::RUN,
            BoltRequest::Pull(_) => tag::PULL,
            BoltRequest::Discard(_) => tag::DISCARD,
            BoltRequest::Begin(_) => tag::BEGIN,
            BoltRequest::Commit => tag::COMMIT,
            BoltRequest::Rollback => tag::ROLLBACK,
            BoltRequest::Route(_) => tag::ROUTE,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltRequest::Hello(_) => "HELLO",
            BoltRequest::Goodbye => "GOODBYE",
            BoltRequest::Reset => "RESET",
            BoltRequest::Run(_) => "RUN",
            BoltRequest::Pull(_) => "PULL",
            BoltRequest::Discard(_) => "DISCARD",
            BoltRequest::Begin(_) => "BEGIN",
            BoltRequest::Commit => "COMMIT",
            BoltRequest::Rollback => "ROLLBACK",
            BoltRequest::Route(_) => "ROUTE",
        }
    }

    /// Whether the server answers this request at all.
    pub fn expects_response(&self) -> bool {
        !matches!(self, BoltRequest::Goodbye)
    }

    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        match self {
            BoltRequest::Hello(msg) => msg.to_structure(),
            BoltRequest::Run(msg) => msg.to_structure(),
            BoltRequest::Pull(msg) => msg.to_structure(tag::PULL),
            BoltRequest::Discard(msg) => msg.to_structure(tag::DISCARD),
            BoltRequest::Begin(msg) => PackStreamStructure::new(
                tag::BEGIN,
                vec![PackStreamValue::Map(msg.extra.to_map())],
            ),
            BoltRequest::Route(msg) => msg.to_structure(),
            other => PackStreamStructure::new(other.tag(), vec![]),
        }
    }

    /// Parse from PackStream structure.
    #[cfg(test)]
    pub fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        match s.tag {
            tag::HELLO => Ok(BoltRequest::Hello(HelloMessage::from_structure(s)?)),
            tag::GOODBYE => Ok(BoltRequest::Goodbye),
            tag::RESET => Ok(BoltRequest::Reset),
            tag::RUN => Ok(BoltRequest::Run(RunMessage::from_structure(s)?)),
            tag::PULL => Ok(BoltRequest::Pull(PullMessage::from_structure(s)?)),
            tag::DISCARD => Ok(BoltRequest::Discard(PullMessage::from_structure(s)?)),
            tag::BEGIN => Ok(BoltRequest::Begin(BeginMessage {
                extra: TransactionExtra::from_map(&map_field(s, 0, "BEGIN")?),
            })),
            tag::COMMIT => Ok(BoltRequest::Commit),
            tag::ROLLBACK => Ok(BoltRequest::Rollback),
            tag::ROUTE => Ok(BoltRequest::Route(RouteMessage::from_structure(s)?)),
            _ => Err(PackStreamError::InvalidStructure(format!(
                "Unknown request message tag: 0x{:02X}",
                s.tag
            ))),
        }
    }
}

#[cfg(test)]
fn map_field(
    s: &PackStreamStructure,
    idx: usize,
    name: &str,
) -> Result<HashMap<String, PackStreamValue>, PackStreamError> {
    match s.fields.get(idx) {
        Some(PackStreamValue::Map(m)) => Ok(m.clone()),
        None => Ok(HashMap::new()),
        Some(other) => Err(PackStreamError::InvalidStructure(format!(
            "{} field {} must be a map, got {}",
            name,
            idx,
            other.type_name()
        ))),
    }
}

/// HELLO message - Initialize connection.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    /// User agent string
    pub user_agent: String,
    /// Authentication token
    pub auth: AuthToken,
    /// Routing context; present only for routed connections
    pub routing: Option<HashMap<String, PackStreamValue>>,
}

impl HelloMessage {
    /// Create a new HELLO message.
    pub fn new(user_agent: impl Into<String>, auth: AuthToken) -> Self {
        Self {
            user_agent: user_agent.into(),
            auth,
            routing: None,
        }
    }

    /// Set routing context.
    pub fn with_routing(mut self, routing: HashMap<String, PackStreamValue>) -> Self {
        self.routing = Some(routing);
        self
    }

    fn to_structure(&self) -> PackStreamStructure {
        let mut extra = self.auth.to_map();
        extra.insert("user_agent".to_string(), self.user_agent.as_str().into());
        if let Some(ref routing) = self.routing {
            extra.insert("routing".to_string(), PackStreamValue::Map(routing.clone()));
        }
        PackStreamStructure::new(tag::HELLO, vec![PackStreamValue::Map(extra)])
    }

    #[cfg(test)]
    fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        let extra = map_field(s, 0, "HELLO")?;
        Ok(Self {
            user_agent: extra
                .get("user_agent")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            auth: AuthToken::from_map(&extra, &["user_agent", "routing"]),
            routing: extra.get("routing").and_then(|v| v.as_map()).cloned(),
        })
    }
}

/// Metadata shared by BEGIN and autocommit RUN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionExtra {
    /// Bookmarks the transaction must wait for
    pub bookmarks: Vec<String>,
    /// Server-side transaction timeout
    pub tx_timeout: Option<Duration>,
    /// Metadata attached to the transaction
    pub tx_metadata: HashMap<String, PackStreamValue>,
    /// Access mode
    pub mode: AccessMode,
    /// Target database; `None` means the server default
    pub db: Option<String>,
    /// User to impersonate
    pub imp_user: Option<String>,
}

impl TransactionExtra {
    /// Wire map. Defaults are omitted, including write mode.
    pub fn to_map(&self) -> HashMap<String, PackStreamValue> {
        let mut map = HashMap::new();
        if !self.bookmarks.is_empty() {
            map.insert("bookmarks".to_string(), PackStreamValue::string_list(&self.bookmarks));
        }
        if let Some(timeout) = self.tx_timeout {
            map.insert(
                "tx_timeout".to_string(),
                PackStreamValue::Integer(timeout.as_millis().min(i64::MAX as u128) as i64),
            );
        }
        if !self.tx_metadata.is_empty() {
            map.insert("tx_metadata".to_string(), PackStreamValue::Map(self.tx_metadata.clone()));
        }
        if self.mode == AccessMode::Read {
            map.insert("mode".to_string(), "r".into());
        }
        if let Some(ref db) = self.db {
            map.insert("db".to_string(), db.as_str().into());
        }
        if let Some(ref user) = self.imp_user {
            map.insert("imp_user".to_string(), user.as_str().into());
        }
        map
    }

    /// Parse a wire map.
    #[cfg(test)]
    pub fn from_map(map: &HashMap<String, PackStreamValue>) -> Self {
        let get_str = |key: &str| map.get(key).and_then(|v| v.as_str()).map(str::to_string);
        Self {
            bookmarks: map
                .get("bookmarks")
                .and_then(|v| v.as_string_list())
                .unwrap_or_default(),
            tx_timeout: map
                .get("tx_timeout")
                .and_then(|v| v.as_int())
                .map(|ms| Duration::from_millis(ms.max(0) as u64)),
            tx_metadata: map
                .get("tx_metadata")
                .and_then(|v| v.as_map())
                .cloned()
                .unwrap_or_default(),
            mode: get_str("mode").map(|m| AccessMode::from_wire(&m)).unwrap_or_default(),
            db: get_str("db"),
            imp_user: get_str("imp_user"),
        }
    }
}

/// RUN message - Execute a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMessage {
    /// Query text, passed through untouched
    pub query: String,
    /// Query parameters
    pub parameters: HashMap<String, PackStreamValue>,
    /// Transaction metadata; only meaningful outside explicit transactions
    pub extra: TransactionExtra,
}

impl RunMessage {
    /// Create a new RUN message.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: HashMap::new(),
            extra: TransactionExtra::default(),
        }
    }

    /// Set query parameters.
    pub fn with_parameters(mut self, params: HashMap<String, PackStreamValue>) -> Self {
        self.parameters = params;
        self
    }

    /// Set autocommit metadata.
    pub fn with_extra(mut self, extra: TransactionExtra) -> Self {
        self.extra = extra;
        self
    }

    fn to_structure(&self) -> PackStreamStructure {
        PackStreamStructure::new(
            tag::RUN,
            vec![
                PackStreamValue::String(self.query.clone()),
                PackStreamValue::Map(self.parameters.clone()),
                PackStreamValue::Map(self.extra.to_map()),
            ],
        )
    }

    #[cfg(test)]
    fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        let query = s
            .fields
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| PackStreamError::InvalidStructure("RUN query must be string".to_string()))?
            .to_string();
        Ok(Self {
            query,
            parameters: map_field(s, 1, "RUN")?,
            extra: TransactionExtra::from_map(&map_field(s, 2, "RUN")?),
        })
    }
}

/// PULL / DISCARD body: how many records, from which statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullMessage {
    /// Number of records (-1 for all)
    pub n: i64,
    /// Statement id inside a transaction; -1 means the last one
    pub qid: i64,
}

/// DISCARD has the same body as PULL.
pub type DiscardMessage = PullMessage;

impl PullMessage {
    /// Every remaining record of the last statement.
    pub fn all() -> Self {
        Self { n: -1, qid: -1 }
    }

    /// At most `n` records of the last statement.
    pub fn with_n(n: i64) -> Self {
        Self { n, qid: -1 }
    }

    /// Target a specific statement.
    pub fn with_qid(mut self, qid: i64) -> Self {
        self.qid = qid;
        self
    }

    fn to_structure(self, tag: u8) -> PackStreamStructure {
        let mut extra = HashMap::new();
        extra.insert("n".to_string(), PackStreamValue::Integer(self.n));
        if self.qid != -1 {
            extra.insert("qid".to_string(), PackStreamValue::Integer(self.qid));
        }
        PackStreamStructure::new(tag, vec![PackStreamValue::Map(extra)])
    }

    #[cfg(test)]
    fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        let extra = map_field(s, 0, "PULL")?;
        Ok(Self {
            n: extra.get("n").and_then(|v| v.as_int()).unwrap_or(-1),
            qid: extra.get("qid").and_then(|v| v.as_int()).unwrap_or(-1),
        })
    }
}

/// BEGIN message - Start an explicit transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeginMessage {
    /// Transaction metadata
    pub extra: TransactionExtra,
}

impl BeginMessage {
    /// Create a BEGIN message.
    pub fn new(extra: TransactionExtra) -> Self {
        Self { extra }
    }
}

/// ROUTE message - Fetch the routing table for a database.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMessage {
    /// Routing context from the connection URI
    pub routing: HashMap<String, PackStreamValue>,
    /// Bookmarks the router must have seen
    pub bookmarks: Vec<String>,
    /// Database; `None` means the server default
    pub db: Option<String>,
    /// User to impersonate (4.4+)
    pub imp_user: Option<String>,
    /// 4.3 sends the database as a bare string instead of a map
    pub legacy_db_field: bool,
}

impl RouteMessage {
    /// Create a ROUTE message in the 4.4+ shape.
    pub fn new(routing: HashMap<String, PackStreamValue>, bookmarks: Vec<String>, db: Option<String>) -> Self {
        Self {
            routing,
            bookmarks,
            db,
            imp_user: None,
            legacy_db_field: false,
        }
    }

    fn to_structure(&self) -> PackStreamStructure {
        let third = if self.legacy_db_field {
            self.db
                .as_deref()
                .map(PackStreamValue::from)
                .unwrap_or(PackStreamValue::Null)
        } else {
            let mut extra = HashMap::new();
            if let Some(ref db) = self.db {
                extra.insert("db".to_string(), db.as_str().into());
            }
            if let Some(ref user) = self.imp_user {
                extra.insert("imp_user".to_string(), user.as_str().into());
            }
            PackStreamValue::Map(extra)
        };
        PackStreamStructure::new(
            tag::ROUTE,
            vec![
                PackStreamValue::Map(self.routing.clone()),
                PackStreamValue::string_list(&self.bookmarks),
                third,
            ],
        )
    }

    #[cfg(test)]
    fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        let routing = map_field(s, 0, "ROUTE")?;
        let bookmarks = s
            .fields
            .get(1)
            .and_then(|v| v.as_string_list())
            .unwrap_or_default();
        let (db, imp_user, legacy_db_field) = match s.fields.get(2) {
            Some(PackStreamValue::Map(m)) => (
                m.get("db").and_then(|v| v.as_str()).map(str::to_string),
                m.get("imp_user").and_then(|v| v.as_str()).map(str::to_string),
                false,
            ),
            Some(PackStreamValue::String(db)) => (Some(db.clone()), None, true),
            _ => (None, None, true),
        };
        Ok(Self {
            routing,
            bookmarks,
            db,
            imp_user,
            legacy_db_field,
        })
    }
}
