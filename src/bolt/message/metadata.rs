//! Structured views over SUCCESS metadata.

use std::collections::HashMap;
use std::str::FromStr;

use crate::bolt::packstream::{PackStreamError, PackStreamValue};

/// Update counters from the `stats` entry of a stream summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Nodes created
    pub nodes_created: i64,
    /// Nodes deleted
    pub nodes_deleted: i64,
    /// Relationships created
    pub relationships_created: i64,
    /// Relationships deleted
    pub relationships_deleted: i64,
    /// Properties set
    pub properties_set: i64,
    /// Labels added
    pub labels_added: i64,
    /// Labels removed
    pub labels_removed: i64,
    /// Indexes added
    pub indexes_added: i64,
    /// Indexes removed
    pub indexes_removed: i64,
    /// Constraints added
    pub constraints_added: i64,
    /// Constraints removed
    pub constraints_removed: i64,
    /// System database updates
    pub system_updates: i64,
}

impl QueryStats {
    fn counters(&self) -> [(&'static str, i64); 12] {
        [
            ("nodes-created", self.nodes_created),
            ("nodes-deleted", self.nodes_deleted),
            ("relationships-created", self.relationships_created),
            ("relationships-deleted", self.relationships_deleted),
            ("properties-set", self.properties_set),
            ("labels-added", self.labels_added),
            ("labels-removed", self.labels_removed),
            ("indexes-added", self.indexes_added),
            ("indexes-removed", self.indexes_removed),
            ("constraints-added", self.constraints_added),
            ("constraints-removed", self.constraints_removed),
            ("system-updates", self.system_updates),
        ]
    }

    /// Any data update other than system updates.
    pub fn contains_updates(&self) -> bool {
        self.counters()
            .iter()
            .any(|(key, n)| *key != "system-updates" && *n > 0)
    }

    /// Any system database update.
    pub fn contains_system_updates(&self) -> bool {
        self.system_updates > 0
    }

    /// Wire map; zero counters are omitted.
    pub fn to_map(&self) -> HashMap<String, PackStreamValue> {
        self.counters()
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .map(|(k, n)| (k.to_string(), PackStreamValue::Integer(n)))
            .collect()
    }

    /// Parse a wire map; missing counters are zero.
    pub fn from_map(map: &HashMap<String, PackStreamValue>) -> Self {
        let n = |key: &str| map.get(key).and_then(|v| v.as_int()).unwrap_or(0);
        Self {
            nodes_created: n("nodes-created"),
            nodes_deleted: n("nodes-deleted"),
            relationships_created: n("relationships-created"),
            relationships_deleted: n("relationships-deleted"),
            properties_set: n("properties-set"),
            labels_added: n("labels-added"),
            labels_removed: n("labels-removed"),
            indexes_added: n("indexes-added"),
            indexes_removed: n("indexes-removed"),
            constraints_added: n("constraints-added"),
            constraints_removed: n("constraints-removed"),
            system_updates: n("system-updates"),
        }
    }
}

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationSeverity {
    /// Warning
    Warning,
    /// Information
    Information,
}

/// Position in the query text a notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPosition {
    /// Line number (1-based)
    pub line: i64,
    /// Column number (1-based)
    pub column: i64,
    /// Character offset (0-based)
    pub offset: i64,
}

/// A server notification attached to a stream summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Notification code
    pub code: String,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Severity
    pub severity: NotificationSeverity,
    /// Position in query
    pub position: Option<NotificationPosition>,
}

impl Notification {
    /// Parse one entry of the `notifications` list. Entries without a code are dropped.
    pub fn from_map(map: &HashMap<String, PackStreamValue>) -> Option<Self> {
        let text = |key: &str| {
            map.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let code = map.get("code").and_then(|v| v.as_str())?.to_string();
        let severity = match map.get("severity").and_then(|v| v.as_str()) {
            Some(s) if s.eq_ignore_ascii_case("WARNING") => NotificationSeverity::Warning,
            _ => NotificationSeverity::Information,
        };
        let position = map.get("position").and_then(|v| v.as_map()).and_then(|pos| {
            Some(NotificationPosition {
                line: pos.get("line").and_then(|v| v.as_int())?,
                column: pos.get("column").and_then(|v| v.as_int())?,
                offset: pos.get("offset").and_then(|v| v.as_int()).unwrap_or(0),
            })
        });
        Some(Self {
            code,
            title: text("title"),
            description: text("description"),
            severity,
            position,
        })
    }

    /// Parse the `notifications` metadata entry.
    pub fn list_from(value: Option<&PackStreamValue>) -> Vec<Self> {
        value
            .and_then(|v| v.as_list())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_map().and_then(Self::from_map))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Server role in a routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerRole {
    /// Answers routing requests
    Route,
    /// Accepts writes (the leader)
    Write,
    /// Serves reads
    Read,
}

impl ServerRole {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerRole::Route => "ROUTE",
            ServerRole::Write => "WRITE",
            ServerRole::Read => "READ",
        }
    }
}

impl FromStr for ServerRole {
    type Err = PackStreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ROUTE" => Ok(ServerRole::Route),
            "WRITE" => Ok(ServerRole::Write),
            "READ" => Ok(ServerRole::Read),
            other => Err(PackStreamError::InvalidStructure(format!(
                "unknown server role {:?}",
                other
            ))),
        }
    }
}

/// Routing information as returned by ROUTE (the `rt` entry) or by the
/// `dbms.routing.getRoutingTable` procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingInfo {
    /// Time to live in seconds
    pub ttl: i64,
    /// Database the table belongs to, when the server reports it
    pub db: Option<String>,
    /// Addresses per role, in server order
    pub servers: Vec<(ServerRole, Vec<String>)>,
}

impl RoutingInfo {
    /// Create an empty table.
    pub fn new(ttl: i64, db: Option<String>) -> Self {
        Self {
            ttl,
            db,
            servers: Vec::new(),
        }
    }

    /// Add addresses for a role.
    pub fn with_servers(mut self, role: ServerRole, addresses: &[&str]) -> Self {
        self.servers
            .push((role, addresses.iter().map(|a| a.to_string()).collect()));
        self
    }

    /// Addresses for one role.
    pub fn addresses(&self, role: ServerRole) -> impl Iterator<Item = &str> {
        self.servers
            .iter()
            .filter(move |(r, _)| *r == role)
            .flat_map(|(_, addrs)| addrs.iter().map(String::as_str))
    }

    /// Parse the routing table map.
    pub fn from_map(map: &HashMap<String, PackStreamValue>) -> Result<Self, PackStreamError> {
        let ttl = map
            .get("ttl")
            .and_then(|v| v.as_int())
            .ok_or_else(|| PackStreamError::InvalidStructure("routing table without ttl".into()))?;
        let db = map.get("db").and_then(|v| v.as_str()).map(str::to_string);
        Self::from_parts(ttl, db, map.get("servers"))
    }

    /// Parse the `[ttl, servers]` row produced by the routing procedure.
    pub fn from_record(fields: &[String], values: &[PackStreamValue]) -> Result<Self, PackStreamError> {
        let column = |name: &str| {
            fields
                .iter()
                .position(|f| f == name)
                .and_then(|i| values.get(i))
        };
        let ttl = column("ttl")
            .and_then(|v| v.as_int())
            .ok_or_else(|| PackStreamError::InvalidStructure("routing record without ttl".into()))?;
        Self::from_parts(ttl, None, column("servers"))
    }

    fn from_parts(ttl: i64, db: Option<String>, servers: Option<&PackStreamValue>) -> Result<Self, PackStreamError> {
        let entries = servers
            .and_then(|v| v.as_list())
            .ok_or_else(|| PackStreamError::InvalidStructure("routing table without servers".into()))?;
        let mut info = Self::new(ttl, db);
        for entry in entries {
            let entry = entry
                .as_map()
                .ok_or_else(|| PackStreamError::InvalidStructure("server entry must be a map".into()))?;
            let role = entry
                .get("role")
                .and_then(|v| v.as_str())
                .ok_or_else(|| PackStreamError::InvalidStructure("server entry without role".into()))?
                .parse::<ServerRole>()?;
            let addresses = entry
                .get("addresses")
                .and_then(|v| v.as_string_list())
                .unwrap_or_default();
            info.servers.push((role, addresses));
        }
        Ok(info)
    }

    /// Wire map, as a server would send it.
    pub fn to_map(&self) -> HashMap<String, PackStreamValue> {
        let servers = self
            .servers
            .iter()
            .map(|(role, addrs)| {
                PackStreamValue::map([
                    ("role", role.as_str().into()),
                    ("addresses", PackStreamValue::string_list(addrs)),
                ])
            })
            .collect();
        let mut map = HashMap::new();
        map.insert("ttl".to_string(), PackStreamValue::Integer(self.ttl));
        map.insert("servers".to_string(), PackStreamValue::List(servers));
        if let Some(ref db) = self.db {
            map.insert("db".to_string(), db.as_str().into());
        }
        map
    }
}
