//! High-level Bolt client for driver use.
//!
//! Wraps a [`Connection`] with typed request/response exchanges and
//! recovers the connection after server failures.

use std::collections::HashMap;

use tracing::debug;

use crate::bolt::packstream::PackStreamValue;
use crate::bolt::{
    AccessMode, AuthToken, BeginMessage, BoltRequest, BoltResponse, BoltVersion, FailureMessage,
    HelloMessage, PullMessage, RouteMessage, RoutingInfo, RunMessage, SuccessMessage,
    TransactionExtra,
};

use super::super::driver::{DriverConfig, ServerAddress};
use super::super::error::{DriverError, DriverResult};
use super::connection::{Connection, ConnectionState};

/// Routing procedure used before ROUTE existed (Bolt < 4.3).
pub const ROUTING_PROCEDURE: &str = "CALL dbms.routing.getRoutingTable($context, $database)";

/// Records and summary of one PULL.
#[derive(Debug, Default)]
pub struct PullBatch {
    /// Raw record fields, in arrival order
    pub records: Vec<Vec<PackStreamValue>>,
    /// Whether the server holds more records
    pub has_more: bool,
    /// SUCCESS metadata closing the batch
    pub summary: SuccessMessage,
}

/// High-level Bolt client.
///
/// Tracks whether a result stream or an explicit transaction is open so
/// the pool can tell when a connection needs a RESET before reuse.
pub struct BoltClient {
    /// Underlying connection
    connection: Connection,
    /// Server agent from HELLO
    server_agent: Option<String>,
    /// Server-side connection id from HELLO
    connection_id: Option<String>,
    /// A RUN was acknowledged and its records are not exhausted
    streaming: bool,
    /// BEGIN was acknowledged without COMMIT/ROLLBACK yet
    in_transaction: bool,
}

impl BoltClient {
    /// Wrap an already negotiated connection.
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            server_agent: None,
            connection_id: None,
            streaming: false,
            in_transaction: false,
        }
    }

    /// Open a connection to `address` and authenticate with HELLO.
    pub async fn connect(address: &ServerAddress, config: &DriverConfig) -> DriverResult<Self> {
        let connection = Connection::open(address, config).await?;
        let mut client = Self::new(connection);
        let routing = config
            .routing
            .then(|| config.routing_context_for(address));
        client.hello(&config.user_agent, &config.auth, routing).await?;
        Ok(client)
    }

    /// Authenticate. A failed HELLO leaves the connection defunct.
    pub async fn hello(
        &mut self,
        user_agent: &str,
        auth: &AuthToken,
        routing: Option<HashMap<String, PackStreamValue>>,
    ) -> DriverResult<()> {
        let mut hello = HelloMessage::new(user_agent, auth.clone());
        if let Some(routing) = routing {
            hello = hello.with_routing(routing);
        }

        self.connection.send(BoltRequest::Hello(hello)).await?;
        match self.connection.receive().await? {
            BoltResponse::Success(success) => {
                self.server_agent = success.server().map(String::from);
                self.connection_id = success.connection_id().map(String::from);
                debug!(
                    address = %self.connection.address(),
                    server = ?self.server_agent,
                    connection_id = ?self.connection_id,
                    "Authenticated"
                );
                Ok(())
            }
            BoltResponse::Failure(failure) => {
                self.connection.mark_defunct();
                Err(DriverError::from_failure(failure.code, failure.message))
            }
            other => Err(self.violation(format!("Unexpected {} in reply to HELLO", other.name()))),
        }
    }

    /// RUN a query. Returns the RUN summary (`fields`, `t_first`, `qid`).
    pub async fn run(
        &mut self,
        query: &str,
        parameters: HashMap<String, PackStreamValue>,
        extra: TransactionExtra,
    ) -> DriverResult<SuccessMessage> {
        self.close_stream().await?;
        let run = RunMessage::new(query)
            .with_parameters(parameters)
            .with_extra(extra);
        let summary = self.request(BoltRequest::Run(run)).await?;
        self.streaming = true;
        Ok(summary)
    }

    /// PULL up to `n` records (-1 for all) of the open stream.
    pub async fn pull(&mut self, n: i64) -> DriverResult<PullBatch> {
        self.connection
            .send(BoltRequest::Pull(PullMessage::with_n(n)))
            .await?;

        let mut records = Vec::new();
        loop {
            match self.connection.receive().await? {
                BoltResponse::Record(record) => records.push(record.fields),
                BoltResponse::Success(summary) => {
                    let has_more = summary.has_more();
                    self.streaming = has_more;
                    return Ok(PullBatch {
                        records,
                        has_more,
                        summary,
                    });
                }
                BoltResponse::Failure(failure) => return Err(self.recover(failure).await),
                BoltResponse::Ignored => return Err(self.ignored()),
            }
        }
    }

    /// DISCARD up to `n` records (-1 for all) of the open stream.
    pub async fn discard(&mut self, n: i64) -> DriverResult<SuccessMessage> {
        let summary = self
            .request(BoltRequest::Discard(PullMessage::with_n(n)))
            .await?;
        self.streaming = summary.has_more();
        Ok(summary)
    }

    /// BEGIN an explicit transaction.
    pub async fn begin(&mut self, extra: TransactionExtra) -> DriverResult<()> {
        self.close_stream().await?;
        self.request(BoltRequest::Begin(BeginMessage::new(extra)))
            .await?;
        self.in_transaction = true;
        Ok(())
    }

    /// COMMIT. Returns the bookmark, if the server sent one.
    pub async fn commit(&mut self) -> DriverResult<Option<String>> {
        self.close_stream().await?;
        let summary = self.request(BoltRequest::Commit).await?;
        self.in_transaction = false;
        Ok(summary.bookmark().map(String::from))
    }

    /// ROLLBACK.
    pub async fn rollback(&mut self) -> DriverResult<()> {
        self.close_stream().await?;
        self.request(BoltRequest::Rollback).await?;
        self.in_transaction = false;
        Ok(())
    }

    /// RESET to a clean state, dropping any stream or transaction.
    pub async fn reset(&mut self) -> DriverResult<()> {
        self.streaming = false;
        self.in_transaction = false;
        self.connection.reset().await
    }

    /// Fetch the routing table for `db`.
    ///
    /// Uses ROUTE on 4.3+ and the routing procedure on older servers.
    pub async fn route(
        &mut self,
        context: HashMap<String, PackStreamValue>,
        bookmarks: Vec<String>,
        db: Option<String>,
        imp_user: Option<String>,
    ) -> DriverResult<RoutingInfo> {
        let version = self.connection.version();
        if version.supports_route() {
            self.close_stream().await?;
            let mut route = RouteMessage::new(context, bookmarks, db);
            route.legacy_db_field = version == BoltVersion::V4_3;
            route.imp_user = imp_user.filter(|_| version >= BoltVersion::V4_4);

            let summary = self.request(BoltRequest::Route(route)).await?;
            let table = summary
                .get("rt")
                .and_then(|v| v.as_map())
                .ok_or_else(|| self.violation("ROUTE reply without a routing table"))?;
            return RoutingInfo::from_map(table).map_err(|e| self.violation(e.to_string()));
        }

        let mut parameters = HashMap::new();
        parameters.insert("context".to_string(), PackStreamValue::Map(context));
        parameters.insert(
            "database".to_string(),
            db.map(PackStreamValue::String).unwrap_or(PackStreamValue::Null),
        );
        let extra = TransactionExtra {
            bookmarks,
            mode: AccessMode::Read,
            db: Some("system".to_string()),
            ..TransactionExtra::default()
        };

        let run = self.run(ROUTING_PROCEDURE, parameters, extra).await?;
        let fields = run.fields();
        let batch = self.pull(-1).await?;
        let row = batch
            .records
            .first()
            .ok_or_else(|| DriverError::protocol("Routing procedure returned no rows"))?;
        RoutingInfo::from_record(&fields, row).map_err(|e| DriverError::protocol(e.to_string()))
    }

    /// Send GOODBYE and close the transport.
    pub async fn goodbye(&mut self) {
        self.connection.close().await;
    }

    /// Send one request and wait for its summary.
    async fn request(&mut self, request: BoltRequest) -> DriverResult<SuccessMessage> {
        let name = request.name();
        self.connection.send(request).await?;
        match self.connection.receive().await? {
            BoltResponse::Success(summary) => Ok(summary),
            BoltResponse::Failure(failure) => Err(self.recover(failure).await),
            BoltResponse::Ignored => Err(self.ignored()),
            BoltResponse::Record(_) => Err(self.violation(format!("RECORD in reply to {}", name))),
        }
    }

    /// Discard the rest of an open stream before a new request.
    async fn close_stream(&mut self) -> DriverResult<()> {
        if self.streaming {
            self.discard(-1).await?;
        }
        Ok(())
    }

    /// Turn a FAILURE into an error and RESET the connection.
    async fn recover(&mut self, failure: FailureMessage) -> DriverError {
        let error = DriverError::from_failure(failure.code, failure.message);
        self.streaming = false;
        self.in_transaction = false;

        debug!(address = %self.connection.address(), code = ?error.code(), "Server failure, resetting");
        if self.connection.reset().await.is_err() {
            self.connection.mark_defunct();
        }
        error
    }

    /// IGNORED without a preceding failure means client and server disagree on state.
    fn ignored(&mut self) -> DriverError {
        self.violation("Request was IGNORED by the server")
    }

    fn violation(&mut self, message: impl Into<String>) -> DriverError {
        self.connection.mark_defunct();
        DriverError::protocol(message)
    }

    /// A result stream is still open.
    pub fn has_open_stream(&self) -> bool {
        self.streaming
    }

    /// An explicit transaction is still open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// The connection must be RESET before someone else uses it.
    pub fn needs_reset(&self) -> bool {
        self.streaming || self.in_transaction
    }

    /// Connection can still be used.
    pub fn is_open(&self) -> bool {
        self.connection.is_usable()
    }

    /// Force the connection into Defunct.
    pub fn mark_defunct(&mut self) {
        self.connection.mark_defunct();
    }

    /// Connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Server agent string.
    pub fn server_agent(&self) -> Option<&str> {
        self.server_agent.as_deref()
    }

    /// Server-side connection id.
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Negotiated protocol version.
    pub fn version(&self) -> BoltVersion {
        self.connection.version()
    }

    /// Server address.
    pub fn address(&self) -> &ServerAddress {
        self.connection.address()
    }

    /// Underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Underlying connection, mutably.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }
}

impl std::fmt::Debug for BoltClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoltClient")
            .field("connection", &self.connection)
            .field("server_agent", &self.server_agent)
            .field("streaming", &self.streaming)
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}
