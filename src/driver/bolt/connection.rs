//! Bolt connection for client-side use.
//!
//! Owns one transport (TCP or TLS), performs the handshake and keeps
//! request/response order through a FIFO of pending requests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, trace, warn};

use crate::bolt::codec::BoltResponseCodec;
use crate::bolt::handshake::{default_client_handshake, parse_server_reply, DEFAULT_PROPOSALS};
use crate::bolt::{BoltRequest, BoltResponse, BoltVersion, HandshakeError, HANDSHAKE_RESPONSE_SIZE};

use super::super::driver::{DriverConfig, ServerAddress};
use super::super::error::{DriverError, DriverResult};
use super::tls;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Byte stream a connection can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected yet, or closed with GOODBYE
    Disconnected,
    /// Transport open, version negotiation in progress
    Handshaking,
    /// Idle and usable
    Ready,
    /// Leased out by the pool
    InUse,
    /// Broken; must be discarded
    Defunct,
}

/// Client-side Bolt connection.
pub struct Connection {
    /// Framed transport
    framed: Framed<Box<dyn Transport>, BoltResponseCodec>,
    /// Local id, for logs
    id: u64,
    /// Server address
    address: ServerAddress,
    /// Negotiated protocol version
    version: BoltVersion,
    /// Connection state
    state: ConnectionState,
    /// Requests still waiting for their summary, oldest first
    pending: VecDeque<&'static str>,
    /// Bound on each receive
    read_timeout: Option<Duration>,
    /// Creation time
    created_at: Instant,
    /// Last time the connection went back to Ready
    last_used: Instant,
}

impl Connection {
    /// Connect, optionally wrap TLS and negotiate a version, all under `connection_timeout`.
    pub async fn open(address: &ServerAddress, config: &DriverConfig) -> DriverResult<Self> {
        match timeout(config.connection_timeout, Self::establish(address, config)).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::timeout(format!(
                "Connecting to {} timed out after {:?}",
                address, config.connection_timeout
            ))),
        }
    }

    async fn establish(address: &ServerAddress, config: &DriverConfig) -> DriverResult<Self> {
        let tcp = TcpStream::connect(address.to_socket_addr())
            .await
            .map_err(|e| DriverError::connection(format!("Failed to connect to {}: {}", address, e)))?;
        tcp.set_nodelay(true).ok();

        let stream: Box<dyn Transport> = if config.encrypted {
            Box::new(tls::connect(tcp, &address.host, &config.trust_strategy).await?)
        } else {
            Box::new(tcp)
        };

        Self::handshake(stream, address.clone(), config.read_timeout).await
    }

    /// Negotiate a version over an already open transport.
    pub async fn handshake(
        mut stream: Box<dyn Transport>,
        address: ServerAddress,
        read_timeout: Option<Duration>,
    ) -> DriverResult<Self> {
        stream
            .write_all(&default_client_handshake())
            .await
            .map_err(|e| DriverError::connection(format!("Handshake write to {} failed: {}", address, e)))?;
        stream
            .flush()
            .await
            .map_err(|e| DriverError::connection(format!("Handshake write to {} failed: {}", address, e)))?;

        let mut reply = [0u8; HANDSHAKE_RESPONSE_SIZE];
        if let Err(e) = stream.read_exact(&mut reply).await {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => HandshakeError::ConnectionClosed.into(),
                _ => DriverError::connection(format!("Handshake read from {} failed: {}", address, e)),
            });
        }

        let version = parse_server_reply(reply, &DEFAULT_PROPOSALS)?;
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(connection = id, %address, %version, "Bolt handshake complete");

        let now = Instant::now();
        Ok(Self {
            framed: Framed::new(stream, BoltResponseCodec::new()),
            id,
            address,
            version,
            state: ConnectionState::Ready,
            pending: VecDeque::new(),
            read_timeout,
            created_at: now,
            last_used: now,
        })
    }

    /// Append a request to the write buffer without flushing.
    pub async fn queue(&mut self, request: BoltRequest) -> DriverResult<()> {
        self.ensure_usable()?;
        let name = request.name();
        let expects_response = request.expects_response();

        trace!(connection = self.id, request = name, "queue");
        if let Err(e) = self.framed.feed(request).await {
            // Encoding fails before anything reaches the write buffer.
            let error = DriverError::from(e);
            if matches!(error, DriverError::Encoding(_)) {
                return Err(error);
            }
            return Err(self.defunct(error));
        }
        if expects_response {
            self.pending.push_back(name);
        }
        Ok(())
    }

    /// Write everything queued so far.
    pub async fn flush(&mut self) -> DriverResult<()> {
        self.ensure_usable()?;
        if let Err(e) = self.framed.flush().await {
            return Err(self.defunct(e.into()));
        }
        Ok(())
    }

    /// Queue and flush one request.
    pub async fn send(&mut self, request: BoltRequest) -> DriverResult<()> {
        self.queue(request).await?;
        self.flush().await
    }

    /// Next response, belonging to the oldest pending request.
    ///
    /// SUCCESS, FAILURE and IGNORED complete that request; RECORD does not.
    pub async fn receive(&mut self) -> DriverResult<BoltResponse> {
        self.ensure_usable()?;
        let Some(&head) = self.pending.front() else {
            return Err(self.defunct(DriverError::protocol(
                "Response requested with no request pending",
            )));
        };

        let next = match self.read_timeout {
            Some(limit) => match timeout(limit, self.framed.next()).await {
                Ok(next) => next,
                Err(_) => {
                    return Err(self.defunct(DriverError::timeout(format!(
                        "No response to {} from {} within {:?}",
                        head, self.address, limit
                    ))))
                }
            },
            None => self.framed.next().await,
        };

        match next {
            Some(Ok(response)) => {
                trace!(connection = self.id, request = head, response = response.name(), "receive");
                if response.is_summary() {
                    self.pending.pop_front();
                }
                Ok(response)
            }
            Some(Err(e)) => Err(self.defunct(e.into())),
            None => Err(self.defunct(DriverError::connection(format!(
                "Connection to {} closed by server",
                self.address
            )))),
        }
    }

    /// Send RESET and skip every response up to and including its SUCCESS.
    pub async fn reset(&mut self) -> DriverResult<()> {
        self.send(BoltRequest::Reset).await?;
        loop {
            let response = self.receive().await?;
            if !self.pending.is_empty() {
                continue;
            }
            return match response {
                BoltResponse::Success(_) => Ok(()),
                BoltResponse::Failure(failure) => Err(self.defunct(DriverError::from_failure(
                    failure.code,
                    failure.message,
                ))),
                other => Err(self.defunct(DriverError::protocol(format!(
                    "Unexpected {} in reply to RESET",
                    other.name()
                )))),
            };
        }
    }

    /// Say GOODBYE (best effort) and shut the transport down.
    pub async fn close(&mut self) {
        if self.is_usable() {
            if self.send(BoltRequest::Goodbye).await.is_err() {
                debug!(connection = self.id, "GOODBYE could not be sent");
            }
        }
        self.framed.get_mut().shutdown().await.ok();
        self.pending.clear();
        self.state = ConnectionState::Disconnected;
        debug!(connection = self.id, address = %self.address, "Connection closed");
    }

    fn ensure_usable(&self) -> DriverResult<()> {
        match self.state {
            ConnectionState::Ready | ConnectionState::InUse => Ok(()),
            ConnectionState::Defunct => Err(DriverError::connection(format!(
                "Connection to {} is defunct",
                self.address
            ))),
            state => Err(DriverError::connection(format!(
                "Connection to {} is not open ({:?})",
                self.address, state
            ))),
        }
    }

    fn defunct(&mut self, error: DriverError) -> DriverError {
        if self.state != ConnectionState::Defunct {
            warn!(connection = self.id, address = %self.address, error = %error, "Connection is defunct");
        }
        self.state = ConnectionState::Defunct;
        self.pending.clear();
        error
    }

    /// Force the connection into Defunct.
    pub fn mark_defunct(&mut self) {
        self.state = ConnectionState::Defunct;
        self.pending.clear();
    }

    pub(crate) fn mark_in_use(&mut self) {
        if self.state == ConnectionState::Ready {
            self.state = ConnectionState::InUse;
        }
    }

    pub(crate) fn mark_ready(&mut self) {
        if self.state == ConnectionState::InUse {
            self.state = ConnectionState::Ready;
            self.last_used = Instant::now();
        }
    }

    /// Whether requests can still be sent.
    pub fn is_usable(&self) -> bool {
        matches!(self.state, ConnectionState::Ready | ConnectionState::InUse)
    }

    /// Connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Negotiated protocol version.
    pub fn version(&self) -> BoltVersion {
        self.version
    }

    /// Server address.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Local connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Requests still waiting for a summary.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Time since the connection was opened.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the connection last became idle.
    pub fn idle_time(&self) -> Duration {
        self.last_used.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("state", &self.state)
            .field("version", &self.version)
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::codec::BoltRequestCodec;
    use crate::bolt::handshake::Handshake;
    use crate::bolt::{FailureMessage, PullMessage, RecordMessage, RunMessage, SuccessMessage};
    use crate::bolt::{PackStreamStructure, PackStreamValue};
    use std::collections::HashMap;
    use tokio::io::DuplexStream;

    /// Hand-driven server end of an in-memory connection.
    async fn pair() -> (Connection, Framed<DuplexStream, BoltRequestCodec>) {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let server_task = tokio::spawn(async move {
            let mut hello = [0u8; 20];
            server.read_exact(&mut hello).await.unwrap();
            let result = Handshake::new().process(&hello);
            server.write_all(&Handshake::generate_response(&result)).await.unwrap();
            Framed::new(server, BoltRequestCodec::new())
        });

        let connection = Connection::handshake(
            Box::new(client),
            ServerAddress::new("memory", 7687),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();
        (connection, server_task.await.unwrap())
    }

    #[tokio::test]
    async fn test_handshake_negotiates_highest_version() {
        let (connection, _server) = pair().await;
        assert_eq!(connection.version(), BoltVersion::V5_0);
        assert_eq!(connection.state(), ConnectionState::Ready);
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_handshake_rejection() {
        let (client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut hello = [0u8; 20];
            server.read_exact(&mut hello).await.unwrap();
            server.write_all(&[0, 0, 0, 0]).await.unwrap();
        });

        let err = Connection::handshake(Box::new(client), ServerAddress::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "HandshakeError");
    }

    #[tokio::test]
    async fn test_unencodable_request_keeps_connection_usable() {
        let (mut connection, mut server) = pair().await;

        let wide = PackStreamStructure::new(0x01, vec![PackStreamValue::Null; 16]);
        let mut params = HashMap::new();
        params.insert("s".to_string(), PackStreamValue::Structure(wide));
        let err = connection
            .send(BoltRequest::Run(RunMessage::new("RETURN $s").with_parameters(params)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "EncodingError");
        assert_eq!(connection.state(), ConnectionState::Ready);
        assert_eq!(connection.pending_count(), 0);

        connection.send(BoltRequest::Run(RunMessage::new("RETURN 1"))).await.unwrap();
        match server.next().await.unwrap().unwrap() {
            BoltRequest::Run(run) => assert_eq!(run.query, "RETURN 1"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_responses_follow_request_order() {
        let (mut connection, mut server) = pair().await;

        connection.queue(BoltRequest::Run(RunMessage::new("RETURN 1"))).await.unwrap();
        connection.queue(BoltRequest::Pull(PullMessage::all())).await.unwrap();
        connection.queue(BoltRequest::Run(RunMessage::new("RETURN 2"))).await.unwrap();
        connection.flush().await.unwrap();
        assert_eq!(connection.pending_count(), 3);

        for _ in 0..3 {
            server.next().await.unwrap().unwrap();
        }
        server.feed(BoltResponse::Success(SuccessMessage::run_success(&["x"], None))).await.unwrap();
        server.feed(BoltResponse::Record(RecordMessage::new(vec![PackStreamValue::Integer(1)]))).await.unwrap();
        server.feed(BoltResponse::Success(SuccessMessage::streaming_success(false, None))).await.unwrap();
        server.feed(BoltResponse::Success(SuccessMessage::run_success(&["y"], None))).await.unwrap();
        server.flush().await.unwrap();

        match connection.receive().await.unwrap() {
            BoltResponse::Success(s) => assert_eq!(s.fields(), vec!["x"]),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(connection.receive().await.unwrap(), BoltResponse::Record(_)));
        assert_eq!(connection.pending_count(), 2);
        assert!(matches!(connection.receive().await.unwrap(), BoltResponse::Success(_)));
        match connection.receive().await.unwrap() {
            BoltResponse::Success(s) => assert_eq!(s.fields(), vec!["y"]),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_receive_without_pending_request_is_fatal() {
        let (mut connection, _server) = pair().await;
        let err = connection.receive().await.unwrap_err();
        assert_eq!(err.kind(), "ProtocolError");
        assert_eq!(connection.state(), ConnectionState::Defunct);

        let err = connection.send(BoltRequest::Reset).await.unwrap_err();
        assert_eq!(err.kind(), "ConnectionError");
    }

    #[tokio::test]
    async fn test_reset_skips_outstanding_responses() {
        let (mut connection, mut server) = pair().await;
        connection.send(BoltRequest::Run(RunMessage::new("BAD"))).await.unwrap();

        let server_task = tokio::spawn(async move {
            server.next().await.unwrap().unwrap();
            server
                .send(BoltResponse::Failure(FailureMessage::new("Neo.ClientError.Statement.SyntaxError", "bad")))
                .await
                .unwrap();
            assert_eq!(server.next().await.unwrap().unwrap(), BoltRequest::Reset);
            server.send(BoltResponse::Success(SuccessMessage::new())).await.unwrap();
            server
        });

        connection.reset().await.unwrap();
        assert_eq!(connection.pending_count(), 0);
        assert!(connection.is_usable());
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_timeout_makes_connection_defunct() {
        let (client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut hello = [0u8; 20];
            server.read_exact(&mut hello).await.unwrap();
            server.write_all(&BoltVersion::V4_4.to_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(server);
        });

        let mut connection = Connection::handshake(
            Box::new(client),
            ServerAddress::default(),
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap();
        assert_eq!(connection.version(), BoltVersion::V4_4);

        connection.send(BoltRequest::Reset).await.unwrap();
        let err = connection.receive().await.unwrap_err();
        assert_eq!(err.kind(), "TimeoutError");
        assert_eq!(connection.state(), ConnectionState::Defunct);
    }

    #[tokio::test]
    async fn test_server_close_is_connection_error() {
        let (mut connection, server) = pair().await;
        drop(server);
        connection.send(BoltRequest::Reset).await.ok();
        let err = connection.receive().await.unwrap_err();
        assert_eq!(err.kind(), "ConnectionError");
        assert_eq!(connection.state(), ConnectionState::Defunct);
    }
}
