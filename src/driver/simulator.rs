//! Scripted Bolt server for tests.
//!
//! Speaks the server side of Bolt over loopback TCP: handshake, HELLO,
//! auto-commit and explicit transactions, PULL/DISCARD batching, ROUTE and
//! the routing procedure. Replies are scripted per query text; unscripted
//! queries succeed with an empty result. Every request is logged as
//! `"RUN <query>"` or the bare message name.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use crate::bolt::handshake::{Handshake, HANDSHAKE_SIZE};
use crate::bolt::{
    AuthToken, BoltRequest, BoltRequestCodec, BoltResponse, BoltVersion, FailureMessage, HandshakeError,
    PackStreamValue, RecordMessage, RoutingInfo, SuccessMessage, TransactionExtra,
};

use super::bolt::ROUTING_PROCEDURE;
use super::driver::{DriverConfig, ServerAddress};

const REQUEST_INVALID: &str = "Neo.ClientError.Request.Invalid";
const PROCEDURE_NOT_FOUND: &str = "Neo.ClientError.Procedure.ProcedureNotFound";

/// Scripted answer to a RUN.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Rows {
        fields: Vec<String>,
        rows: Vec<Vec<PackStreamValue>>,
    },
    Failure {
        code: String,
        message: String,
    },
    /// Answer with an empty result, but only after sleeping.
    Stall(Duration),
}

impl Reply {
    pub(crate) fn rows(fields: &[&str], rows: Vec<Vec<PackStreamValue>>) -> Self {
        Reply::Rows {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            rows,
        }
    }

    pub(crate) fn failure(code: &str, message: &str) -> Self {
        Reply::Failure {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn stall(delay: Duration) -> Self {
        Reply::Stall(delay)
    }
}

#[derive(Default)]
struct Script {
    replies: HashMap<String, Reply>,
    once: HashMap<String, VecDeque<Reply>>,
    routes: VecDeque<RoutingInfo>,
    requests: Vec<String>,
    begins: Vec<TransactionExtra>,
    last_parameters: HashMap<String, PackStreamValue>,
    commit_failure: Option<(String, String)>,
    pull_failure: Option<(String, String)>,
    empty_pull: bool,
    bookmarks: u64,
    connections: usize,
    reject_auth: bool,
    reject_handshake: bool,
}

impl Script {
    fn reply_for(&mut self, query: &str) -> Reply {
        if let Some(reply) = self.once.get_mut(query).and_then(VecDeque::pop_front) {
            return reply;
        }
        self.replies
            .get(query)
            .cloned()
            .unwrap_or_else(|| Reply::rows(&[], Vec::new()))
    }

    fn next_bookmark(&mut self) -> String {
        self.bookmarks += 1;
        format!("bm:{}", self.bookmarks)
    }

    /// Pushed tables are served in order; the last one keeps being served.
    fn next_route(&mut self) -> Option<RoutingInfo> {
        if self.routes.len() > 1 {
            self.routes.pop_front()
        } else {
            self.routes.front().cloned()
        }
    }
}

/// Routes driver logs to the test output. Filtered by `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A running scripted server. Stops accepting when dropped.
pub(crate) struct Simulator {
    address: ServerAddress,
    script: Arc<Mutex<Script>>,
    acceptor: JoinHandle<()>,
}

impl Simulator {
    pub(crate) const AGENT: &'static str = "Neo4j/5.13.0";

    pub(crate) async fn start() -> Self {
        Self::start_with_versions(BoltVersion::ALL.to_vec()).await
    }

    pub(crate) async fn start_with_versions(versions: Vec<BoltVersion>) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind simulator");
        let local = listener.local_addr().expect("simulator address");

        let mut script = Script::default();
        script.replies.insert(
            "RETURN 1 AS x".to_string(),
            Reply::rows(&["x"], vec![vec![PackStreamValue::Integer(1)]]),
        );
        let script = Arc::new(Mutex::new(script));

        let handshake = Handshake::with_versions(versions);
        let acceptor = tokio::spawn({
            let script = script.clone();
            async move {
                while let Ok((socket, _)) = listener.accept().await {
                    tokio::spawn(serve(socket, handshake.clone(), script.clone()));
                }
            }
        });

        Self {
            address: ServerAddress::new(local.ip().to_string(), local.port()),
            script,
            acceptor,
        }
    }

    pub(crate) fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Direct-mode config with near-zero retry backoff.
    pub(crate) fn config(&self) -> DriverConfig {
        DriverConfig::builder(&format!("bolt://{}", self.address), AuthToken::none())
            .expect("simulator uri")
            .with_initial_retry_delay(Duration::from_millis(1))
            .build()
    }

    /// Answer `query` with `reply` from now on.
    pub(crate) fn on(&self, query: &str, reply: Reply) {
        self.script.lock().replies.insert(query.to_string(), reply);
    }

    /// Answer the next `query` with `reply`, then fall back.
    pub(crate) fn once(&self, query: &str, reply: Reply) {
        self.script
            .lock()
            .once
            .entry(query.to_string())
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn push_route(&self, info: RoutingInfo) {
        self.script.lock().routes.push_back(info);
    }

    pub(crate) fn reject_auth(&self) {
        self.script.lock().reject_auth = true;
    }

    pub(crate) fn reject_handshake(&self) {
        self.script.lock().reject_handshake = true;
    }

    /// Fail the next COMMIT.
    pub(crate) fn fail_commit(&self, code: &str, message: &str) {
        self.script.lock().commit_failure = Some((code.to_string(), message.to_string()));
    }

    /// Fail the next PULL.
    pub(crate) fn fail_pull(&self, code: &str, message: &str) {
        self.script.lock().pull_failure = Some((code.to_string(), message.to_string()));
    }

    /// Answer the next PULL with no records while claiming more remain.
    pub(crate) fn empty_pull(&self) {
        self.script.lock().empty_pull = true;
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.script.lock().requests.clone()
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.script.lock().connections
    }

    pub(crate) fn last_begin(&self) -> Option<TransactionExtra> {
        self.script.lock().begins.last().cloned()
    }

    pub(crate) fn begin_bookmarks(&self) -> Vec<Vec<String>> {
        self.script
            .lock()
            .begins
            .iter()
            .map(|extra| extra.bookmarks.clone())
            .collect()
    }

    pub(crate) fn last_parameters(&self) -> HashMap<String, PackStreamValue> {
        self.script.lock().last_parameters.clone()
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

async fn serve(mut socket: TcpStream, handshake: Handshake, script: Arc<Mutex<Script>>) {
    let mut preamble = [0u8; HANDSHAKE_SIZE];
    if socket.read_exact(&mut preamble).await.is_err() {
        return;
    }

    let (negotiated, id) = {
        let mut script = script.lock();
        script.connections += 1;
        let negotiated = if script.reject_handshake {
            Err(HandshakeError::Rejected)
        } else {
            handshake.process(&preamble)
        };
        (negotiated, script.connections)
    };
    if socket.write_all(&Handshake::generate_response(&negotiated)).await.is_err() || negotiated.is_err() {
        return;
    }

    let mut framed = Framed::new(socket, BoltRequestCodec::new());
    let mut peer = Peer::new(id);
    while let Some(Ok(request)) = framed.next().await {
        if matches!(request, BoltRequest::Goodbye) {
            script.lock().requests.push("GOODBYE".to_string());
            break;
        }
        let (delay, responses) = peer.handle(request, &mut script.lock());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        for response in responses {
            if framed.feed(response).await.is_err() {
                return;
            }
        }
        if framed.flush().await.is_err() {
            return;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Streaming,
    TxReady,
    TxStreaming,
    Failed,
}

/// Server-side state of one connection.
struct Peer {
    id: usize,
    state: State,
    rows: VecDeque<Vec<PackStreamValue>>,
}

type Answer = (Option<Duration>, Vec<BoltResponse>);

impl Peer {
    fn new(id: usize) -> Self {
        Self {
            id,
            state: State::Ready,
            rows: VecDeque::new(),
        }
    }

    fn handle(&mut self, request: BoltRequest, script: &mut Script) -> Answer {
        script.requests.push(match &request {
            BoltRequest::Run(run) => format!("RUN {}", run.query),
            other => other.name().to_string(),
        });

        if self.state == State::Failed && !matches!(request, BoltRequest::Reset) {
            return (None, vec![BoltResponse::Ignored]);
        }

        match request {
            BoltRequest::Hello(_) if script.reject_auth => self.fail(
                crate::bolt::BoltErrorCode::AUTHENTICATION_FAILED,
                "The client is unauthorized due to authentication failure.",
            ),
            BoltRequest::Hello(_) => success(SuccessMessage::hello_success(
                Simulator::AGENT,
                &format!("bolt-{}", self.id),
            )),
            BoltRequest::Reset => {
                self.state = State::Ready;
                self.rows.clear();
                success(SuccessMessage::new())
            }
            BoltRequest::Run(run) => {
                if !matches!(self.state, State::Ready | State::TxReady) {
                    return self.fail(REQUEST_INVALID, "RUN while a result is still open");
                }
                script.last_parameters = run.parameters.clone();
                if run.query == ROUTING_PROCEDURE {
                    return self.routing_procedure(script);
                }
                match script.reply_for(&run.query) {
                    Reply::Rows { fields, rows } => {
                        self.open_stream(rows);
                        let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
                        success(SuccessMessage::run_success(&fields, None))
                    }
                    Reply::Failure { code, message } => self.fail(&code, &message),
                    Reply::Stall(delay) => {
                        self.open_stream(Vec::new());
                        (Some(delay), vec![BoltResponse::Success(SuccessMessage::run_success(&[], None))])
                    }
                }
            }
            BoltRequest::Pull(pull) => {
                if !self.is_streaming() {
                    return self.fail(REQUEST_INVALID, "PULL without an open result");
                }
                if let Some((code, message)) = script.pull_failure.take() {
                    return self.fail(&code, &message);
                }
                if std::mem::take(&mut script.empty_pull) {
                    return success(SuccessMessage::streaming_success(true, None));
                }
                let take = self.batch_len(pull.n);
                let mut responses: Vec<BoltResponse> = self
                    .rows
                    .drain(..take)
                    .map(|row| BoltResponse::Record(RecordMessage::new(row)))
                    .collect();
                responses.push(self.stream_summary(script));
                (None, responses)
            }
            BoltRequest::Discard(discard) => {
                if !self.is_streaming() {
                    return self.fail(REQUEST_INVALID, "DISCARD without an open result");
                }
                let take = self.batch_len(discard.n);
                self.rows.drain(..take);
                (None, vec![self.stream_summary(script)])
            }
            BoltRequest::Begin(begin) => {
                if self.state != State::Ready {
                    return self.fail(REQUEST_INVALID, "BEGIN outside the READY state");
                }
                script.begins.push(begin.extra);
                self.state = State::TxReady;
                success(SuccessMessage::new())
            }
            BoltRequest::Commit => {
                if self.state != State::TxReady {
                    return self.fail(REQUEST_INVALID, "COMMIT without a transaction");
                }
                if let Some((code, message)) = script.commit_failure.take() {
                    return self.fail(&code, &message);
                }
                self.state = State::Ready;
                success(SuccessMessage::commit_success(&script.next_bookmark()))
            }
            BoltRequest::Rollback => {
                if self.state != State::TxReady {
                    return self.fail(REQUEST_INVALID, "ROLLBACK without a transaction");
                }
                self.state = State::Ready;
                success(SuccessMessage::new())
            }
            BoltRequest::Route(_) => match script.next_route() {
                Some(info) => success(SuccessMessage::new().add("rt", PackStreamValue::Map(info.to_map()))),
                None => self.fail(PROCEDURE_NOT_FOUND, "No routing table scripted"),
            },
            BoltRequest::Goodbye => (None, Vec::new()),
        }
    }

    fn routing_procedure(&mut self, script: &mut Script) -> Answer {
        let Some(info) = script.next_route() else {
            return self.fail(PROCEDURE_NOT_FOUND, "No routing table scripted");
        };
        let servers = info
            .to_map()
            .remove("servers")
            .unwrap_or(PackStreamValue::List(Vec::new()));
        self.open_stream(vec![vec![PackStreamValue::Integer(info.ttl), servers]]);
        success(SuccessMessage::run_success(&["ttl", "servers"], None))
    }

    fn open_stream(&mut self, rows: Vec<Vec<PackStreamValue>>) {
        self.rows = rows.into();
        self.state = match self.state {
            State::TxReady => State::TxStreaming,
            _ => State::Streaming,
        };
    }

    fn is_streaming(&self) -> bool {
        matches!(self.state, State::Streaming | State::TxStreaming)
    }

    fn batch_len(&self, n: i64) -> usize {
        if n < 0 {
            self.rows.len()
        } else {
            (n as usize).min(self.rows.len())
        }
    }

    /// Summary after PULL/DISCARD. Auto-commit results carry a bookmark.
    fn stream_summary(&mut self, script: &mut Script) -> BoltResponse {
        if !self.rows.is_empty() {
            return BoltResponse::Success(SuccessMessage::streaming_success(true, None));
        }
        let bookmark = match self.state {
            State::TxStreaming => {
                self.state = State::TxReady;
                None
            }
            _ => {
                self.state = State::Ready;
                Some(script.next_bookmark())
            }
        };
        BoltResponse::Success(SuccessMessage::streaming_success(false, bookmark.as_deref()))
    }

    fn fail(&mut self, code: &str, message: &str) -> Answer {
        self.state = State::Failed;
        self.rows.clear();
        (None, vec![BoltResponse::Failure(FailureMessage::new(code, message))])
    }
}

fn success(message: SuccessMessage) -> Answer {
    (None, vec![BoltResponse::Success(message)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::bolt::{BoltClient, Connection};

    #[tokio::test]
    async fn test_negotiates_only_offered_versions() {
        let sim = Simulator::start_with_versions(vec![BoltVersion::V4_3]).await;
        let connection = Connection::open(sim.address(), &sim.config()).await.unwrap();
        assert_eq!(connection.version(), BoltVersion::V4_3);
        assert_eq!(sim.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_handshake_rejection() {
        let sim = Simulator::start().await;
        sim.reject_handshake();
        let err = Connection::open(sim.address(), &sim.config()).await.unwrap_err();
        assert_eq!(err.kind(), "HandshakeError");
    }

    #[tokio::test]
    async fn test_failed_state_ignores_until_reset() {
        let sim = Simulator::start().await;
        let mut connection = Connection::open(sim.address(), &sim.config()).await.unwrap();

        connection.send(BoltRequest::Pull(crate::bolt::PullMessage::all())).await.unwrap();
        assert!(matches!(connection.receive().await.unwrap(), BoltResponse::Failure(_)));
        connection.send(BoltRequest::Commit).await.unwrap();
        assert_eq!(connection.receive().await.unwrap(), BoltResponse::Ignored);
        connection.send(BoltRequest::Reset).await.unwrap();
        assert!(matches!(connection.receive().await.unwrap(), BoltResponse::Success(_)));
    }

    #[tokio::test]
    async fn test_once_falls_back_to_scripted_reply() {
        let sim = Simulator::start().await;
        sim.once("RETURN 1 AS x", Reply::failure(crate::bolt::BoltErrorCode::DEADLOCK_DETECTED, "deadlock"));
        let mut client = BoltClient::connect(sim.address(), &sim.config()).await.unwrap();

        let first = client.run("RETURN 1 AS x", HashMap::new(), TransactionExtra::default()).await;
        assert_eq!(first.unwrap_err().kind(), "TransientError");
        client.run("RETURN 1 AS x", HashMap::new(), TransactionExtra::default()).await.unwrap();
        let batch = client.pull(-1).await.unwrap();
        assert_eq!(batch.records, vec![vec![PackStreamValue::Integer(1)]]);
        assert_eq!(batch.summary.bookmark(), Some("bm:1"));
    }
}
