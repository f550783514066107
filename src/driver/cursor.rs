//! Result Cursor
//!
//! 쿼리 결과 커서
//!
//! 레코드는 필요할 때 `fetch_size` 단위로 PULL합니다. 스트림이 끝나면
//! 결과 요약을 만들고, auto-commit 쿼리라면 북마크를 세션에 넘긴 뒤
//! 연결을 풀에 돌려줍니다.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::bolt::{Notification, QueryStats, SuccessMessage};

use super::driver::ServerAddress;
use super::error::{DriverError, DriverResult};
use super::record::Record;
use super::session::{Bookmark, Query, Session};
use super::transaction::TransactionState;

// ============================================================================
// ResultSummary - 결과 요약
// ============================================================================

/// 쿼리 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// 읽기 전용
    ReadOnly,
    /// 읽기/쓰기
    ReadWrite,
    /// 쓰기 전용
    WriteOnly,
    /// 스키마 변경
    SchemaWrite,
}

impl QueryType {
    /// 서버 표기("r", "rw", "w", "s")에서 변환
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "r" => Some(Self::ReadOnly),
            "rw" => Some(Self::ReadWrite),
            "w" => Some(Self::WriteOnly),
            "s" => Some(Self::SchemaWrite),
            _ => None,
        }
    }
}

/// 결과 요약
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSummary {
    /// 쿼리
    pub query: Query,
    /// 쿼리 타입
    pub query_type: Option<QueryType>,
    /// 카운터
    pub counters: QueryStats,
    /// 첫 레코드까지 걸린 시간
    pub result_available_after: Option<Duration>,
    /// 스트림 소비에 걸린 시간
    pub result_consumed_after: Option<Duration>,
    /// 데이터베이스
    pub database: Option<String>,
    /// 쿼리를 처리한 서버
    pub server: ServerAddress,
    /// 알림
    pub notifications: Vec<Notification>,
    /// auto-commit 쿼리의 북마크
    pub bookmark: Option<Bookmark>,
}

impl ResultSummary {
    fn new(
        query: Query,
        server: ServerAddress,
        available_after: Option<i64>,
        database: Option<&str>,
        metadata: &SuccessMessage,
    ) -> Self {
        Self {
            query,
            query_type: metadata.query_type().and_then(QueryType::from_wire),
            counters: metadata.stats().map(QueryStats::from_map).unwrap_or_default(),
            result_available_after: available_after.map(millis),
            result_consumed_after: metadata.result_consumed_after().map(millis),
            database: metadata.db().or(database).map(String::from),
            server,
            notifications: Notification::list_from(metadata.get("notifications")),
            bookmark: metadata.bookmark().map(Bookmark::new),
        }
    }
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

// ============================================================================
// Cursor - 결과 커서
// ============================================================================

/// 쿼리 결과 커서
///
/// 세션(또는 트랜잭션)을 빌리고 있으므로 커서가 살아 있는 동안 다른 쿼리는
/// 실행할 수 없습니다. 다 읽지 않고 드롭하면 남은 레코드는 다음 작업 전에 버려집니다.
pub struct Cursor<'a> {
    session: &'a mut Session,
    keys: Arc<[String]>,
    buffer: VecDeque<Record>,
    streaming: bool,
    summary: Option<ResultSummary>,
    query: Query,
    autocommit: bool,
    fetch_size: i64,
    server: ServerAddress,
    available_after: Option<i64>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(session: &'a mut Session, query: Query, run: &SuccessMessage, autocommit: bool) -> Self {
        let server = session
            .lease
            .as_ref()
            .map(|lease| lease.address().clone())
            .unwrap_or_default();
        let fetch_size = session.fetch_size();
        Self {
            session,
            keys: run.fields().into(),
            buffer: VecDeque::new(),
            streaming: true,
            summary: None,
            query,
            autocommit,
            fetch_size,
            server,
            available_after: run.result_available_after(),
        }
    }

    /// 컬럼 키
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// 다음 레코드
    ///
    /// 버퍼가 비면 서버에서 다음 묶음을 PULL합니다.
    pub async fn next(&mut self) -> DriverResult<Option<Record>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if !self.streaming {
                return Ok(None);
            }
            self.fetch().await?;
        }
    }

    /// 정확히 한 개의 레코드
    pub async fn single(&mut self) -> DriverResult<Record> {
        let record = self
            .next()
            .await?
            .ok_or_else(|| DriverError::session("Expected exactly one record, got none"))?;
        if self.next().await?.is_some() {
            self.consume().await?;
            return Err(DriverError::session("Expected exactly one record, got more"));
        }
        Ok(record)
    }

    /// 남은 레코드 전부
    pub async fn collect(&mut self) -> DriverResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// 남은 레코드를 버리고 요약 반환
    pub async fn consume(&mut self) -> DriverResult<ResultSummary> {
        self.buffer.clear();
        if self.streaming {
            let result = match self.session.lease.as_mut() {
                Some(lease) => lease.discard(-1).await,
                None => Err(detached()),
            };
            match result {
                Ok(metadata) => self.finish(&metadata),
                Err(e) => return Err(self.fail(e)),
            }
        }
        self.summary
            .clone()
            .ok_or_else(|| DriverError::session("Result summary is unavailable after a failure"))
    }

    /// 스트림이 끝났으면 요약
    pub fn summary(&self) -> Option<&ResultSummary> {
        self.summary.as_ref()
    }

    /// 더 읽을 레코드가 있는지
    pub fn is_open(&self) -> bool {
        self.streaming || !self.buffer.is_empty()
    }

    async fn fetch(&mut self) -> DriverResult<()> {
        let result = match self.session.lease.as_mut() {
            Some(lease) => lease.pull(self.fetch_size).await,
            None => Err(detached()),
        };
        let batch = match result {
            Ok(batch) => batch,
            Err(e) => return Err(self.fail(e)),
        };

        if batch.has_more && batch.records.is_empty() {
            let e = DriverError::protocol("PULL returned no records but reported more");
            return Err(self.fail(e));
        }

        let records = batch
            .records
            .into_iter()
            .map(|fields| Record::hydrate(self.keys.clone(), fields))
            .collect::<DriverResult<Vec<_>>>();
        match records {
            Ok(records) => self.buffer.extend(records),
            Err(e) => return Err(self.fail(e)),
        }

        if !batch.has_more {
            self.finish(&batch.summary);
        }
        Ok(())
    }

    fn finish(&mut self, metadata: &SuccessMessage) {
        self.streaming = false;
        let summary = ResultSummary::new(
            self.query.clone(),
            self.server.clone(),
            self.available_after,
            self.session.database(),
            metadata,
        );
        if self.autocommit {
            if let Some(bookmark) = metadata.bookmark() {
                self.session.adopt_bookmark(bookmark);
            }
            self.session.release();
        }
        self.summary = Some(summary);
    }

    fn fail(&mut self, error: DriverError) -> DriverError {
        self.streaming = false;
        self.buffer.clear();
        self.session.observe(&error, &self.server);
        if self.autocommit {
            self.session.release();
        } else {
            self.session.tx_state = Some(TransactionState::Failed);
        }
        error
    }
}

fn detached() -> DriverError {
    DriverError::session("Result is no longer attached to a connection")
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("keys", &self.keys)
            .field("buffered", &self.buffer.len())
            .field("streaming", &self.streaming)
            .field("autocommit", &self.autocommit)
            .field("server", &self.server)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::{BoltErrorCode, PackStreamValue};
    use crate::driver::simulator::{Reply, Simulator};
    use crate::driver::{Driver, SessionConfig};
    use std::collections::HashMap;

    fn rows(n: i64) -> Reply {
        Reply::rows(&["n"], (1..=n).map(|i| vec![PackStreamValue::Integer(i)]).collect())
    }

    #[test]
    fn test_query_type_from_wire() {
        assert_eq!(QueryType::from_wire("r"), Some(QueryType::ReadOnly));
        assert_eq!(QueryType::from_wire("rw"), Some(QueryType::ReadWrite));
        assert_eq!(QueryType::from_wire("s"), Some(QueryType::SchemaWrite));
        assert_eq!(QueryType::from_wire("x"), None);
    }

    #[test]
    fn test_summary_from_metadata() {
        let mut stats = HashMap::new();
        stats.insert("nodes-created".to_string(), PackStreamValue::Integer(3));
        let metadata = SuccessMessage::new()
            .add("type", "w")
            .add("t_last", 12i64)
            .add("db", "movies")
            .add("bookmark", "bm:9")
            .add("stats", PackStreamValue::Map(stats));

        let summary = ResultSummary::new(Query::new("CREATE (n)"), ServerAddress::new("a", 1), Some(4), None, &metadata);
        assert_eq!(summary.query_type, Some(QueryType::WriteOnly));
        assert_eq!(summary.counters.nodes_created, 3);
        assert!(summary.counters.contains_updates());
        assert_eq!(summary.result_available_after, Some(Duration::from_millis(4)));
        assert_eq!(summary.result_consumed_after, Some(Duration::from_millis(12)));
        assert_eq!(summary.database.as_deref(), Some("movies"));
        assert_eq!(summary.bookmark, Some(Bookmark::new("bm:9")));
    }

    #[tokio::test]
    async fn test_lazy_pull_in_fetch_size_batches() {
        let sim = Simulator::start().await;
        sim.on("UNWIND range(1, 5) AS n RETURN n", rows(5));
        let driver = Driver::with_config(sim.config()).unwrap();
        let mut session = driver
            .session(SessionConfig::builder().with_fetch_size(2).build())
            .unwrap();

        let mut cursor = session.run("UNWIND range(1, 5) AS n RETURN n", None).await.unwrap();
        let first = cursor.next().await.unwrap().unwrap();
        assert_eq!(first.get_int("n").unwrap(), 1);
        assert!(cursor.summary().is_none());

        let rest = cursor.collect().await.unwrap();
        assert_eq!(rest.len(), 4);
        assert!(!cursor.is_open());
        assert!(cursor.summary().is_some());
        drop(cursor);

        let pulls = sim.requests().iter().filter(|r| *r == "PULL").count();
        assert_eq!(pulls, 3);
    }

    #[tokio::test]
    async fn test_empty_batch_with_more_is_protocol_error() {
        let sim = Simulator::start().await;
        sim.on("UNWIND range(1, 5) AS n RETURN n", rows(5));
        sim.empty_pull();
        let driver = Driver::with_config(sim.config()).unwrap();
        let mut session = driver
            .session(SessionConfig::builder().with_fetch_size(2).build())
            .unwrap();

        let mut cursor = session.run("UNWIND range(1, 5) AS n RETURN n", None).await.unwrap();
        let err = cursor.next().await.unwrap_err();
        assert_eq!(err.kind(), "ProtocolError");
        assert!(!cursor.is_open());
        drop(cursor);

        let pulls = sim.requests().iter().filter(|r| *r == "PULL").count();
        assert_eq!(pulls, 1);
    }

    #[tokio::test]
    async fn test_consume_discards_rest() {
        let sim = Simulator::start().await;
        sim.on("UNWIND range(1, 5) AS n RETURN n", rows(5));
        let driver = Driver::with_config(sim.config()).unwrap();
        let mut session = driver
            .session(SessionConfig::builder().with_fetch_size(2).build())
            .unwrap();

        let mut cursor = session.run("UNWIND range(1, 5) AS n RETURN n", None).await.unwrap();
        cursor.next().await.unwrap();
        let summary = cursor.consume().await.unwrap();
        assert_eq!(summary.query.text, "UNWIND range(1, 5) AS n RETURN n");
        assert_eq!(&summary.server, sim.address());
        assert_eq!(summary.bookmark, Some(Bookmark::new("bm:1")));
        assert!(cursor.next().await.unwrap().is_none());
        drop(cursor);

        assert_eq!(sim.requests().last().map(String::as_str), Some("DISCARD"));
        assert_eq!(session.last_bookmark(), Some(Bookmark::new("bm:1")));
    }

    #[tokio::test]
    async fn test_single_rejects_more_than_one() {
        let sim = Simulator::start().await;
        sim.on("UNWIND range(1, 2) AS n RETURN n", rows(2));
        sim.on("MATCH (n) RETURN n", Reply::rows(&["n"], vec![]));
        let driver = Driver::with_config(sim.config()).unwrap();
        let mut session = driver.default_session().unwrap();

        let err = session
            .run("UNWIND range(1, 2) AS n RETURN n", None)
            .await
            .unwrap()
            .single()
            .await
            .unwrap_err();
        assert!(err.message().contains("more"));

        let err = session.run("MATCH (n) RETURN n", None).await.unwrap().single().await.unwrap_err();
        assert!(err.message().contains("none"));
    }

    #[tokio::test]
    async fn test_failure_while_streaming_inside_transaction() {
        let sim = Simulator::start().await;
        sim.on("UNWIND range(1, 5) AS n RETURN 1 / (n - 3)", rows(5));
        sim.fail_pull(BoltErrorCode::DEADLOCK_DETECTED, "deadlock");
        let driver = Driver::with_config(sim.config()).unwrap();
        let mut session = driver.default_session().unwrap();

        let mut tx = session.begin_transaction(None).await.unwrap();
        {
            let mut cursor = tx.run("UNWIND range(1, 5) AS n RETURN 1 / (n - 3)", None).await.unwrap();
            let err = cursor.next().await.unwrap_err();
            assert_eq!(err.kind(), "TransientError");
            assert!(!cursor.is_open());
        }
        assert_eq!(tx.state(), TransactionState::Failed);
        tx.rollback().await.unwrap();
    }
}
