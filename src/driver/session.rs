//! Session
//!
//! 세션 관리
//!
//! 세션은 한 번에 하나의 연결만 빌립니다. 새 쿼리나 트랜잭션을 시작하기 전에
//! 이전 작업(열린 결과 스트림, 끝나지 않은 트랜잭션)을 먼저 정리하고,
//! 서버가 돌려준 북마크를 이어받아 다음 작업에 실어 보냅니다.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::bolt::{AccessMode, TransactionExtra};

use super::cursor::Cursor;
use super::driver::{DriverConfig, ServerAddress};
use super::error::{DriverError, DriverResult};
use super::pool::PooledConnection;
use super::retry::RetryPolicy;
use super::routing::{AcquireRequest, Router};
use super::transaction::{Transaction, TransactionConfig, TransactionState};
use super::types::{into_parameters, Value};

// ============================================================================
// Bookmark - 북마크
// ============================================================================

/// 인과적 일관성 북마크
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bookmark {
    value: String,
}

impl Bookmark {
    /// 새 북마크 생성
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    /// 북마크 값
    pub fn value(&self) -> &str {
        &self.value
    }

    /// 빈 북마크 여부
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl std::fmt::Display for Bookmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl From<String> for Bookmark {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Bookmark {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// SessionConfig - 세션 설정
// ============================================================================

/// 세션 설정
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// 데이터베이스 이름 (None이면 서버 기본 데이터베이스)
    pub database: Option<String>,
    /// 기본 접근 모드
    pub default_access_mode: AccessMode,
    /// 시작 북마크
    pub bookmarks: Vec<Bookmark>,
    /// PULL 한 번에 받을 레코드 수 (None이면 드라이버 설정)
    pub fetch_size: Option<i64>,
    /// 임퍼손트 사용자
    pub impersonated_user: Option<String>,
}

impl SessionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 시작
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            database: None,
            default_access_mode: AccessMode::Write,
            bookmarks: Vec::new(),
            fetch_size: None,
            impersonated_user: None,
        }
    }
}

// ============================================================================
// SessionConfigBuilder - 세션 설정 빌더
// ============================================================================

/// 세션 설정 빌더
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// 새 빌더 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 데이터베이스 설정
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.config.database = Some(database.into());
        self
    }

    /// 접근 모드 설정
    pub fn with_default_access_mode(mut self, mode: AccessMode) -> Self {
        self.config.default_access_mode = mode;
        self
    }

    /// 읽기 모드로 설정
    pub fn with_read_access(self) -> Self {
        self.with_default_access_mode(AccessMode::Read)
    }

    /// 쓰기 모드로 설정
    pub fn with_write_access(self) -> Self {
        self.with_default_access_mode(AccessMode::Write)
    }

    /// 북마크 설정
    pub fn with_bookmarks(mut self, bookmarks: Vec<Bookmark>) -> Self {
        self.config.bookmarks = bookmarks;
        self
    }

    /// 북마크 추가
    pub fn with_bookmark(mut self, bookmark: Bookmark) -> Self {
        self.config.bookmarks.push(bookmark);
        self
    }

    /// Fetch Size 설정 (-1이면 한 번에 전부)
    pub fn with_fetch_size(mut self, size: i64) -> Self {
        self.config.fetch_size = Some(size);
        self
    }

    /// 임퍼손트 사용자 설정
    pub fn with_impersonated_user(mut self, user: impl Into<String>) -> Self {
        self.config.impersonated_user = Some(user.into());
        self
    }

    /// 빌드
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

// ============================================================================
// Query - 쿼리
// ============================================================================

/// 쿼리
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// 쿼리 텍스트
    pub text: String,
    /// 파라미터
    pub parameters: HashMap<String, Value>,
}

impl Query {
    /// 새 쿼리 생성
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: HashMap::new(),
        }
    }

    /// 파라미터 추가
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// 파라미터들 추가
    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.parameters.extend(params);
        self
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// Session - 세션
// ============================================================================

/// 데이터베이스 세션
///
/// 동시에 쓰지 않습니다. 결과 커서와 트랜잭션은 세션을 가변으로 빌리므로
/// 한 번에 하나의 작업만 진행됩니다.
pub struct Session {
    driver_config: Arc<DriverConfig>,
    router: Arc<Router>,
    config: SessionConfig,
    /// 현재 빌린 연결
    pub(crate) lease: Option<PooledConnection>,
    /// 다음 작업에 보낼 북마크
    bookmarks: Vec<Bookmark>,
    /// 명시적 트랜잭션 상태
    pub(crate) tx_state: Option<TransactionState>,
    open: bool,
}

impl Session {
    /// 새 세션 생성
    pub(crate) fn new(driver_config: Arc<DriverConfig>, router: Arc<Router>, config: SessionConfig) -> Self {
        let bookmarks = config
            .bookmarks
            .iter()
            .filter(|b| !b.is_empty())
            .cloned()
            .collect();
        Self {
            driver_config,
            router,
            config,
            lease: None,
            bookmarks,
            tx_state: None,
            open: true,
        }
    }

    /// 쿼리 실행 (auto-commit)
    ///
    /// 반환된 커서가 끝까지 소비되면 연결을 풀에 돌려주고 북마크를 갱신합니다.
    pub async fn run(
        &mut self,
        query: impl Into<Query>,
        params: Option<HashMap<String, Value>>,
    ) -> DriverResult<Cursor<'_>> {
        self.ensure_open()?;
        self.settle().await;

        let mut query = query.into();
        if let Some(p) = params {
            query = query.with_params(p);
        }
        let parameters = into_parameters(query.parameters.clone())?;
        let mode = self.config.default_access_mode;
        let extra = self.transaction_extra(mode, None)?;

        let mut lease = self.acquire(mode).await?;
        debug!(address = %lease.address(), query = %query.text, "Running auto-commit query");
        match lease.run(&query.text, parameters, extra).await {
            Ok(run) => {
                self.lease = Some(lease);
                Ok(Cursor::new(self, query, &run, true))
            }
            Err(e) => {
                self.observe(&e, lease.address());
                Err(e)
            }
        }
    }

    /// 트랜잭션 시작 (기본 접근 모드)
    pub async fn begin_transaction(&mut self, config: Option<TransactionConfig>) -> DriverResult<Transaction<'_>> {
        let mode = self.config.default_access_mode;
        self.begin_with_mode(mode, config).await
    }

    /// 트랜잭션 시작
    pub async fn begin_with_mode(
        &mut self,
        mode: AccessMode,
        config: Option<TransactionConfig>,
    ) -> DriverResult<Transaction<'_>> {
        self.ensure_open()?;
        self.settle().await;

        let config = config.unwrap_or_default();
        let extra = self.transaction_extra(mode, Some(&config))?;
        let mut lease = self.acquire(mode).await?;

        self.tx_state = Some(TransactionState::Pending);
        if let Err(e) = lease.begin(extra).await {
            self.tx_state = None;
            self.observe(&e, lease.address());
            return Err(e);
        }
        debug!(address = %lease.address(), mode = mode.as_str(), "Transaction started");
        self.tx_state = Some(TransactionState::Active);
        self.lease = Some(lease);
        Ok(Transaction::new(self, config))
    }

    /// 읽기 트랜잭션 함수 (재시도 포함)
    ///
    /// ```ignore
    /// let count = session
    ///     .execute_read(|tx| Box::pin(async move {
    ///         let mut cursor = tx.run("MATCH (n) RETURN count(n) AS c", None).await?;
    ///         cursor.single().await?.get_int("c")
    ///     }))
    ///     .await?;
    /// ```
    pub async fn execute_read<F, T>(&mut self, work: F) -> DriverResult<T>
    where
        F: for<'t, 's> FnMut(&'t mut Transaction<'s>) -> BoxFuture<'t, DriverResult<T>>,
    {
        self.execute(AccessMode::Read, work).await
    }

    /// 쓰기 트랜잭션 함수 (재시도 포함)
    pub async fn execute_write<F, T>(&mut self, work: F) -> DriverResult<T>
    where
        F: for<'t, 's> FnMut(&'t mut Transaction<'s>) -> BoxFuture<'t, DriverResult<T>>,
    {
        self.execute(AccessMode::Write, work).await
    }

    /// 트랜잭션 함수 실행
    ///
    /// 실패가 재시도 가능하면 지수 백오프 후 새 트랜잭션으로 다시 시도합니다.
    async fn execute<F, T>(&mut self, mode: AccessMode, mut work: F) -> DriverResult<T>
    where
        F: for<'t, 's> FnMut(&'t mut Transaction<'s>) -> BoxFuture<'t, DriverResult<T>>,
    {
        self.ensure_open()?;
        let policy = RetryPolicy::from_config(&self.driver_config);
        let mut attempt = 0;

        loop {
            let error = match self.attempt(mode, &mut work).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if !policy.should_retry(&error, attempt) {
                return Err(error);
            }

            let delay = policy.delay(attempt);
            attempt += 1;
            warn!(
                attempt,
                delay = ?delay,
                kind = error.kind(),
                error = %error,
                "Transaction function failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// 한 번의 시도: BEGIN, 작업, COMMIT (실패 시 ROLLBACK)
    async fn attempt<F, T>(&mut self, mode: AccessMode, work: &mut F) -> DriverResult<T>
    where
        F: for<'t, 's> FnMut(&'t mut Transaction<'s>) -> BoxFuture<'t, DriverResult<T>>,
    {
        let mut tx = self.begin_with_mode(mode, None).await?;
        match work(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    debug!(error = %rollback_error, "Rollback after failed transaction function failed");
                }
                Err(error)
            }
        }
    }

    /// 마지막 북마크
    pub fn last_bookmark(&self) -> Option<Bookmark> {
        self.bookmarks.last().cloned()
    }

    /// 다음 작업에 보낼 북마크들
    pub fn last_bookmarks(&self) -> Vec<Bookmark> {
        self.bookmarks.clone()
    }

    /// 세션 닫기
    ///
    /// 끝나지 않은 트랜잭션은 롤백하고, 열린 스트림은 버린 뒤 연결을 돌려줍니다.
    pub async fn close(&mut self) -> DriverResult<()> {
        if !self.open {
            return Ok(());
        }
        self.settle().await;
        self.open = false;
        debug!(database = ?self.config.database, "Session closed");
        Ok(())
    }

    /// 열린 상태 확인
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// 세션 설정
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 대상 데이터베이스
    pub fn database(&self) -> Option<&str> {
        self.config.database.as_deref()
    }

    /// 커서가 사용할 PULL 크기
    pub(crate) fn fetch_size(&self) -> i64 {
        self.config.fetch_size.unwrap_or(self.driver_config.fetch_size)
    }

    /// 빌린 연결
    pub(crate) fn lease_mut(&mut self) -> DriverResult<&mut PooledConnection> {
        self.lease
            .as_mut()
            .ok_or_else(|| DriverError::session("Session holds no connection"))
    }

    /// 빌린 연결 반납
    pub(crate) fn release(&mut self) {
        self.lease = None;
    }

    /// 서버가 준 북마크 채택 (빈 값은 무시)
    pub(crate) fn adopt_bookmark(&mut self, value: &str) {
        if !value.is_empty() {
            self.bookmarks = vec![Bookmark::new(value)];
        }
    }

    /// 실패를 라우터에 알림
    pub(crate) fn observe(&self, error: &DriverError, address: &ServerAddress) {
        if error.is_not_a_leader() {
            self.router.on_not_a_leader(self.database(), address);
        } else if matches!(error, DriverError::Connection(_)) {
            self.router.forget(address);
        }
    }

    /// 이전 작업 정리
    ///
    /// 활성 트랜잭션은 롤백하고(실패하면 연결 폐기), 열린 auto-commit 스트림은
    /// DISCARD로 끝낸 뒤 북마크를 이어받습니다.
    async fn settle(&mut self) {
        let state = self.tx_state.take();
        let Some(mut lease) = self.lease.take() else {
            return;
        };

        match state {
            Some(TransactionState::Active) | Some(TransactionState::Pending) => {
                if let Err(e) = lease.rollback().await {
                    warn!(address = %lease.address(), error = %e, "Rollback of unfinished transaction failed");
                    lease.mark_defunct();
                }
            }
            Some(_) => {}
            None if lease.has_open_stream() => match lease.discard(-1).await {
                Ok(summary) => {
                    if let Some(bookmark) = summary.bookmark() {
                        self.adopt_bookmark(bookmark);
                    }
                }
                Err(e) => {
                    debug!(address = %lease.address(), error = %e, "Discarding open result failed");
                    self.observe(&e, lease.address());
                }
            },
            None => {}
        }
    }

    fn transaction_extra(&self, mode: AccessMode, config: Option<&TransactionConfig>) -> DriverResult<TransactionExtra> {
        let mut extra = TransactionExtra {
            bookmarks: self.bookmark_values(),
            mode,
            db: self.config.database.clone(),
            imp_user: self.config.impersonated_user.clone(),
            ..TransactionExtra::default()
        };
        if let Some(config) = config {
            extra.tx_timeout = config.timeout;
            extra.tx_metadata = into_parameters(config.metadata.clone())?;
        }
        Ok(extra)
    }

    async fn acquire(&self, mode: AccessMode) -> DriverResult<PooledConnection> {
        let bookmarks = self.bookmark_values();
        let request = AcquireRequest {
            database: self.database(),
            mode,
            bookmarks: &bookmarks,
            impersonated_user: self.config.impersonated_user.as_deref(),
        };
        self.router.acquire(request).await
    }

    fn bookmark_values(&self) -> Vec<String> {
        self.bookmarks.iter().map(|b| b.value().to_string()).collect()
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(DriverError::session("Session is closed"))
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.config.database)
            .field("mode", &self.config.default_access_mode)
            .field("bookmarks", &self.bookmarks)
            .field("transaction", &self.tx_state)
            .field("open", &self.open)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::{BoltErrorCode, PackStreamValue, RoutingInfo, ServerRole};
    use crate::driver::simulator::{Reply, Simulator};
    use crate::driver::Driver;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn driver_for(sim: &Simulator) -> Driver {
        Driver::with_config(sim.config()).unwrap()
    }

    #[test]
    fn test_bookmark() {
        let bookmark = Bookmark::new("FB:kcwQ");
        assert_eq!(bookmark.value(), "FB:kcwQ");
        assert_eq!(bookmark.to_string(), "FB:kcwQ");
        assert!(!bookmark.is_empty());
        assert!(Bookmark::from("").is_empty());
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::builder()
            .with_database("movies")
            .with_fetch_size(500)
            .with_read_access()
            .with_bookmark(Bookmark::new("b1"))
            .with_impersonated_user("alice")
            .build();

        assert_eq!(config.database.as_deref(), Some("movies"));
        assert_eq!(config.fetch_size, Some(500));
        assert_eq!(config.default_access_mode, AccessMode::Read);
        assert_eq!(config.bookmarks.len(), 1);
        assert_eq!(config.impersonated_user.as_deref(), Some("alice"));
        assert_eq!(SessionConfig::default().default_access_mode, AccessMode::Write);
    }

    #[test]
    fn test_query() {
        let query = Query::new("MATCH (n) WHERE n.name = $name RETURN n")
            .with_param("name", "Alice")
            .with_param("age", 30i64);

        assert_eq!(query.parameters.len(), 2);
        assert_eq!(query.parameters.get("name"), Some(&Value::String("Alice".into())));
        let q: Query = String::from("RETURN 2").into();
        assert_eq!(q.text, "RETURN 2");
    }

    #[tokio::test]
    async fn test_auto_commit_returns_connection_and_bookmark() {
        let sim = Simulator::start().await;
        let driver = driver_for(&sim);
        let mut session = driver.default_session().unwrap();

        let mut cursor = session.run("RETURN 1 AS x", None).await.unwrap();
        assert_eq!(cursor.keys(), &["x".to_string()]);
        let record = cursor.single().await.unwrap();
        assert_eq!(record.get_int("x").unwrap(), 1);
        drop(cursor);

        assert!(session.lease.is_none());
        assert_eq!(session.last_bookmark(), Some(Bookmark::new("bm:1")));
        assert_eq!(driver.metrics().idle_connections, 1);
    }

    #[tokio::test]
    async fn test_unconsumed_result_discarded_before_next_query() {
        let sim = Simulator::start().await;
        sim.on("UNWIND range(1, 3) AS n RETURN n", Reply::rows(&["n"], (1..=3i64).map(|n| vec![n.into()]).collect()));
        let driver = driver_for(&sim);
        let mut session = driver.default_session().unwrap();

        session.run("UNWIND range(1, 3) AS n RETURN n", None).await.unwrap();
        session.run("RETURN 1 AS x", None).await.unwrap().consume().await.unwrap();

        let requests = sim.requests();
        assert_eq!(&requests[1..], &["RUN UNWIND range(1, 3) AS n RETURN n", "DISCARD", "RUN RETURN 1 AS x", "DISCARD"]);
        assert_eq!(session.last_bookmark(), Some(Bookmark::new("bm:2")));
        assert_eq!(sim.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_bookmarks_flow_into_next_transaction() {
        let sim = Simulator::start().await;
        let driver = driver_for(&sim);
        let mut session = driver
            .session(SessionConfig::builder().with_bookmark(Bookmark::new("bm:0")).build())
            .unwrap();

        let mut tx = session.begin_transaction(None).await.unwrap();
        tx.run("CREATE (n)", None).await.unwrap().consume().await.unwrap();
        let bookmark = tx.commit().await.unwrap();
        assert_eq!(bookmark.value(), "bm:1");

        session.begin_transaction(None).await.unwrap().commit().await.unwrap();
        assert_eq!(sim.begin_bookmarks(), vec![vec!["bm:0".to_string()], vec!["bm:1".to_string()]]);
        assert_eq!(session.last_bookmarks(), vec![Bookmark::new("bm:2")]);
    }

    #[tokio::test]
    async fn test_unfinished_transaction_rolled_back_on_close() {
        let sim = Simulator::start().await;
        let driver = driver_for(&sim);
        let mut session = driver.default_session().unwrap();

        {
            let mut tx = session.begin_transaction(None).await.unwrap();
            tx.run("CREATE (n)", None).await.unwrap();
        }
        session.close().await.unwrap();

        assert!(sim.requests().ends_with(&["ROLLBACK".to_string()]));
        assert_eq!(session.run("RETURN 1", None).await.unwrap_err().kind(), "SessionError");
        assert_eq!(driver.metrics().idle_connections, 1);
    }

    #[tokio::test]
    async fn test_execute_write_retries_transient_failure() {
        let sim = Simulator::start().await;
        sim.once("CREATE (n)", Reply::failure(BoltErrorCode::DEADLOCK_DETECTED, "deadlock"));
        let driver = driver_for(&sim);
        let mut session = driver.default_session().unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let created = session
            .execute_write(move |tx| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let summary = tx.run("CREATE (n)", None).await?.consume().await?;
                    Ok(summary.counters.nodes_created)
                })
            })
            .await
            .unwrap();

        assert_eq!(created, 0);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(session.last_bookmark(), Some(Bookmark::new("bm:1")));
    }

    #[tokio::test]
    async fn test_execute_read_gives_up_after_max_retries() {
        let sim = Simulator::start().await;
        sim.on("RETURN 1", Reply::failure(BoltErrorCode::DATABASE_UNAVAILABLE, "down"));
        let mut config = sim.config();
        config.max_retry_count = 2;
        let driver = Driver::with_config(config).unwrap();
        let mut session = driver.default_session().unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let err = session
            .execute_read(move |tx| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tx.run("RETURN 1", None).await?.consume().await?;
                    Ok(())
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "TransientError");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_write_does_not_retry_client_error() {
        let sim = Simulator::start().await;
        sim.on("RETURN", Reply::failure(BoltErrorCode::SYNTAX_ERROR, "Invalid input"));
        let driver = driver_for(&sim);
        let mut session = driver.default_session().unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let err = session
            .execute_write(move |tx| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tx.run("RETURN", None).await?;
                    Ok(())
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some(BoltErrorCode::SYNTAX_ERROR));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_query_leaves_connection_reusable() {
        let sim = Simulator::start().await;
        sim.on("RETURN", Reply::failure(BoltErrorCode::SYNTAX_ERROR, "Invalid input"));
        let driver = driver_for(&sim);
        let mut session = driver.default_session().unwrap();

        let err = session.run("RETURN", None).await.unwrap_err();
        assert_eq!(err.kind(), "ClientError");
        assert!(session.lease.is_none());

        let value = session.run("RETURN 1 AS x", None).await.unwrap().single().await.unwrap();
        assert_eq!(value.get_int("x").unwrap(), 1);
        assert_eq!(sim.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_not_a_leader_during_write_refreshes_routing() {
        let seed = Simulator::start().await;
        let leader = Simulator::start().await;
        let seed_addr = seed.address().to_string();
        let leader_addr = leader.address().to_string();
        seed.push_route(
            RoutingInfo::new(300, None)
                .with_servers(ServerRole::Route, &[&seed_addr])
                .with_servers(ServerRole::Write, &[&seed_addr])
                .with_servers(ServerRole::Read, &[&seed_addr]),
        );
        seed.push_route(
            RoutingInfo::new(300, None)
                .with_servers(ServerRole::Route, &[&seed_addr])
                .with_servers(ServerRole::Write, &[&leader_addr])
                .with_servers(ServerRole::Read, &[&seed_addr]),
        );
        seed.on("CREATE (n)", Reply::failure(BoltErrorCode::NOT_A_LEADER, "not a leader"));

        let config = crate::driver::DriverConfig::builder(&format!("neo4j://{}", seed_addr), crate::bolt::AuthToken::none())
            .unwrap()
            .with_initial_retry_delay(Duration::from_millis(1))
            .build();
        let driver = Driver::with_config(config).unwrap();
        let mut session = driver.default_session().unwrap();
        session
            .execute_write(|tx| {
                Box::pin(async move {
                    tx.run("CREATE (n)", None).await?.consume().await?;
                    Ok(())
                })
            })
            .await
            .unwrap();

        assert!(leader.requests().contains(&"RUN CREATE (n)".to_string()));
        let table = driver.routing_table(None).unwrap();
        assert_eq!(table.writers, vec![leader.address().clone()]);
    }

    #[tokio::test]
    async fn test_rollback_returns_ready_connection() {
        let sim = Simulator::start().await;
        let driver = driver_for(&sim);
        let config = SessionConfig::builder().with_bookmark(Bookmark::new("bm:seed")).build();
        let mut session = driver.session(config).unwrap();

        let mut tx = session.begin_transaction(None).await.unwrap();
        tx.run("CREATE (a)", None).await.unwrap().consume().await.unwrap();
        tx.run("CREATE (b)", None).await.unwrap().consume().await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(session.tx_state, Some(TransactionState::RolledBack));
        assert!(session.lease.is_none());
        assert_eq!(session.last_bookmarks(), vec![Bookmark::new("bm:seed")]);

        let requests = sim.requests();
        assert_eq!(requests.last().map(String::as_str), Some("ROLLBACK"));
        assert!(!requests.contains(&"COMMIT".to_string()));

        let metrics = driver.metrics();
        assert_eq!(metrics.idle_connections, 1);
        assert_eq!(metrics.in_use_connections, 0);

        session.begin_transaction(None).await.unwrap().commit().await.unwrap();
        assert_eq!(sim.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_parameters_reach_server() {
        let sim = Simulator::start().await;
        let driver = driver_for(&sim);
        let mut session = driver.default_session().unwrap();

        let mut params = HashMap::new();
        params.insert("name".to_string(), Value::from("Alice"));
        session
            .run(Query::new("CREATE (p:Person {name: $name})").with_param("age", 42i64), Some(params))
            .await
            .unwrap()
            .consume()
            .await
            .unwrap();

        let sent = sim.last_parameters();
        assert_eq!(sent.get("name"), Some(&PackStreamValue::String("Alice".into())));
        assert_eq!(sent.get("age"), Some(&PackStreamValue::Integer(42)));
    }

    #[tokio::test]
    async fn test_graph_values_are_rejected_as_parameters() {
        let sim = Simulator::start().await;
        let driver = driver_for(&sim);
        let mut session = driver.default_session().unwrap();
        let node = crate::driver::Node::new(1, vec!["Person"], HashMap::new());

        let query = Query::new("RETURN $n").with_param("n", Value::Node(node));
        let err = session.run(query, None).await.unwrap_err();
        assert_eq!(err.kind(), "EncodingError");
        assert_eq!(sim.connection_count(), 0);
    }
}
