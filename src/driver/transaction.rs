//! Transaction API
//!
//! 명시적 트랜잭션
//!
//! 트랜잭션은 세션을 가변으로 빌려 세션의 연결 위에서 동작합니다.
//! COMMIT/ROLLBACK이 끝나면 연결을 풀에 돌려줍니다. 커밋도 롤백도 하지 않고
//! 드롭하면 세션이 다음 작업 전에 롤백합니다.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::bolt::TransactionExtra;

use super::cursor::Cursor;
use super::error::{DriverError, DriverResult};
use super::session::{Bookmark, Query, Session};
use super::types::{into_parameters, Value};

// ============================================================================
// TransactionConfig - 트랜잭션 설정
// ============================================================================

/// 트랜잭션 설정
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionConfig {
    /// 서버 측 타임아웃
    pub timeout: Option<Duration>,
    /// 메타데이터
    pub metadata: HashMap<String, Value>,
}

impl TransactionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 타임아웃 설정
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 메타데이터 추가
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// TransactionState - 트랜잭션 상태
// ============================================================================

/// 트랜잭션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// BEGIN 응답 대기
    Pending,
    /// 활성 상태
    Active,
    /// 커밋됨
    Committed,
    /// 롤백됨
    RolledBack,
    /// 실패 (서버가 이미 트랜잭션을 버림)
    Failed,
}

impl TransactionState {
    /// 완료 상태 여부
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack | Self::Failed)
    }
}

// ============================================================================
// Transaction - 트랜잭션
// ============================================================================

/// 명시적 트랜잭션
pub struct Transaction<'s> {
    session: &'s mut Session,
    config: TransactionConfig,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(session: &'s mut Session, config: TransactionConfig) -> Self {
        Self { session, config }
    }

    /// 쿼리 실행
    ///
    /// 서버가 쿼리를 거부하면 트랜잭션은 Failed가 되고 롤백만 할 수 있습니다.
    pub async fn run(
        &mut self,
        query: impl Into<Query>,
        params: Option<HashMap<String, Value>>,
    ) -> DriverResult<Cursor<'_>> {
        self.ensure_active()?;

        let mut query = query.into();
        if let Some(p) = params {
            query = query.with_params(p);
        }
        let parameters = into_parameters(query.parameters.clone())?;

        let lease = self.session.lease_mut()?;
        let address = lease.address().clone();
        match lease.run(&query.text, parameters, TransactionExtra::default()).await {
            Ok(run) => Ok(Cursor::new(&mut *self.session, query, &run, false)),
            Err(e) => {
                self.session.tx_state = Some(TransactionState::Failed);
                self.session.observe(&e, &address);
                Err(e)
            }
        }
    }

    /// 커밋
    ///
    /// 서버가 준 북마크를 돌려주고 세션의 북마크로 채택합니다.
    pub async fn commit(self) -> DriverResult<Bookmark> {
        self.ensure_active()?;

        let lease = self.session.lease_mut()?;
        let address = lease.address().clone();
        let result = lease.commit().await;
        match result {
            Ok(bookmark) => {
                let bookmark = Bookmark::new(bookmark.unwrap_or_default());
                self.session.tx_state = Some(TransactionState::Committed);
                self.session.adopt_bookmark(bookmark.value());
                self.session.release();
                debug!(address = %address, bookmark = %bookmark, "Transaction committed");
                Ok(bookmark)
            }
            Err(e) => {
                self.session.tx_state = Some(TransactionState::Failed);
                self.session.observe(&e, &address);
                self.session.release();
                Err(e)
            }
        }
    }

    /// 롤백
    ///
    /// 이미 실패한 트랜잭션은 서버에 보낼 것이 없으므로 연결만 돌려줍니다.
    pub async fn rollback(self) -> DriverResult<()> {
        match self.state() {
            TransactionState::Active => {}
            TransactionState::Failed => {
                self.session.release();
                return Ok(());
            }
            _ => return Ok(()),
        }

        let lease = self.session.lease_mut()?;
        let address = lease.address().clone();
        let result = lease.rollback().await;
        match result {
            Ok(()) => {
                self.session.tx_state = Some(TransactionState::RolledBack);
                self.session.release();
                debug!(address = %address, "Transaction rolled back");
                Ok(())
            }
            Err(e) => {
                self.session.tx_state = Some(TransactionState::Failed);
                self.session.observe(&e, &address);
                self.session.release();
                Err(e)
            }
        }
    }

    /// 트랜잭션 닫기 (활성 상태면 롤백)
    pub async fn close(self) -> DriverResult<()> {
        self.rollback().await
    }

    /// 트랜잭션 상태
    pub fn state(&self) -> TransactionState {
        self.session.tx_state.unwrap_or(TransactionState::Pending)
    }

    /// 데이터베이스
    pub fn database(&self) -> Option<&str> {
        self.session.database()
    }

    /// 설정
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    fn ensure_active(&self) -> DriverResult<()> {
        match self.state() {
            TransactionState::Active => Ok(()),
            TransactionState::Pending => Err(DriverError::transaction("Transaction has not started")),
            TransactionState::Committed => Err(DriverError::transaction("Transaction already committed")),
            TransactionState::RolledBack => Err(DriverError::transaction("Transaction already rolled back")),
            TransactionState::Failed => Err(DriverError::transaction(
                "Transaction has failed and can only be rolled back",
            )),
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("database", &self.database())
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        // 비동기 롤백은 여기서 못 하므로 세션의 다음 작업으로 미룸
        if self.session.tx_state == Some(TransactionState::Active) {
            debug!("Transaction dropped while active; rolling back before the next session operation");
        }
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
    use crate::driver::Driver;

    #[test]
    fn test_transaction_config_builder() {
        let config = TransactionConfig::new()
            .with_timeout(Duration::from_secs(30))
            .with_metadata("app", "billing")
            .with_metadata("attempt", 1i64);

        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.metadata.len(), 2);
        assert_eq!(config.metadata.get("app"), Some(&Value::String("billing".into())));
    }

    #[test]
    fn test_transaction_state_terminated() {
        assert!(!TransactionState::Pending.is_terminated());
        assert!(!TransactionState::Active.is_terminated());
        assert!(TransactionState::Committed.is_terminated());
        assert!(TransactionState::RolledBack.is_terminated());
        assert!(TransactionState::Failed.is_terminated());
    }

    #[tokio::test]
    async fn test_begin_run_commit() {
        let sim = Simulator::start().await;
        sim.on("MATCH (n) RETURN n.name AS name", Reply::rows(&["name"], vec![vec!["Alice".into()], vec!["Bob".into()]]));
        let driver = Driver::with_config(sim.config()).unwrap();
        let mut session = driver.default_session().unwrap();

        let mut tx = session.begin_transaction(None).await.unwrap();
        assert_eq!(tx.state(), TransactionState::Active);
        let names: Vec<String> = tx
            .run("MATCH (n) RETURN n.name AS name", None)
            .await
            .unwrap()
            .collect()
            .await
            .unwrap()
            .iter()
            .map(|r| r.get_string("name").unwrap())
            .collect();
        assert_eq!(names, vec!["Alice", "Bob"]);

        let bookmark = tx.commit().await.unwrap();
        assert_eq!(bookmark.value(), "bm:1");
        assert_eq!(&sim.requests()[1..], &["BEGIN", "RUN MATCH (n) RETURN n.name AS name", "PULL", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_config_sent_with_begin() {
        let sim = Simulator::start().await;
        let driver = Driver::with_config(sim.config()).unwrap();
        let mut session = driver.default_session().unwrap();

        let config = TransactionConfig::new()
            .with_timeout(Duration::from_secs(5))
            .with_metadata("app", "billing");
        session.begin_transaction(Some(config)).await.unwrap().commit().await.unwrap();

        let extra = sim.last_begin().unwrap();
        assert_eq!(extra.tx_timeout, Some(Duration::from_secs(5)));
        assert_eq!(extra.tx_metadata.get("app"), Some(&PackStreamValue::String("billing".into())));
    }

    #[tokio::test]
    async fn test_failed_query_fails_transaction() {
        let sim = Simulator::start().await;
        sim.on("CREATE (", Reply::failure(BoltErrorCode::SYNTAX_ERROR, "Invalid input"));
        let driver = Driver::with_config(sim.config()).unwrap();
        let mut session = driver.default_session().unwrap();

        let mut tx = session.begin_transaction(None).await.unwrap();
        assert!(tx.run("CREATE (", None).await.is_err());
        assert_eq!(tx.state(), TransactionState::Failed);

        let err = tx.run("RETURN 1 AS x", None).await.unwrap_err();
        assert_eq!(err.kind(), "TransactionError");

        tx.rollback().await.unwrap();
        let requests = sim.requests();
        assert_eq!(requests.last().map(String::as_str), Some("RESET"));
        assert!(!requests.contains(&"ROLLBACK".to_string()));
        assert_eq!(driver.metrics().idle_connections, 1);
    }

    #[tokio::test]
    async fn test_commit_of_failed_transaction_rejected() {
        let sim = Simulator::start().await;
        sim.on("CREATE (", Reply::failure(BoltErrorCode::SYNTAX_ERROR, "Invalid input"));
        let driver = Driver::with_config(sim.config()).unwrap();
        let mut session = driver.default_session().unwrap();

        let mut tx = session.begin_transaction(None).await.unwrap();
        let _ = tx.run("CREATE (", None).await;
        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.kind(), "TransactionError");
        assert!(!sim.requests().contains(&"COMMIT".to_string()));
    }

    #[tokio::test]
    async fn test_failed_commit_marks_failed() {
        let sim = Simulator::start().await;
        sim.fail_commit(BoltErrorCode::TRANSACTION_TERMINATED, "terminated");
        let driver = Driver::with_config(sim.config()).unwrap();
        let mut session = driver.default_session().unwrap();

        let tx = session.begin_transaction(None).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.code(), Some(BoltErrorCode::TRANSACTION_TERMINATED));
        assert_eq!(session.tx_state, Some(TransactionState::Failed));
        assert!(session.last_bookmark().is_none());
    }
}
