//! Driver Module
//!
//! 클라이언트 드라이버
//!
//! # 구성
//!
//! - 드라이버 (Driver, DriverConfig, ServerAddress)
//! - Bolt 클라이언트 (BoltClient, Connection)
//! - 연결 풀 (ConnectionPool, PoolConfig)
//! - 라우팅 (Router, RoutingTable, RoutingPolicy)
//! - 세션 (Session, SessionConfig, Bookmark)
//! - 트랜잭션 (Transaction, TransactionConfig)
//! - 결과 (Cursor, Record, ResultSummary)
//! - 재시도 (RetryPolicy)
//!
//! # Example
//!
//! ```ignore
//! use graphwire::driver::{AuthToken, Driver, SessionConfig};
//! use graphwire::params;
//!
//! // 단일 서버 드라이버 (bolt://)
//! let driver = Driver::new("bolt://localhost:7687", AuthToken::basic("neo4j", "password"))?;
//! let mut session = driver.session(SessionConfig::default())?;
//!
//! // 쿼리 실행
//! let mut cursor = session.run("MATCH (n) RETURN n LIMIT 10", None).await?;
//! while let Some(record) = cursor.next().await? {
//!     println!("{:?}", record);
//! }
//!
//! // 트랜잭션
//! let mut tx = session.begin_transaction(None).await?;
//! tx.run("CREATE (n:Person {name: $name})", Some(params! {"name" => "Alice"})).await?;
//! let bookmark = tx.commit().await?;
//!
//! session.close().await?;
//! driver.close().await?;
//! ```

pub mod bolt;
pub mod routing;
mod cursor;
mod driver;
mod error;
mod pool;
mod record;
mod retry;
mod session;
#[cfg(test)]
mod simulator;
mod transaction;
mod types;

// Re-exports
pub use crate::bolt::{AccessMode, AuthToken};
pub use bolt::{BoltClient, ConnectionState};
pub use cursor::{Cursor, QueryType, ResultSummary};
pub use driver::{
    Driver, DriverConfig, DriverConfigBuilder, DriverMetrics, ServerAddress, ServerInfo, TrustStrategy,
    DEFAULT_PORT,
};
pub use error::{DriverError, DriverResult};
pub use pool::{ConnectionPool, PoolConfig, PoolMetrics, PooledConnection};
pub use record::Record;
pub use retry::RetryPolicy;
pub use session::{Bookmark, Query, Session, SessionConfig, SessionConfigBuilder};
pub use transaction::{Transaction, TransactionConfig, TransactionState};
pub use types::{Node, Path, Relationship, Segment, Structure, UnboundRelationship, Value};

/// 파라미터 맵 생성 매크로
#[macro_export]
macro_rules! params {
    () => {
        std::collections::HashMap::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = std::collections::HashMap::new();
        $(
            map.insert($key.into(), $crate::driver::Value::from($value));
        )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_macro() {
        let params: std::collections::HashMap<String, Value> = params! {
            "name" => "Alice",
            "age" => 30i64,
        };
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("age"), Some(&Value::Integer(30)));
    }
}
