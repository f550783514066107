//! 라우팅 모듈
//!
//! 클러스터 환경에서 자동 라우팅을 지원합니다.
//!
//! # 개요
//!
//! `neo4j://` 스킴을 쓰면 드라이버가 라우터에게 라우팅 테이블을 받아
//! 읽기 트랜잭션은 리더(reader) 서버로, 쓰기 트랜잭션은 라이터 서버로 보냅니다.
//! 테이블은 TTL이 지나거나, 필요한 역할이 비었거나, 라이터가
//! 더 이상 리더가 아니라고 응답하면 갱신됩니다.
//!
//! # 예시
//!
//! ```ignore
//! use graphwire::driver::{AccessMode, AuthToken, Driver, SessionConfig};
//!
//! let driver = Driver::new("neo4j://server1:7687,server2:7687", AuthToken::basic("neo4j", "secret"))?;
//!
//! // 읽기 세션 (reader 서버로 라우팅)
//! let session = driver.session(
//!     SessionConfig::builder()
//!         .with_default_access_mode(AccessMode::Read)
//!         .build(),
//! )?;
//! ```

mod policy;
mod router;
mod table;

pub use policy::{RoutingPolicy, ServerSelector};
pub use router::{AcquireRequest, Router};
pub use table::RoutingTable;
