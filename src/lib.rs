//! # graphwire
//!
//! An async client for graph databases that speak the Bolt protocol.
//!
//! ## Features
//!
//! - **Bolt 4.x / 5.x** - PackStream values, chunked framing and version negotiation
//! - **Async/Await** - Built on Tokio
//! - **Connection Pooling** - Per-address pools with a hard capacity ceiling
//! - **Routing** - `neo4j://` cluster routing with per-database routing tables
//! - **Transactions** - Auto-commit queries, explicit transactions and retried transaction functions
//! - **Causal Consistency** - Bookmarks chained across transactions of a session
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use graphwire::{params, AuthToken, Driver, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = Driver::new("bolt://localhost:7687", AuthToken::basic("neo4j", "password"))?;
//!
//!     let session_config = SessionConfig::builder()
//!         .with_database("neo4j")
//!         .with_write_access()
//!         .build();
//!     let mut session = driver.session(session_config)?;
//!
//!     let mut cursor = session
//!         .run("CREATE (n:Person {name: $name}) RETURN n", Some(params! {"name" => "Alice"}))
//!         .await?;
//!     while let Some(record) = cursor.next().await? {
//!         println!("{:?}", record);
//!     }
//!
//!     session.close().await?;
//!     driver.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Transactions
//!
//! ```rust,no_run
//! # use graphwire::{AuthToken, Driver, SessionConfig};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let driver = Driver::new("bolt://localhost:7687", AuthToken::basic("u", "p"))?;
//! # let mut session = driver.session(SessionConfig::default())?;
//! let mut tx = session.begin_transaction(None).await?;
//! tx.run("CREATE (n:Node {id: 1})", None).await?.consume().await?;
//! tx.run("CREATE (n:Node {id: 2})", None).await?.consume().await?;
//! let bookmark = tx.commit().await?;
//! println!("committed at {}", bookmark);
//! # Ok(())
//! # }
//! ```
//!
//! ## Transaction Functions
//!
//! The closure is retried on transient failures and is committed when it returns `Ok`:
//!
//! ```rust,no_run
//! # use graphwire::{AuthToken, Driver, SessionConfig};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let driver = Driver::new("bolt://localhost:7687", AuthToken::basic("u", "p"))?;
//! # let mut session = driver.session(SessionConfig::default())?;
//! let created = session
//!     .execute_write(|tx| {
//!         Box::pin(async move {
//!             let summary = tx.run("CREATE (n:Node)", None).await?.consume().await?;
//!             Ok(summary.counters.nodes_created)
//!         })
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use graphwire::{AuthToken, DriverConfig};
//! use std::time::Duration;
//!
//! let config = DriverConfig::builder("neo4j://localhost:7687", AuthToken::basic("u", "p"))
//!     .unwrap()
//!     .with_max_pool_size(50)
//!     .with_connection_timeout(Duration::from_secs(10))
//!     .with_fetch_size(500)
//!     .build();
//! assert_eq!(config.max_pool_size, 50);
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - Driver, session, transaction and result types
//! - [`bolt`] - Wire-level Bolt protocol implementation

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bolt;
pub mod driver;

// Re-exports for convenience
pub use driver::{
    AccessMode, AuthToken, Bookmark, Cursor, Driver, DriverConfig, DriverConfigBuilder, DriverError,
    DriverMetrics, DriverResult, Query, Record, ResultSummary, ServerAddress, ServerInfo, Session,
    SessionConfig, SessionConfigBuilder, Transaction, TransactionConfig, TrustStrategy, Value,
};

pub use bolt::{BoltError, BoltVersion, PackStreamValue};

/// Config alias for convenience
pub type Config = DriverConfig;
