//! Bolt protocol client implementation for the driver.
//!
//! Reuses the wire types from [`crate::bolt`] and adds the client-side
//! connection state, handshake and request/response pairing.
//!
//! # Architecture
//!
//! ```text
//! ConnectionPool
//!   └── BoltClient (HELLO, RUN/PULL, BEGIN/COMMIT, ROUTE)
//!         └── Connection (TCP or TLS + framing, FIFO of pending requests)
//!               └── BoltResponseCodec
//! ```

pub mod client;
pub mod connection;
mod tls;

pub use client::{BoltClient, PullBatch, ROUTING_PROCEDURE};
pub use connection::{Connection, ConnectionState, Transport};
