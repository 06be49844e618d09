//! # mcpool
//!
//! Pooled memcached connections bound to units of work.
//!
//! Opening a memcached session is expensive compared to using one, so many
//! short units of work (requests, jobs, tasks) share a small set of
//! connections. Each unit of work runs inside an [`ExecutionContext`] that
//! borrows at most one connection from a [`ConnectionPool`]; every
//! [`Memcached`] handle created in that context reuses it, and the connection
//! returns to the pool when the context ends.
//!
//! ## Example
//!
//! ```ignore
//! use mcpool::{ConnectionPool, Memcached, TextConnector, PoolConfig};
//! use std::sync::Arc;
//!
//! let pool = Arc::new(ConnectionPool::new(TextConnector::default(), PoolConfig::default()));
//!
//! pool.scope(|ctx| -> mcpool::Result<()> {
//!     let mc = Memcached::new(ctx, "127.0.0.1:11211")?;
//!     mc.set("k", "v", 0)?;
//!     assert_eq!(mc.get("k")?.as_deref(), Some("v"));
//!     Ok(())
//! })?;
//!
//! // During graceful shutdown
//! pool.shutdown();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   bind    ┌──────────────────┐  acquire  ┌────────────────┐
//! │ Memcached     │──────────▶│ ExecutionContext │──────────▶│ ConnectionPool │
//! │ (cache ops)   │           │ (one connection) │◀──────────│ (idle list)    │
//! └───────────────┘           └──────────────────┘  release  └───────┬────────┘
//!                                                                    │ connect
//!                                                            ┌───────▼────────┐
//!                                                            │ TextClient     │
//!                                                            │ (ASCII proto)  │
//!                                                            └────────────────┘
//! ```

// Modules
pub mod client;
pub mod config;
pub mod error;
pub mod memcached;
pub mod metrics;
pub mod pool;
pub mod prelude;
pub mod protocol;
pub mod resolver;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use client::{CacheClient, Connector, TextClient, TextConnector};
pub use config::{ClientConfig, Config, PoolConfig};
pub use error::{McPoolError, ProtocolError, Result};
pub use memcached::Memcached;
pub use pool::{ConnectionId, ConnectionPool, ExecutionContext, PooledConnection};
