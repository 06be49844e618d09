//! Prelude module for common imports.
//!
//! This module re-exports commonly used types and traits for convenience.
//!
//! # Usage
//!
//! ```ignore
//! use mcpool::prelude::*;
//! ```

// Error types
pub use crate::error::{McPoolError, ProtocolError, Result};

// Configuration
pub use crate::config::{ClientConfig, Config, PoolConfig, WorkloadConfig};

// Client
pub use crate::client::{CacheClient, Connector, TextClient, TextConnector};

// Pool
pub use crate::pool::global::{self, DefaultPool};
pub use crate::pool::{ConnectionId, ConnectionPool, ExecutionContext};

// Cache handle
pub use crate::memcached::Memcached;

// Address parsing
pub use crate::resolver::{DEFAULT_ADDRESS, Endpoint, resolve};

// Metrics
pub use crate::metrics::PoolMetrics;

// Common external crates
pub use std::sync::Arc;
pub use tracing::{debug, error, info, trace, warn};
