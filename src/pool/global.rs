//! Process-wide pool and its shutdown routine
//!
//! Applications that do not want to thread a pool through their code can use
//! the shared instance here. The host calls [`shutdown`] from its own graceful
//! shutdown sequence; nothing is registered with the runtime implicitly.

use super::{ConnectionPool, ExecutionContext};
use crate::client::TextConnector;
use crate::config::Config;
use crate::{McPoolError, Result};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

pub type DefaultPool = ConnectionPool<TextConnector>;

static GLOBAL: OnceCell<Arc<DefaultPool>> = OnceCell::new();
static SHUT_DOWN: AtomicBool = AtomicBool::new(false);

/// Install a configured process-wide pool. Must run before the first [`global`] call.
pub fn init_global(config: &Config) -> Result<Arc<DefaultPool>> {
    let pool = Arc::new(ConnectionPool::new(
        TextConnector::new(config.client.clone()),
        config.pool.clone(),
    ));
    GLOBAL
        .set(Arc::clone(&pool))
        .map_err(|_| McPoolError::Config("global pool already initialised".to_string()))?;
    Ok(pool)
}

/// The process-wide pool, created with defaults on first use
pub fn global() -> Arc<DefaultPool> {
    Arc::clone(GLOBAL.get_or_init(|| {
        Arc::new(ConnectionPool::new(
            TextConnector::default(),
            Default::default(),
        ))
    }))
}

/// New execution context on the process-wide pool
pub fn context() -> ExecutionContext<TextConnector> {
    global().context()
}

/// Drain and close the process-wide pool.
///
/// Only the first call does any work; later calls return 0.
pub fn shutdown() -> usize {
    if SHUT_DOWN.swap(true, Ordering::AcqRel) {
        return 0;
    }
    match GLOBAL.get() {
        Some(pool) => {
            info!("cleanup memcached");
            pool.shutdown()
        }
        None => 0,
    }
}
