//! Shared free-list of idle memcached connections
//!
//! A connection is owned either by the pool (idle) or by exactly one
//! [`ExecutionContext`] (bound). Acquire never waits: with nothing idle a new
//! connection is opened, unless `max_total` has been reached, in which case
//! the acquire fails immediately.
//!
//! ```text
//!   acquire ──▶ idle.pop() ── hit ──▶ bound to context
//!                  │ miss
//!                  ▼
//!           reserve slot ─▶ Connector::connect (outside the lock)
//!
//!   release ──▶ idle.push()  (or shutdown when unhealthy / over max_idle / closed)
//! ```

mod context;
pub mod global;

pub use context::ExecutionContext;

use crate::client::{CacheClient, Connector};
use crate::config::PoolConfig;
use crate::metrics::PoolMetrics;
use crate::resolver::Endpoint;
use crate::{McPoolError, Result};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Identity of a pooled connection, unique within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A client plus the bookkeeping the pool needs to recycle it
pub struct PooledConnection<C> {
    id: ConnectionId,
    endpoints: Arc<[Endpoint]>,
    client: C,
}

impl<C> PooledConnection<C> {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Endpoint list the client was built for
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }
}

struct PoolState<C> {
    /// Idle connections, most recently released last
    idle: Vec<PooledConnection<C>>,
    /// Idle + bound
    live: usize,
    closed: bool,
}

/// Thread-safe pool of interchangeable connections
pub struct ConnectionPool<K: Connector> {
    connector: K,
    config: PoolConfig,
    state: Mutex<PoolState<K::Client>>,
    next_id: AtomicU64,
    metrics: PoolMetrics,
}

impl<K: Connector> ConnectionPool<K> {
    pub fn new(connector: K, config: PoolConfig) -> Self {
        let idle = Vec::with_capacity(config.max_idle.unwrap_or(0).min(64));
        Self {
            connector,
            config,
            state: Mutex::new(PoolState {
                idle,
                live: 0,
                closed: false,
            }),
            next_id: AtomicU64::new(1),
            metrics: PoolMetrics::new(),
        }
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Connections currently waiting in the pool
    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Connections currently open, idle or bound
    pub fn live_count(&self) -> usize {
        self.state.lock().live
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Start a unit of work. Its connection goes back to this pool when the
    /// context ends.
    pub fn context(self: &Arc<Self>) -> ExecutionContext<K> {
        ExecutionContext::new(Arc::clone(self))
    }

    /// Run `f` inside a fresh context, releasing its connection on every exit path
    pub fn scope<T>(self: &Arc<Self>, f: impl FnOnce(&ExecutionContext<K>) -> T) -> T {
        let ctx = self.context();
        f(&ctx)
    }

    /// Take an idle connection built for `endpoints`, or open a new one.
    ///
    /// The connection counts against `max_total` until it is handed back
    /// through [`release`](Self::release) or [`discard`](Self::discard);
    /// dropping it instead leaks its slot.
    pub fn acquire(&self, endpoints: &[Endpoint]) -> Result<PooledConnection<K::Client>> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(McPoolError::PoolClosed);
            }

            if let Some(pos) = state
                .idle
                .iter()
                .rposition(|conn| conn.endpoints.as_ref() == endpoints)
            {
                let conn = state.idle.remove(pos);
                self.metrics.connections_reused.inc();
                self.metrics.idle_connections.set(state.idle.len() as i64);
                debug!("Reusing idle connection {}", conn.id);
                return Ok(conn);
            }

            if let Some(max_total) = self.config.max_total
                && state.live >= max_total
            {
                self.metrics.exhausted.inc();
                warn!("Connection pool exhausted ({} live)", state.live);
                return Err(McPoolError::PoolExhausted { max_total });
            }

            // Reserve the slot before connecting so concurrent acquires honour max_total
            state.live += 1;
            self.metrics.live_connections.set(state.live as i64);
        }

        match self.connector.connect(endpoints) {
            Ok(client) => {
                let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
                self.metrics.connections_created.inc();
                debug!("Opened connection {} to {}", id, DisplayEndpoints(endpoints));
                Ok(PooledConnection {
                    id,
                    endpoints: endpoints.into(),
                    client,
                })
            }
            Err(e) => {
                let mut state = self.state.lock();
                state.live = state.live.saturating_sub(1);
                self.metrics.live_connections.set(state.live as i64);
                self.metrics.connect_errors.inc();
                Err(e)
            }
        }
    }

    /// Return a connection so any later acquire can reuse it.
    ///
    /// A connection whose client reports itself unhealthy is shut down
    /// instead, as is one released while the pool is closed or already
    /// holding `max_idle` connections.
    ///
    /// A connection whose id is already idle is refused and shut down, so a
    /// stray second release can never make two contexts share one connection.
    pub fn release(&self, conn: PooledConnection<K::Client>) {
        let mut state = self.state.lock();

        if state.idle.iter().any(|idle| idle.id == conn.id) {
            drop(state);
            self.metrics.refused_releases.inc();
            warn!("Connection {} released twice, closing the duplicate", conn.id);
            // The idle twin keeps the slot
            self.close(conn);
            return;
        }

        if !conn.client.is_healthy() {
            self.metrics.discarded.inc();
            self.retire_locked(state, conn, "unhealthy");
            return;
        }

        let over_limit = self
            .config
            .max_idle
            .is_some_and(|max_idle| state.idle.len() >= max_idle);

        if state.closed || over_limit {
            let reason = if state.closed { "pool closed" } else { "over max_idle" };
            self.retire_locked(state, conn, reason);
            return;
        }

        debug!("Released connection {}", conn.id);
        state.idle.push(conn);
        self.metrics.connections_released.inc();
        self.metrics.idle_connections.set(state.idle.len() as i64);
    }

    /// Shut down a connection that should not be reused, freeing its slot
    pub fn discard(&self, conn: PooledConnection<K::Client>) {
        let state = self.state.lock();
        self.metrics.discarded.inc();
        self.retire_locked(state, conn, "discarded");
    }

    fn retire_locked(
        &self,
        mut state: MutexGuard<'_, PoolState<K::Client>>,
        conn: PooledConnection<K::Client>,
        reason: &str,
    ) {
        state.live = state.live.saturating_sub(1);
        self.metrics.live_connections.set(state.live as i64);
        drop(state);
        debug!("Retiring connection {} ({})", conn.id, reason);
        self.close(conn);
    }

    /// Pop and shut down every idle connection. Returns how many were closed.
    ///
    /// Bound connections are untouched; they are pooled again on release.
    pub fn drain_and_close_all(&self) -> usize {
        let mut state = self.state.lock();
        self.drain_locked(&mut state)
    }

    /// Refuse further acquires and drain the idle list.
    ///
    /// Connections released after this point are shut down directly.
    pub fn shutdown(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let closed = self.drain_locked(&mut state);
        info!("Connection pool shut down, closed {} idle connections", closed);
        closed
    }

    fn drain_locked(&self, state: &mut PoolState<K::Client>) -> usize {
        let mut closed = 0;
        while let Some(conn) = state.idle.pop() {
            state.live = state.live.saturating_sub(1);
            self.close(conn);
            closed += 1;
        }
        self.metrics.idle_connections.set(0);
        self.metrics.live_connections.set(state.live as i64);
        closed
    }

    /// Shut a connection down; failures are logged and otherwise ignored
    fn close(&self, mut conn: PooledConnection<K::Client>) {
        self.metrics.connections_closed.inc();
        if let Err(e) = conn.client.shutdown() {
            self.metrics.close_errors.inc();
            warn!("Failed to close connection {}: {}", conn.id, e);
        }
    }
}

struct DisplayEndpoints<'a>(&'a [Endpoint]);

impl fmt::Display for DisplayEndpoints<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, endpoint) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{endpoint}")?;
        }
        Ok(())
    }
}
