//! Binding of one pooled connection to a unit of work
//!
//! An [`ExecutionContext`] is created at the start of a request or task and
//! holds at most one connection at a time. Every [`Memcached`] handle built
//! from the same context shares that connection. When the context ends,
//! explicitly through [`ExecutionContext::end`] or by being dropped on any
//! exit path, the connection goes back to the pool exactly once.
//!
//! The context is `!Sync`: a binding can only ever be used from the thread
//! that currently owns the context.
//!
//! [`Memcached`]: crate::Memcached

use super::{ConnectionId, ConnectionPool, PooledConnection};
use crate::Result;
use crate::client::{CacheClient, Connector};
use crate::resolver::{self, Endpoint};
use std::cell::RefCell;
use std::sync::Arc;
use tracing::debug;

struct Binding<C> {
    conn: Option<PooledConnection<C>>,
    /// Address string of the first bind; later handles reuse it
    addresses: Option<String>,
    endpoints: Vec<Endpoint>,
}

/// Context-local connection slot
pub struct ExecutionContext<K: Connector> {
    pool: Arc<ConnectionPool<K>>,
    binding: RefCell<Binding<K::Client>>,
}

impl<K: Connector> ExecutionContext<K> {
    pub(super) fn new(pool: Arc<ConnectionPool<K>>) -> Self {
        Self {
            pool,
            binding: RefCell::new(Binding {
                conn: None,
                addresses: None,
                endpoints: Vec::new(),
            }),
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<K>> {
        &self.pool
    }

    /// True while a connection is held
    pub fn is_bound(&self) -> bool {
        self.binding.borrow().conn.is_some()
    }

    /// Identity of the held connection
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.binding.borrow().conn.as_ref().map(PooledConnection::id)
    }

    /// Make sure a connection is held.
    ///
    /// Only the first call in a context decides the servers; while bound,
    /// a different `addresses` value is ignored.
    pub fn bind(&self, addresses: &str) -> Result<()> {
        let mut binding = self.binding.borrow_mut();

        if let Some(first) = binding.addresses.as_deref() {
            if first != addresses {
                debug!(
                    "Context already configured for '{}', ignoring '{}'",
                    first, addresses
                );
            }
            if binding.conn.is_some() {
                return Ok(());
            }
        } else {
            binding.endpoints = resolver::resolve(addresses)?;
            binding.addresses = Some(addresses.to_string());
        }

        self.acquire_into(&mut binding)
    }

    /// Run `f` against the bound client, re-binding first if the connection
    /// was released early.
    ///
    /// A client left unhealthy by `f` is handed back at once, so the pool
    /// retires it and the next call binds a fresh connection.
    pub fn with_client<T>(&self, f: impl FnOnce(&mut K::Client) -> Result<T>) -> Result<T> {
        let mut guard = self.binding.borrow_mut();
        let binding = &mut *guard;
        if binding.addresses.is_none() {
            binding.endpoints = resolver::resolve("")?;
            binding.addresses = Some(String::new());
        }

        let conn = match binding.conn {
            Some(ref mut conn) => conn,
            None => {
                let conn = self.pool.acquire(&binding.endpoints)?;
                debug!("Context re-bound to connection {}", conn.id());
                binding.conn.insert(conn)
            }
        };
        let result = f(conn.client_mut());
        if !conn.client().is_healthy()
            && let Some(conn) = binding.conn.take()
        {
            debug!("Context dropping unhealthy connection {}", conn.id());
            self.pool.release(conn);
        }
        result
    }

    /// Hand the connection back to the pool now. Returns false if nothing was held.
    pub fn release(&self) -> bool {
        let conn = self.binding.borrow_mut().conn.take();
        match conn {
            Some(conn) => {
                debug!("Context releasing connection {}", conn.id());
                self.pool.release(conn);
                true
            }
            None => false,
        }
    }

    /// End the unit of work
    pub fn end(self) {
        // Drop does the release
    }

    fn acquire_into(&self, binding: &mut Binding<K::Client>) -> Result<()> {
        let conn = self.pool.acquire(&binding.endpoints)?;
        debug!("Context bound to connection {}", conn.id());
        binding.conn = Some(conn);
        Ok(())
    }
}

impl<K: Connector> Drop for ExecutionContext<K> {
    fn drop(&mut self) {
        if let Some(conn) = self.binding.get_mut().conn.take() {
            debug!("Context ended, releasing connection {}", conn.id());
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::McPoolError;
    use crate::config::PoolConfig;
    use crate::testing::MockConnector;

    fn pool() -> (Arc<ConnectionPool<MockConnector>>, MockConnector) {
        let connector = MockConnector::default();
        (
            Arc::new(ConnectionPool::new(connector.clone(), PoolConfig::default())),
            connector,
        )
    }

    #[test]
    fn test_bind_is_lazy_and_reused() {
        let (pool, connector) = pool();
        let ctx = pool.context();
        assert!(!ctx.is_bound());

        ctx.bind("127.0.0.1:11211").unwrap();
        let id = ctx.connection_id().unwrap();
        ctx.bind("127.0.0.1:11211").unwrap();
        ctx.bind("10.0.0.9:11211").unwrap();

        assert_eq!(ctx.connection_id(), Some(id));
        assert_eq!(connector.connects(), 1);
    }

    #[test]
    fn test_drop_releases_exactly_once() {
        let (pool, _) = pool();
        {
            let ctx = pool.context();
            ctx.bind("").unwrap();
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.live_count(), 1);
    }

    #[test]
    fn test_end_clears_binding_and_pools() {
        let (pool, connector) = pool();

        let ctx = pool.context();
        ctx.bind("").unwrap();
        let id = ctx.connection_id().unwrap();
        ctx.end();
        assert_eq!(pool.idle_count(), 1);

        // Next unit of work picks the same connection up
        let next = pool.context();
        next.bind("").unwrap();
        assert_eq!(next.connection_id(), Some(id));
        assert_eq!(connector.connects(), 1);
    }

    #[test]
    fn test_release_then_end_pools_once() {
        let (pool, _) = pool();

        let ctx = pool.context();
        ctx.bind("").unwrap();
        assert!(ctx.release());
        assert!(!ctx.release());
        assert!(!ctx.is_bound());
        drop(ctx);

        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.metrics().refused_releases.get(), 0);
    }

    #[test]
    fn test_with_client_rebinds_after_release() {
        let (pool, connector) = pool();

        let ctx = pool.context();
        ctx.bind("").unwrap();
        ctx.release();

        ctx.with_client(|client| client.set("k", 0, b"v")).unwrap();
        assert!(ctx.is_bound());
        assert_eq!(connector.connects(), 1);
    }

    #[test]
    fn test_release_on_error_path() {
        let (pool, _) = pool();

        let run = || -> crate::Result<()> {
            let ctx = pool.context();
            ctx.bind("")?;
            Err(McPoolError::Server("ERROR".to_string()))
        };
        assert!(run().is_err());
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_release_on_panic() {
        let (pool, _) = pool();

        let pool_for_task = Arc::clone(&pool);
        let result = std::thread::spawn(move || {
            pool_for_task.scope(|ctx| {
                ctx.bind("").unwrap();
                if ctx.is_bound() {
                    panic!("task failed");
                }
            });
        })
        .join();

        assert!(result.is_err());
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_invalid_address_leaves_context_unbound() {
        let (pool, connector) = pool();

        let ctx = pool.context();
        assert!(matches!(
            ctx.bind("nonsense"),
            Err(McPoolError::InvalidAddress(_))
        ));
        assert!(!ctx.is_bound());
        assert_eq!(connector.connects(), 0);
    }

    #[test]
    fn test_contexts_on_threads_hold_distinct_connections() {
        let (pool, connector) = pool();
        let barrier = Arc::new(std::sync::Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let ctx = pool.context();
                    ctx.bind("").unwrap();
                    let id = ctx.connection_id().unwrap();
                    barrier.wait();
                    id
                })
            })
            .collect();

        let mut ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
        assert_eq!(connector.connects(), 4);
        assert_eq!(pool.idle_count(), 4);
    }
}
