//! User-facing cache handle
//!
//! A [`Memcached`] borrows its [`ExecutionContext`] and forwards every call to
//! the connection bound there. Handles are cheap; build one wherever it is
//! convenient and they will all share the context's connection.
//!
//! Store operations whose result carries nothing useful return `&Self`, so
//! calls chain with `?`:
//!
//! ```ignore
//! let ctx = pool.context();
//! let mc = Memcached::new(&ctx, "10.0.0.1:11211, 10.0.0.2:11211")?;
//! mc.set("greeting", "hello", 0)?.append("greeting", " world")?;
//! ```
//!
//! `set`, `add` and `replace` pass `exptime` to the server unmodified:
//! up to [`MAX_RELATIVE_EXPTIME`] seconds it is an offset from now, above
//! that it is an absolute Unix timestamp, and 0 means no expiry.
//!
//! [`MAX_RELATIVE_EXPTIME`]: crate::protocol::MAX_RELATIVE_EXPTIME

use crate::Result;
use crate::client::{CacheClient, Connector, TextConnector};
use crate::pool::{ConnectionId, ExecutionContext};
use crate::protocol::Expiry;
use std::collections::HashMap;
use tracing::trace;

/// Cache operations on the context's bound connection
pub struct Memcached<'ctx, K: Connector = TextConnector> {
    ctx: &'ctx ExecutionContext<K>,
}

impl<'ctx, K: Connector> Memcached<'ctx, K> {
    /// Bind `ctx` to `addresses` (whitespace or comma separated `host:port`
    /// pairs, empty for `127.0.0.1:11211`) unless it is already bound.
    pub fn new(ctx: &'ctx ExecutionContext<K>, addresses: &str) -> Result<Self> {
        ctx.bind(addresses)?;
        Ok(Self { ctx })
    }

    /// Handle on the default local server
    pub fn local(ctx: &'ctx ExecutionContext<K>) -> Result<Self> {
        Self::new(ctx, "")
    }

    /// Connection currently backing this handle
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.ctx.connection_id()
    }

    /// Store regardless of any existing value
    pub fn set(&self, key: &str, value: impl AsRef<[u8]>, exptime: u32) -> Result<&Self> {
        trace!(key, expiry = ?Expiry::of(exptime), "set");
        self.ctx.with_client(|c| c.set(key, exptime, value.as_ref()))?;
        Ok(self)
    }

    /// Store only if the key is absent. A present key is a silent no-op.
    pub fn add(&self, key: &str, value: impl AsRef<[u8]>, exptime: u32) -> Result<&Self> {
        trace!(key, expiry = ?Expiry::of(exptime), "add");
        self.ctx.with_client(|c| c.add(key, exptime, value.as_ref()))?;
        Ok(self)
    }

    /// Store only if the key is present. A missing key is a silent no-op.
    pub fn replace(&self, key: &str, value: impl AsRef<[u8]>, exptime: u32) -> Result<&Self> {
        trace!(key, expiry = ?Expiry::of(exptime), "replace");
        self.ctx.with_client(|c| c.replace(key, exptime, value.as_ref()))?;
        Ok(self)
    }

    pub fn prepend(&self, key: &str, value: impl AsRef<[u8]>) -> Result<&Self> {
        self.ctx.with_client(|c| c.prepend(key, value.as_ref()))?;
        Ok(self)
    }

    pub fn append(&self, key: &str, value: impl AsRef<[u8]>) -> Result<&Self> {
        self.ctx.with_client(|c| c.append(key, value.as_ref()))?;
        Ok(self)
    }

    /// Fetch a value as text. Non-UTF-8 bytes are replaced.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .get_bytes(key)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Fetch a value as raw bytes
    pub fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ctx.with_client(|c| c.get(key))
    }

    /// Fetch several keys at once; missing keys are absent from the map
    pub fn mget(&self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        self.ctx.with_client(|c| c.get_bulk(keys))
    }

    pub fn remove(&self, key: &str) -> Result<&Self> {
        self.ctx.with_client(|c| c.delete(key))?;
        Ok(self)
    }

    /// Invalidate every key on every configured server
    pub fn flush(&self) -> Result<&Self> {
        self.ctx.with_client(CacheClient::flush)?;
        Ok(self)
    }

    /// Give the connection back to the pool now rather than at the end of
    /// the context. Safe to call more than once; the context will not
    /// release it again.
    pub fn close(&self) {
        self.ctx.release();
    }
}
