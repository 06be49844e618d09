//! Cache client abstraction
//!
//! A [`CacheClient`] is one live session with a set of memcached servers.
//! The pool never looks inside it; it only asks a [`Connector`] to build
//! new ones and calls [`CacheClient::shutdown`] when one is retired.

mod text;

pub use text::{TextClient, TextConnector};

use crate::Result;
use crate::resolver::Endpoint;
use std::collections::HashMap;

/// Blocking memcached operations.
///
/// Store operations return `Ok(false)` when the server declined the mutation
/// (`NOT_STORED` / `NOT_FOUND`), which is not an error.
pub trait CacheClient: Send + 'static {
    fn set(&mut self, key: &str, exptime: u32, value: &[u8]) -> Result<bool>;

    fn add(&mut self, key: &str, exptime: u32, value: &[u8]) -> Result<bool>;

    fn replace(&mut self, key: &str, exptime: u32, value: &[u8]) -> Result<bool>;

    fn append(&mut self, key: &str, value: &[u8]) -> Result<bool>;

    fn prepend(&mut self, key: &str, value: &[u8]) -> Result<bool>;

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Fetch several keys; absent keys are missing from the map
    fn get_bulk(&mut self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>>;

    fn delete(&mut self, key: &str) -> Result<bool>;

    /// Invalidate all items on every server
    fn flush(&mut self) -> Result<bool>;

    /// False once a failed exchange may have left unread replies on the
    /// wire. The pool retires an unhealthy client instead of reusing it.
    fn is_healthy(&self) -> bool;

    /// Close the session. Called once, when the pool retires the client.
    fn shutdown(&mut self) -> Result<()>;
}

/// Builds new clients for an endpoint list
pub trait Connector: Send + Sync + 'static {
    type Client: CacheClient;

    fn connect(&self, endpoints: &[Endpoint]) -> Result<Self::Client>;
}
