//! Server address list parsing
//!
//! Accepts `host:port` tokens separated by any mix of whitespace and commas.
//! Hostnames are kept as written; DNS happens when a socket is opened.

use crate::{McPoolError, Result};
use std::fmt;

/// Address used when none is supplied
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:11211";

/// Conventional memcached port
pub const DEFAULT_PORT: u16 = 11211;

/// One memcached server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a single `host:port` token. The port follows the last colon.
    pub fn parse(token: &str) -> Result<Self> {
        let invalid = || McPoolError::InvalidAddress(token.to_string());

        let (host, port) = token.rsplit_once(':').ok_or_else(invalid)?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        Ok(Self::new(host, port))
    }

    /// `(host, port)` pair suitable for `ToSocketAddrs`
    pub fn socket_addr(&self) -> (&str, u16) {
        (&self.host, self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Resolve an address string into endpoints, in the order given.
///
/// Empty input resolves to [`DEFAULT_ADDRESS`].
pub fn resolve(addresses: &str) -> Result<Vec<Endpoint>> {
    let endpoints = addresses
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(Endpoint::parse)
        .collect::<Result<Vec<_>>>()?;

    if endpoints.is_empty() {
        return Ok(vec![Endpoint::default()]);
    }
    Ok(endpoints)
}
