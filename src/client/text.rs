//! Blocking memcached ASCII protocol client
//!
//! One TCP socket per configured server. Keys are routed by CRC-32 of the
//! key modulo the server count, so every `TextClient` built for the same
//! endpoint list sends a given key to the same server.

use super::{CacheClient, Connector};
use crate::config::ClientConfig;
use crate::protocol::{
    ParseResult, Reply, RequestWriter, StoreVerb, parse_reply_limited, validate_key,
};
use crate::resolver::Endpoint;
use crate::{McPoolError, ProtocolError, Result};
use bytes::{Buf, BytesMut};
use crc::{CRC_32_ISO_HDLC, Crc};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use tracing::{debug, warn};

const KEY_HASH: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Builds [`TextClient`]s with shared socket settings
#[derive(Debug, Clone, Default)]
pub struct TextConnector {
    config: ClientConfig,
}

impl TextConnector {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

impl Connector for TextConnector {
    type Client = TextClient;

    fn connect(&self, endpoints: &[Endpoint]) -> Result<TextClient> {
        TextClient::connect(endpoints, &self.config)
    }
}

/// Socket and buffers for one server
struct ServerConn {
    endpoint: Endpoint,
    stream: TcpStream,
    read_buf: BytesMut,
    chunk: Box<[u8]>,
    request: RequestWriter,
    max_value_size: usize,
    /// Set when an exchange failed partway through
    broken: bool,
}

impl ServerConn {
    fn open(endpoint: &Endpoint, config: &ClientConfig) -> Result<Self> {
        let stream = Self::dial(endpoint, config)?;

        if config.nodelay
            && let Err(e) = stream.set_nodelay(true)
        {
            warn!("Failed to set TCP_NODELAY on {}: {}", endpoint, e);
        }
        stream.set_read_timeout(config.read_timeout())?;
        stream.set_write_timeout(config.write_timeout())?;

        debug!("Connected to {}", endpoint);
        Ok(Self {
            endpoint: endpoint.clone(),
            stream,
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            chunk: vec![0u8; config.read_buffer_size.max(512)].into_boxed_slice(),
            request: RequestWriter::new(config.write_buffer_size),
            max_value_size: config.max_value_size,
            broken: false,
        })
    }

    /// Try every address the host resolves to, keeping the last error
    fn dial(endpoint: &Endpoint, config: &ClientConfig) -> Result<TcpStream> {
        let mut last_err = None;
        for addr in endpoint.socket_addr().to_socket_addrs()? {
            let attempt = match config.connect_timeout() {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(match last_err {
            Some(e) => McPoolError::Io(e),
            None => McPoolError::InvalidAddress(endpoint.to_string()),
        })
    }

    /// Run one request/reply round trip.
    ///
    /// An I/O or protocol failure can leave part of a reply unread, so the
    /// socket is marked broken and every later exchange fails with
    /// [`ProtocolError::OutOfSync`]. Server error replies arrive whole and
    /// leave the socket usable.
    fn exchange<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.broken {
            return Err(ProtocolError::OutOfSync.into());
        }
        let result = f(self);
        if let Err(e @ (McPoolError::Io(_) | McPoolError::Protocol(_))) = &result {
            warn!("Connection to {} is out of sync: {}", self.endpoint, e);
            self.broken = true;
            self.read_buf.clear();
            self.request.clear();
        }
        result
    }

    /// Write out and clear the pending request
    fn send(&mut self) -> Result<()> {
        let result = self.stream.write_all(self.request.buffer());
        self.request.clear();
        result?;
        Ok(())
    }

    fn read_reply(&mut self) -> Result<Reply<'static>> {
        loop {
            match parse_reply_limited(&self.read_buf, self.max_value_size) {
                ParseResult::Complete(reply, consumed) => {
                    let reply = reply.into_owned();
                    self.read_buf.advance(consumed);
                    return Ok(reply);
                }
                ParseResult::NeedMoreData => {}
                ParseResult::Error(e) => return Err(e.into()),
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> Result<()> {
        let n = self.stream.read(&mut self.chunk)?;
        if n == 0 {
            return Err(ProtocolError::ConnectionClosed.into());
        }
        self.read_buf.extend_from_slice(&self.chunk[..n]);
        Ok(())
    }

    /// Read VALUE replies up to END
    fn read_values(
        &mut self,
        command: &'static str,
        mut on_value: impl FnMut(Vec<u8>, Vec<u8>) -> Result<()>,
    ) -> Result<()> {
        loop {
            match self.read_reply()? {
                Reply::Value { key, data, .. } => on_value(key.into_owned(), data.into_owned())?,
                Reply::End => return Ok(()),
                other => return Err(unexpected(command, &other)),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.request.clear();
        self.request.quit();
        let sent = self.send();
        let shut = self.stream.shutdown(Shutdown::Both);
        sent?;
        shut?;
        Ok(())
    }
}

/// Memcached text protocol session over one or more servers
pub struct TextClient {
    servers: Vec<ServerConn>,
}

impl TextClient {
    /// Open one socket per endpoint
    pub fn connect(endpoints: &[Endpoint], config: &ClientConfig) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(McPoolError::InvalidAddress(String::new()));
        }
        let servers = endpoints
            .iter()
            .map(|endpoint| ServerConn::open(endpoint, config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { servers })
    }

    /// Version string reported by the first server
    pub fn version(&mut self) -> Result<String> {
        self.servers[0].exchange(|server| {
            server.request.version();
            server.send()?;
            match server.read_reply()? {
                Reply::Version(version) => Ok(version),
                other => Err(unexpected("version", &other)),
            }
        })
    }

    fn server_index(&self, key: &str) -> usize {
        if self.servers.len() == 1 {
            return 0;
        }
        KEY_HASH.checksum(key.as_bytes()) as usize % self.servers.len()
    }

    fn store(&mut self, verb: StoreVerb, key: &str, exptime: u32, value: &[u8]) -> Result<bool> {
        validate_key(key)?;
        let idx = self.server_index(key);
        self.servers[idx].exchange(|server| {
            server.request.store(verb, key.as_bytes(), 0, exptime, value);
            server.send()?;
            match server.read_reply()? {
                Reply::Stored => Ok(true),
                Reply::NotStored | Reply::NotFound | Reply::Exists => Ok(false),
                other => Err(unexpected(verb.as_str(), &other)),
            }
        })
    }
}

impl CacheClient for TextClient {
    fn set(&mut self, key: &str, exptime: u32, value: &[u8]) -> Result<bool> {
        self.store(StoreVerb::Set, key, exptime, value)
    }

    fn add(&mut self, key: &str, exptime: u32, value: &[u8]) -> Result<bool> {
        self.store(StoreVerb::Add, key, exptime, value)
    }

    fn replace(&mut self, key: &str, exptime: u32, value: &[u8]) -> Result<bool> {
        self.store(StoreVerb::Replace, key, exptime, value)
    }

    fn append(&mut self, key: &str, value: &[u8]) -> Result<bool> {
        self.store(StoreVerb::Append, key, 0, value)
    }

    fn prepend(&mut self, key: &str, value: &[u8]) -> Result<bool> {
        self.store(StoreVerb::Prepend, key, 0, value)
    }

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let idx = self.server_index(key);
        self.servers[idx].exchange(|server| {
            server.request.get(&[key]);
            server.send()?;

            let mut found = None;
            server.read_values("get", |got, data| {
                if got != key.as_bytes() {
                    return Err(unexpected_key(&got));
                }
                found = Some(data);
                Ok(())
            })?;
            Ok(found)
        })
    }

    fn get_bulk(&mut self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        let mut by_server: Vec<Vec<&str>> = vec![Vec::new(); self.servers.len()];
        for &key in keys {
            validate_key(key)?;
            by_server[self.server_index(key)].push(key);
        }

        let mut found = HashMap::with_capacity(keys.len());
        for (server, batch) in self.servers.iter_mut().zip(&by_server) {
            if batch.is_empty() {
                continue;
            }
            server.exchange(|server| {
                server.request.get(batch);
                server.send()?;
                server.read_values("get", |got, data| {
                    let Some(&key) = batch.iter().find(|key| key.as_bytes() == got) else {
                        return Err(unexpected_key(&got));
                    };
                    found.insert(key.to_string(), data);
                    Ok(())
                })
            })?;
        }
        Ok(found)
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let idx = self.server_index(key);
        self.servers[idx].exchange(|server| {
            server.request.delete(key.as_bytes());
            server.send()?;
            match server.read_reply()? {
                Reply::Deleted => Ok(true),
                Reply::NotFound => Ok(false),
                other => Err(unexpected("delete", &other)),
            }
        })
    }

    fn flush(&mut self) -> Result<bool> {
        for server in &mut self.servers {
            server.exchange(|server| {
                server.request.flush_all();
                server.send()?;
                match server.read_reply()? {
                    Reply::Ok => Ok(()),
                    other => Err(unexpected("flush_all", &other)),
                }
            })?;
        }
        Ok(true)
    }

    fn is_healthy(&self) -> bool {
        self.servers.iter().all(|server| !server.broken)
    }

    fn shutdown(&mut self) -> Result<()> {
        let mut first_err = None;
        for server in &mut self.servers {
            if let Err(e) = server.close() {
                debug!("Error closing connection to {}: {}", server.endpoint, e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

fn unexpected_key(key: &[u8]) -> McPoolError {
    ProtocolError::UnexpectedKey(String::from_utf8_lossy(key).into_owned()).into()
}

/// Map a reply that does not fit the command onto an error
fn unexpected(command: &'static str, reply: &Reply<'_>) -> McPoolError {
    if let Some(message) = reply.error_message() {
        return McPoolError::Server(message);
    }
    ProtocolError::UnexpectedReply {
        command,
        reply: format!("{reply:?}"),
    }
    .into()
}
