//! Test doubles: an in-process mock client and a TCP fake memcached server

use crate::client::{CacheClient, Connector};
use crate::protocol::validate_key;
use crate::resolver::Endpoint;
use crate::{McPoolError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// One forwarded operation, as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Which client instance served the call
    pub serial: u64,
    pub op: &'static str,
    pub key: String,
    pub exptime: Option<u32>,
}

#[derive(Default)]
struct MockState {
    connects: AtomicUsize,
    shutdowns: AtomicUsize,
    next_serial: AtomicU64,
    fail_connect: AtomicBool,
    fail_shutdown: AtomicBool,
    fail_io: AtomicBool,
    store: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<Call>>,
}

/// Connector counting constructions; all its clients share one store
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.state.shutdowns.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().clone()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_shutdown(&self, fail: bool) {
        self.state.fail_shutdown.store(fail, Ordering::SeqCst);
    }

    /// Make every keyed operation fail with an I/O error, breaking its client
    pub fn set_fail_io(&self, fail: bool) {
        self.state.fail_io.store(fail, Ordering::SeqCst);
    }
}

impl Connector for MockConnector {
    type Client = MockClient;

    fn connect(&self, _endpoints: &[Endpoint]) -> Result<MockClient> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(McPoolError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock refused",
            )));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MockClient {
            serial: self.state.next_serial.fetch_add(1, Ordering::SeqCst),
            state: Arc::clone(&self.state),
            broken: false,
        })
    }
}

pub struct MockClient {
    serial: u64,
    state: Arc<MockState>,
    broken: bool,
}

impl MockClient {
    fn record(&mut self, op: &'static str, key: &str, exptime: Option<u32>) -> Result<()> {
        validate_key(key)?;
        if self.state.fail_io.load(Ordering::SeqCst) {
            self.broken = true;
            return Err(McPoolError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "mock timeout",
            )));
        }
        self.state.calls.lock().push(Call {
            serial: self.serial,
            op,
            key: key.to_string(),
            exptime,
        });
        Ok(())
    }

    fn modify(&self, key: &str, f: impl FnOnce(&mut Vec<u8>)) -> bool {
        match self.state.store.lock().get_mut(key) {
            Some(existing) => {
                f(existing);
                true
            }
            None => false,
        }
    }
}

impl CacheClient for MockClient {
    fn set(&mut self, key: &str, exptime: u32, value: &[u8]) -> Result<bool> {
        self.record("set", key, Some(exptime))?;
        self.state.store.lock().insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn add(&mut self, key: &str, exptime: u32, value: &[u8]) -> Result<bool> {
        self.record("add", key, Some(exptime))?;
        let mut store = self.state.store.lock();
        if store.contains_key(key) {
            return Ok(false);
        }
        store.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn replace(&mut self, key: &str, exptime: u32, value: &[u8]) -> Result<bool> {
        self.record("replace", key, Some(exptime))?;
        Ok(self.modify(key, |existing| *existing = value.to_vec()))
    }

    fn append(&mut self, key: &str, value: &[u8]) -> Result<bool> {
        self.record("append", key, None)?;
        Ok(self.modify(key, |existing| existing.extend_from_slice(value)))
    }

    fn prepend(&mut self, key: &str, value: &[u8]) -> Result<bool> {
        self.record("prepend", key, None)?;
        Ok(self.modify(key, |existing| {
            existing.splice(0..0, value.iter().copied());
        }))
    }

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        self.record("get", key, None)?;
        Ok(self.state.store.lock().get(key).cloned())
    }

    fn get_bulk(&mut self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        for key in keys {
            self.record("get_bulk", key, None)?;
        }
        let store = self.state.store.lock();
        Ok(keys
            .iter()
            .filter_map(|&key| store.get(key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        self.record("delete", key, None)?;
        Ok(self.state.store.lock().remove(key).is_some())
    }

    fn flush(&mut self) -> Result<bool> {
        self.state.store.lock().clear();
        Ok(true)
    }

    fn is_healthy(&self) -> bool {
        !self.broken
    }

    fn shutdown(&mut self) -> Result<()> {
        self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_shutdown.load(Ordering::SeqCst) {
            return Err(McPoolError::Io(std::io::Error::other("mock close failure")));
        }
        Ok(())
    }
}

/// Server answering each received line with a canned reply, after a delay
///
/// `reply` maps a line (without CRLF) to a delay in milliseconds and the
/// bytes to send back; an empty reply sends nothing.
pub struct ScriptedServer {
    port: u16,
}

impl ScriptedServer {
    pub fn start(reply: fn(&str) -> (u64, &'static [u8])) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                std::thread::spawn(move || {
                    let Ok(read_half) = stream.try_clone() else { return };
                    let mut reader = BufReader::new(read_half);
                    let mut writer = stream;
                    let mut line = String::new();
                    while matches!(reader.read_line(&mut line), Ok(n) if n > 0) {
                        let (delay_ms, out) = reply(line.trim_end_matches("\r\n"));
                        std::thread::sleep(Duration::from_millis(delay_ms));
                        if writer.write_all(out).is_err() {
                            return;
                        }
                        line.clear();
                    }
                });
            }
        });

        Self { port }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.port)
    }

    pub fn address(&self) -> String {
        self.endpoint().to_string()
    }
}

/// Answers `get secret` after 300 ms and any other get with a miss
pub fn slow_secret_reply(line: &str) -> (u64, &'static [u8]) {
    match line {
        "get secret" => (300, b"VALUE secret 0 6\r\nSECRET\r\nEND\r\n"),
        _ if line.starts_with("get ") => (0, b"END\r\n"),
        _ => (0, b""),
    }
}

/// Minimal memcached text-protocol server on an ephemeral port
pub struct FakeServer {
    port: u16,
    store: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    lines: Arc<Mutex<Vec<String>>>,
}

impl FakeServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let store = Arc::new(Mutex::new(HashMap::new()));
        let lines = Arc::new(Mutex::new(Vec::new()));

        let (accept_store, accept_lines) = (Arc::clone(&store), Arc::clone(&lines));
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let store = Arc::clone(&accept_store);
                let lines = Arc::clone(&accept_lines);
                std::thread::spawn(move || {
                    let _ = serve(stream, &store, &lines);
                });
            }
        });

        Self { port, store, lines }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.port)
    }

    pub fn address(&self) -> String {
        self.endpoint().to_string()
    }

    /// Items currently stored
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    /// Every command line received so far, without data blocks
    pub fn command_lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

fn serve(
    stream: TcpStream,
    store: &Mutex<HashMap<String, Vec<u8>>>,
    lines: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let command = line.trim_end_matches("\r\n").to_string();
        lines.lock().push(command.clone());
        let parts: Vec<&str> = command.split(' ').collect();

        let mut out = Vec::new();
        match parts[0] {
            verb @ ("set" | "add" | "replace" | "append" | "prepend") => {
                let bytes: usize = parts[4].parse().unwrap_or(0);
                let mut data = vec![0u8; bytes + 2];
                reader.read_exact(&mut data)?;
                data.truncate(bytes);

                let key = parts[1].to_string();
                let mut store = store.lock();
                let exists = store.contains_key(&key);
                let stored = match verb {
                    "set" => true,
                    "add" => !exists,
                    _ => exists,
                };
                if stored {
                    match verb {
                        "append" => store.entry(key).or_default().extend_from_slice(&data),
                        "prepend" => {
                            let existing = store.entry(key).or_default();
                            existing.splice(0..0, data);
                        }
                        _ => {
                            store.insert(key, data);
                        }
                    }
                    out.extend_from_slice(b"STORED\r\n");
                } else {
                    out.extend_from_slice(b"NOT_STORED\r\n");
                }
            }
            "get" => {
                let store = store.lock();
                for key in &parts[1..] {
                    if let Some(value) = store.get(*key) {
                        let header = format!("VALUE {key} 0 {}\r\n", value.len());
                        out.extend_from_slice(header.as_bytes());
                        out.extend_from_slice(value);
                        out.extend_from_slice(b"\r\n");
                    }
                }
                out.extend_from_slice(b"END\r\n");
            }
            "delete" => {
                if store.lock().remove(parts[1]).is_some() {
                    out.extend_from_slice(b"DELETED\r\n");
                } else {
                    out.extend_from_slice(b"NOT_FOUND\r\n");
                }
            }
            "flush_all" => {
                store.lock().clear();
                out.extend_from_slice(b"OK\r\n");
            }
            "version" => out.extend_from_slice(b"VERSION fake 0.0.0\r\n"),
            "quit" => return Ok(()),
            _ => out.extend_from_slice(b"ERROR\r\n"),
        }
        writer.write_all(&out)?;
    }
}
