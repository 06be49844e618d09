//! Memcached ASCII protocol request builder

use crate::protocol::command::StoreVerb;
use bytes::BytesMut;
use itoa::Buffer;

/// Request writer for memcached ASCII protocol
pub struct RequestWriter {
    buf: BytesMut,
}

impl RequestWriter {
    /// Create a new request writer with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the internal buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Write a storage command
    /// Format: <verb> <key> <flags> <exptime> <bytes>\r\n<data>\r\n
    ///
    /// `exptime` goes out exactly as given; the server applies the 30-day rule.
    pub fn store(&mut self, verb: StoreVerb, key: &[u8], flags: u32, exptime: u32, data: &[u8]) {
        let mut itoa_buf = Buffer::new();
        self.buf.extend_from_slice(verb.as_str().as_bytes());
        self.buf.extend_from_slice(b" ");
        self.buf.extend_from_slice(key);
        self.buf.extend_from_slice(b" ");
        self.buf.extend_from_slice(itoa_buf.format(flags).as_bytes());
        self.buf.extend_from_slice(b" ");
        self.buf.extend_from_slice(itoa_buf.format(exptime).as_bytes());
        self.buf.extend_from_slice(b" ");
        self.buf.extend_from_slice(itoa_buf.format(data.len()).as_bytes());
        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Write a retrieval command for one or more keys
    pub fn get<K: AsRef<[u8]>>(&mut self, keys: &[K]) {
        self.buf.extend_from_slice(b"get");
        for key in keys {
            self.buf.extend_from_slice(b" ");
            self.buf.extend_from_slice(key.as_ref());
        }
        self.buf.extend_from_slice(b"\r\n");
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.buf.extend_from_slice(b"delete ");
        self.buf.extend_from_slice(key);
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Invalidate every item immediately
    pub fn flush_all(&mut self) {
        self.buf.extend_from_slice(b"flush_all\r\n");
    }

    pub fn version(&mut self) {
        self.buf.extend_from_slice(b"version\r\n");
    }

    pub fn quit(&mut self) {
        self.buf.extend_from_slice(b"quit\r\n");
    }
}

impl Default for RequestWriter {
    fn default() -> Self {
        Self::new(4096)
    }
}
