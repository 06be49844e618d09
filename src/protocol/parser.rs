//! Memcached ASCII protocol reply parser
//!
//! Two-phase parsing:
//! 1. Parse reply line (up to \r\n)
//! 2. For VALUE lines, read the data block that follows

use crate::ProtocolError;
use crate::protocol::command::{DEFAULT_MAX_VALUE_SIZE, Reply};
use std::borrow::Cow;

/// Result of parsing
#[derive(Debug)]
pub enum ParseResult<'a> {
    /// Reply fully parsed, with the number of bytes it occupied
    Complete(Reply<'a>, usize),
    /// Need more data to complete parsing
    NeedMoreData,
    /// Parse error
    Error(ProtocolError),
}

/// Parse one reply from the front of a buffer
pub fn parse_reply(buf: &[u8]) -> ParseResult<'_> {
    parse_reply_limited(buf, DEFAULT_MAX_VALUE_SIZE)
}

/// Parse one reply, rejecting VALUE data blocks longer than `max_value_size`
pub fn parse_reply_limited(buf: &[u8], max_value_size: usize) -> ParseResult<'_> {
    let line_end = match find_crlf(buf) {
        Some(pos) => pos,
        None => return ParseResult::NeedMoreData,
    };

    let line = &buf[..line_end];
    let consumed = line_end + 2;

    let mut parts = line.split(|&b| b == b' ');
    let word = parts.next().unwrap_or_default();

    let reply = match word {
        b"STORED" => Reply::Stored,
        b"NOT_STORED" => Reply::NotStored,
        b"EXISTS" => Reply::Exists,
        b"NOT_FOUND" => Reply::NotFound,
        b"DELETED" => Reply::Deleted,
        b"OK" => Reply::Ok,
        b"END" => Reply::End,
        b"ERROR" => Reply::Error,
        b"VERSION" => Reply::Version(rest_of_line(line, word)),
        b"CLIENT_ERROR" => Reply::ClientError(rest_of_line(line, word)),
        b"SERVER_ERROR" => Reply::ServerError(rest_of_line(line, word)),
        b"VALUE" => return parse_value(parts, buf, line_end, max_value_size),
        _ => {
            return ParseResult::Error(ProtocolError::InvalidReply(
                String::from_utf8_lossy(line).to_string(),
            ));
        }
    };

    ParseResult::Complete(reply, consumed)
}

/// Parse VALUE <key> <flags> <bytes> [<cas>] and its data block
fn parse_value<'a>(
    mut parts: impl Iterator<Item = &'a [u8]>,
    buf: &'a [u8],
    line_end: usize,
    max_value_size: usize,
) -> ParseResult<'a> {
    let key = match parts.next() {
        Some(k) if !k.is_empty() => k,
        _ => {
            return ParseResult::Error(ProtocolError::InvalidReply(
                "VALUE without key".to_string(),
            ));
        }
    };

    let flags = match parts.next().and_then(parse_u32) {
        Some(f) => f,
        None => return ParseResult::Error(ProtocolError::InvalidFlags),
    };

    let bytes = match parts.next().and_then(parse_usize) {
        Some(b) if b <= max_value_size => b,
        _ => return ParseResult::Error(ProtocolError::InvalidBytesLength),
    };

    // Check if we have enough data for the data block
    let data_start = line_end + 2;
    let Some(data_end) = data_start.checked_add(bytes) else {
        return ParseResult::Error(ProtocolError::InvalidBytesLength);
    };
    let Some(total_needed) = data_end.checked_add(2) else {
        return ParseResult::Error(ProtocolError::InvalidBytesLength);
    };

    if buf.len() < total_needed {
        return ParseResult::NeedMoreData;
    }

    // Verify trailing \r\n
    if buf[data_end] != b'\r' || buf[data_end + 1] != b'\n' {
        return ParseResult::Error(ProtocolError::UnexpectedData);
    }

    let reply = Reply::Value {
        key: Cow::Borrowed(key),
        flags,
        data: Cow::Borrowed(&buf[data_start..data_end]),
    };

    ParseResult::Complete(reply, total_needed)
}

fn rest_of_line(line: &[u8], word: &[u8]) -> String {
    let rest = line.get(word.len() + 1..).unwrap_or_default();
    String::from_utf8_lossy(rest).to_string()
}

/// Find \r\n in buffer
#[inline]
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    memchr::memmem::find(buf, b"\r\n")
}

/// Parse bytes as u32
fn parse_u32(bytes: &[u8]) -> Option<u32> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Parse bytes as usize
fn parse_usize(bytes: &[u8]) -> Option<usize> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}
