//! Memcached ASCII protocol command and reply types

use crate::ProtocolError;
use std::borrow::Cow;

/// Maximum key length (memcached protocol limit)
pub const MAX_KEY_LENGTH: usize = 250;

/// Default largest data block accepted in a VALUE reply (memcached's 1 MiB item size)
pub const DEFAULT_MAX_VALUE_SIZE: usize = 1024 * 1024;

/// Largest exptime the server treats as an offset from now (30 days).
/// Anything above is an absolute Unix timestamp.
pub const MAX_RELATIVE_EXPTIME: u32 = 60 * 60 * 24 * 30;

/// Storage commands sharing the `<verb> <key> <flags> <exptime> <bytes>` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVerb {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
}

impl StoreVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreVerb::Set => "set",
            StoreVerb::Add => "add",
            StoreVerb::Replace => "replace",
            StoreVerb::Append => "append",
            StoreVerb::Prepend => "prepend",
        }
    }
}

/// How the server will interpret an exptime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Never,
    Relative(u32),
    Absolute(u32),
}

impl Expiry {
    /// Classify `exptime` per the 30-day rule. The value itself is never altered.
    pub fn of(exptime: u32) -> Self {
        match exptime {
            0 => Expiry::Never,
            t if t <= MAX_RELATIVE_EXPTIME => Expiry::Relative(t),
            t => Expiry::Absolute(t),
        }
    }
}

/// Parsed server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<'a> {
    Stored,
    NotStored,
    Exists,
    NotFound,
    Deleted,
    Ok,
    /// Terminates a retrieval reply
    End,
    /// VALUE <key> <flags> <bytes> [<cas>]\r\n<data>\r\n
    Value {
        key: Cow<'a, [u8]>,
        flags: u32,
        data: Cow<'a, [u8]>,
    },
    Version(String),
    Error,
    ClientError(String),
    ServerError(String),
}

impl Reply<'_> {
    /// Detach the reply from the read buffer
    pub fn into_owned(self) -> Reply<'static> {
        match self {
            Reply::Stored => Reply::Stored,
            Reply::NotStored => Reply::NotStored,
            Reply::Exists => Reply::Exists,
            Reply::NotFound => Reply::NotFound,
            Reply::Deleted => Reply::Deleted,
            Reply::Ok => Reply::Ok,
            Reply::End => Reply::End,
            Reply::Value { key, flags, data } => Reply::Value {
                key: Cow::Owned(key.into_owned()),
                flags,
                data: Cow::Owned(data.into_owned()),
            },
            Reply::Version(v) => Reply::Version(v),
            Reply::Error => Reply::Error,
            Reply::ClientError(msg) => Reply::ClientError(msg),
            Reply::ServerError(msg) => Reply::ServerError(msg),
        }
    }

    /// Message carried by an error reply
    pub fn error_message(&self) -> Option<String> {
        match self {
            Reply::Error => Some("ERROR".to_string()),
            Reply::ClientError(msg) => Some(format!("CLIENT_ERROR {msg}")),
            Reply::ServerError(msg) => Some(format!("SERVER_ERROR {msg}")),
            _ => None,
        }
    }
}

/// Check if a key is valid
pub fn is_valid_key(key: &[u8]) -> bool {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return false;
    }
    // Keys cannot contain control characters or whitespace
    key.iter().all(|&b| b > 32 && b < 127)
}

/// Reject keys the server would refuse before anything is written
pub fn validate_key(key: &str) -> Result<(), ProtocolError> {
    if is_valid_key(key.as_bytes()) {
        return Ok(());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(ProtocolError::KeyTooLong);
    }
    Err(ProtocolError::InvalidKey(key.to_string()))
}
