//! Error types for mcpool

use thiserror::Error;

/// Main error type for mcpool
#[derive(Error, Debug)]
pub enum McPoolError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ERROR, CLIENT_ERROR or SERVER_ERROR reply from a memcached server
    #[error("Server error: {0}")]
    Server(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Connection pool exhausted ({max_total} connections live)")]
    PoolExhausted { max_total: usize },

    #[error("Connection pool is shut down")]
    PoolClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Wire-level errors raised while encoding requests or decoding replies
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Key too long (max 250 bytes)")]
    KeyTooLong,

    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    #[error("Invalid flags")]
    InvalidFlags,

    #[error("Invalid bytes length")]
    InvalidBytesLength,

    #[error("Unexpected data")]
    UnexpectedData,

    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: &'static str, reply: String },

    #[error("Connection closed by server")]
    ConnectionClosed,

    /// A VALUE line named a key that was not requested
    #[error("Reply for unrequested key: {0}")]
    UnexpectedKey(String),

    /// An earlier exchange failed partway; the socket can no longer be trusted
    #[error("Connection out of sync after an earlier failure")]
    OutOfSync,
}

pub type Result<T> = std::result::Result<T, McPoolError>;
