//! Memcached ASCII protocol implementation (client side)

pub mod command;
pub mod parser;
pub mod writer;

pub use command::{
    DEFAULT_MAX_VALUE_SIZE, Expiry, MAX_KEY_LENGTH, MAX_RELATIVE_EXPTIME, Reply, StoreVerb,
    is_valid_key, validate_key,
};
pub use parser::{ParseResult, parse_reply, parse_reply_limited};
pub use writer::RequestWriter;
