//! Error type shared by every layer of the cache.

use thiserror::Error;

/// Contract violations surfaced by the cache.
///
/// Nothing here is transient: the cache performs no I/O, so every error is a
/// caller bug and is reported synchronously rather than retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("key header offset must be {expected}, got {actual}")]
    InvalidKeyOffset { expected: usize, actual: usize },

    #[error("key payload of {length} units at offset {offset} does not fit a buffer of {capacity}")]
    KeyOutOfBounds {
        offset: usize,
        length: usize,
        capacity: usize,
    },

    #[error("buffer does not carry an embedded key header")]
    NotAKey,

    #[error("string hashes differ: given {given}, required {required}")]
    HashMismatch { given: u32, required: u32 },

    #[error("key payload is not valid UTF-16")]
    InvalidUtf16,

    #[error("illegal reference count for {symbol}")]
    IllegalRefCount { symbol: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// Malformed input from the caller (buffer management or configuration).
    pub fn is_invalid_argument(&self) -> bool {
        !self.is_illegal_state()
    }

    /// Refcount discipline was broken: a release without a matching acquire.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, CacheError::IllegalRefCount { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;
