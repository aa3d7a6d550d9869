//! Error types for the storage engine and its pluggable strategies.

use thiserror::Error;

/// Failure modes for [`crate::storage::Storage`] operations.
///
/// Every variant corresponds to one of the error categories in the
/// engine's design: capacity, absence, shape, or backend divergence.
/// None of these are ever raised as panics — callers always get a
/// `Result`.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The value is larger than `max_memory` even with nothing else stored.
    #[error("value of {len} bytes exceeds max_memory ({max_memory})")]
    ValueTooLarge { len: usize, max_memory: usize },

    /// Eviction ran `MAX_EXPIRE_STEPS` times without making enough room.
    #[error("eviction budget ({steps}) exhausted without freeing enough capacity")]
    EvictionBudgetExhausted { steps: u32 },

    /// `replace` or an array operation targeted a key the cache does not hold.
    #[error("key not present")]
    NotFound,

    /// An array operation was attempted on a non-array element.
    #[error("element is not an array")]
    NotAnArray,

    /// `set_array`/`get_array` index was out of range for the element.
    #[error("array index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// `set_array` was called with a buffer whose length does not match
    /// the element's slot size.
    #[error("array slot size mismatch: element uses {expected}, got {actual}")]
    SlotSizeMismatch { expected: usize, actual: usize },

    /// The key could not be accepted by the configured cache (for
    /// example, a non-parseable address in [`crate::cache::radix::RadixCache`]).
    #[error("key rejected by cache: {0}")]
    InvalidKey(String),

    /// The key or value length exceeds the wire format's limits.
    #[error("key or value too long to encode")]
    EncodingTooLarge,

    /// The configured backend reported a failure. In-memory state has
    /// already been applied; the caller should treat this as a
    /// divergence warning rather than a rolled-back operation.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Failure modes for [`crate::backend::Backend`] implementations.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend connection error: {0}")]
    Connection(String),

    #[error("backend serialization error: {0}")]
    Serialization(String),

    #[error("backend i/o error: {0}")]
    Io(String),
}

/// Failure modes building a [`crate::backend::Backend`] or
/// [`crate::storage::Storage`].
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("max_elts and max_memory must both be non-negative; 0 means unlimited")]
    InvalidCaps,

    #[error("backend build error: {0}")]
    Backend(#[from] BackendError),

    #[error("io error preparing backend storage: {0}")]
    Io(#[from] std::io::Error),
}

/// Synthetic and transport codes for the HTTP adaptor, matching a
/// callback contract of `(task, code, headers_or_absent,
/// body_or_absent)`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpAdaptorError {
    /// DNS failure, socket failure, write failure, or a 200 response
    /// missing `Content-Length`.
    #[error("protocol error (synthetic 450)")]
    Protocol,
    /// Transport read failure or request timeout.
    #[error("transport error (synthetic 500)")]
    Transport,
}

impl HttpAdaptorError {
    /// The synthetic HTTP status code a caller's callback observes.
    pub fn code(self) -> u16 {
        match self {
            HttpAdaptorError::Protocol => 450,
            HttpAdaptorError::Transport => 500,
        }
    }
}
