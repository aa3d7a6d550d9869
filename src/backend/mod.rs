//! Optional durable store accepting asynchronous writes.
//!
//! `Backend` is polymorphic over {`insert`, `replace`, `lookup`,
//! `delete`, `destroy`, optional `init`}. It is
//! advisory: any call may fail, and the façade surfaces that failure
//! without rolling back the in-memory state it already applied. The
//! backend is the only component allowed to clear `DIRTY` and to
//! honour `NEED_FREE`.

pub mod memory;

#[cfg(feature = "disk_store")]
pub mod disk;

#[cfg(feature = "redis_store")]
pub mod redis;

use std::sync::Arc;

use crate::element::Element;
use crate::error::BackendError;

/// The durable-store capability `Storage` optionally depends on.
pub trait Backend: Send {
    /// Queue a durable write for `key`. Implementations may mark
    /// `element` `DIRTY` and return immediately, completing the write
    /// asynchronously; the element must stay alive (via its own `Arc`
    /// clone held by the backend) until the write lands.
    fn insert(&mut self, key: &[u8], element: Arc<Element>) -> Result<(), BackendError>;

    /// Queue a durable overwrite for `key`.
    fn replace(&mut self, key: &[u8], element: Arc<Element>) -> Result<(), BackendError>;

    /// Fetch a **fresh** element for `key`, independent of whatever the
    /// in-memory cache holds. The façade hoists this into the cache and,
    /// if it isn't dirty, drops the backend's own copy.
    fn lookup(&self, key: &[u8]) -> Result<Option<Element>, BackendError>;

    /// Queue a durable removal.
    fn delete(&mut self, key: &[u8]) -> Result<(), BackendError>;

    fn destroy(&mut self) -> Result<(), BackendError>;

    fn init(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}
