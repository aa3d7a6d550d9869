//! Redis-backed durable store.
//!
//! Prefix-namespaced keys over a `redis::Client` connection, with the
//! connection string pulled from the environment when none is given
//! explicitly. Pooled through `r2d2` rather than a bare
//! `Client::get_connection` per call, since every `Backend` method here
//! can be invoked from the façade under contention and a single shared
//! connection doesn't hold up under that.

use std::env;
use std::sync::Arc;

use r2d2::Pool;
use redis::Commands;

use crate::backend::Backend;
use crate::element::Element;
use crate::error::BackendError;

const ENV_KEY: &str = "KVSTORAGE_REDIS_URL";
const DEFAULT_PREFIX: &str = "kvstorage-";

pub struct RedisBackendBuilder {
    connection_string: Option<String>,
    prefix: String,
}

impl Default for RedisBackendBuilder {
    fn default() -> Self {
        RedisBackendBuilder {
            connection_string: None,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl RedisBackendBuilder {
    pub fn new() -> RedisBackendBuilder {
        RedisBackendBuilder::default()
    }

    pub fn set_connection_string(mut self, cs: &str) -> RedisBackendBuilder {
        self.connection_string = Some(cs.to_string());
        self
    }

    pub fn set_prefix(mut self, prefix: &str) -> RedisBackendBuilder {
        self.prefix = prefix.to_string();
        self
    }

    pub fn build(self) -> Result<RedisBackend, BackendError> {
        let cs = match self.connection_string {
            Some(cs) => cs,
            None => env::var(ENV_KEY)
                .map_err(|_| BackendError::Connection(format!("{} not set", ENV_KEY)))?,
        };
        let client = redis::Client::open(cs).map_err(|e| BackendError::Connection(e.to_string()))?;
        let pool = Pool::builder()
            .build(client)
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(RedisBackend {
            pool,
            prefix: self.prefix,
        })
    }
}

/// Durable `Backend` writing each element's wire form into Redis under
/// `prefix`-namespaced keys.
pub struct RedisBackend {
    pool: Pool<redis::Client>,
    prefix: String,
}

impl RedisBackend {
    pub fn builder() -> RedisBackendBuilder {
        RedisBackendBuilder::new()
    }

    fn namespaced(&self, key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + key.len());
        out.extend_from_slice(self.prefix.as_bytes());
        out.extend_from_slice(key);
        out
    }
}

impl Backend for RedisBackend {
    fn insert(&mut self, key: &[u8], element: Arc<Element>) -> Result<(), BackendError> {
        let mut conn = self.pool.get().map_err(|e| BackendError::Connection(e.to_string()))?;
        let _: () = conn
            .set(self.namespaced(key), element.to_wire())
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(())
    }

    fn replace(&mut self, key: &[u8], element: Arc<Element>) -> Result<(), BackendError> {
        self.insert(key, element)
    }

    fn lookup(&self, key: &[u8]) -> Result<Option<Element>, BackendError> {
        let mut conn = self.pool.get().map_err(|e| BackendError::Connection(e.to_string()))?;
        let bytes: Option<Vec<u8>> = conn
            .get(self.namespaced(key))
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        match bytes {
            Some(bytes) => Element::from_wire(&bytes)
                .map(Some)
                .map_err(|e| BackendError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), BackendError> {
        let mut conn = self.pool.get().map_err(|e| BackendError::Connection(e.to_string()))?;
        let _: () = conn
            .del(self.namespaced(key))
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), BackendError> {
        // No namespaced SCAN here; a full `destroy` against a shared
        // Redis instance should be an explicit operational action, not
        // something this backend does implicitly.
        Ok(())
    }
}
