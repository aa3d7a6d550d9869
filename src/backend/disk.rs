//! Sled-backed durable store.
//!
//! Uses `sled` for the on-disk tree and `directories` to locate a
//! default cache directory, persisting `Element`'s own wire encoding
//! directly rather than wrapping it in a generic serialized value: the
//! element already owns its serialization, so the backend just hands
//! sled raw bytes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sled::Db;

use crate::backend::Backend;
use crate::element::Element;
use crate::error::BackendError;

static DISK_FILE_PREFIX: &str = "kvstorage_disk_backend";
const DISK_FILE_VERSION: u64 = 1;

pub struct SledBackendBuilder {
    disk_dir: Option<PathBuf>,
    name: String,
}

impl SledBackendBuilder {
    pub fn new<S: AsRef<str>>(name: S) -> SledBackendBuilder {
        SledBackendBuilder {
            disk_dir: None,
            name: name.as_ref().to_string(),
        }
    }

    pub fn set_disk_directory<P: AsRef<Path>>(mut self, dir: P) -> SledBackendBuilder {
        self.disk_dir = Some(dir.as_ref().into());
        self
    }

    fn default_disk_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|base| base.cache_dir().join(DISK_FILE_PREFIX))
            .unwrap_or_else(|| std::env::current_dir().expect("disk backend needs a cwd"))
    }

    pub fn build(self) -> Result<SledBackend, BackendError> {
        let disk_dir = self.disk_dir.unwrap_or_else(Self::default_disk_dir);
        let path = disk_dir.join(format!("{}_v{}", self.name, DISK_FILE_VERSION));
        let connection = sled::open(&path).map_err(|e| BackendError::Io(e.to_string()))?;
        Ok(SledBackend { connection, disk_path: path })
    }
}

/// Durable `Backend` writing each element's wire form straight into a
/// `sled` tree keyed by the raw element key.
pub struct SledBackend {
    connection: Db,
    disk_path: PathBuf,
}

impl fmt::Debug for SledBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SledBackend").field("disk_path", &self.disk_path).finish()
    }
}

impl SledBackend {
    pub fn builder<S: AsRef<str>>(name: S) -> SledBackendBuilder {
        SledBackendBuilder::new(name)
    }
}

impl Backend for SledBackend {
    fn insert(&mut self, key: &[u8], element: Arc<Element>) -> Result<(), BackendError> {
        self.connection
            .insert(key, element.to_wire())
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        // sled writes synchronously to its in-memory tree; flush is what
        // actually makes it durable, but we don't block the caller on
        // fsync here, matching the asynchronous-write contract.
        Ok(())
    }

    fn replace(&mut self, key: &[u8], element: Arc<Element>) -> Result<(), BackendError> {
        self.insert(key, element)
    }

    fn lookup(&self, key: &[u8]) -> Result<Option<Element>, BackendError> {
        match self.connection.get(key).map_err(|e| BackendError::Connection(e.to_string()))? {
            Some(bytes) => Element::from_wire(&bytes)
                .map(Some)
                .map_err(|e| BackendError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), BackendError> {
        self.connection
            .remove(key)
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), BackendError> {
        self.connection.clear().map_err(|e| BackendError::Connection(e.to_string()))
    }

    fn init(&mut self) -> Result<(), BackendError> {
        self.connection.flush().map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(())
    }
}
