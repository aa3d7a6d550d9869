//! In-memory write-behind backend.
//!
//! This is the reference implementation of the dirty/need-free
//! hand-off: `insert`/`replace` mark the element `DIRTY` and hold it in
//! a pending queue; nothing is actually
//! persisted until the caller drives [`MemoryBackend::drain`], which
//! mirrors a real backend's write-completion callback. It's also a
//! perfectly usable `Backend` on its own for tests and for storages
//! that want write-behind semantics without real durability.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::Backend;
use crate::element::Element;
use crate::error::BackendError;
use crate::flags::ElementFlags;

#[derive(Default)]
pub struct MemoryBackend {
    pending: HashMap<Vec<u8>, Arc<Element>>,
    persisted: HashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        MemoryBackend::default()
    }

    /// Complete every pending write: clears `DIRTY` and makes the data
    /// visible to `lookup`. If an element was stolen from the cache
    /// while dirty (carrying `NEED_FREE`), dropping this backend's
    /// `Arc` clone here is what actually frees it, once no other
    /// holder remains.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        for (key, element) in self.pending.drain() {
            element.remove_flag(ElementFlags::DIRTY);
            self.persisted.insert(key, element.to_wire());
            drained += 1;
        }
        drained
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Backend for MemoryBackend {
    fn insert(&mut self, key: &[u8], element: Arc<Element>) -> Result<(), BackendError> {
        element.insert_flag(ElementFlags::DIRTY);
        self.pending.insert(key.to_vec(), element);
        Ok(())
    }

    fn replace(&mut self, key: &[u8], element: Arc<Element>) -> Result<(), BackendError> {
        self.insert(key, element)
    }

    fn lookup(&self, key: &[u8]) -> Result<Option<Element>, BackendError> {
        match self.persisted.get(key) {
            Some(bytes) => Element::from_wire(bytes)
                .map(Some)
                .map_err(|e| BackendError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), BackendError> {
        self.pending.remove(key);
        self.persisted.remove(key);
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), BackendError> {
        self.pending.clear();
        self.persisted.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elt(key: &[u8]) -> Arc<Element> {
        Arc::new(Element::new(key, b"v", 0, 0, 1, ElementFlags::empty()).unwrap())
    }

    #[test]
    fn insert_marks_dirty_until_drained() {
        let mut backend = MemoryBackend::new();
        let e = elt(b"k");
        backend.insert(b"k", e.clone()).unwrap();
        assert!(e.flags().contains(ElementFlags::DIRTY));
        assert!(backend.lookup(b"k").unwrap().is_none());

        assert_eq!(backend.drain(), 1);
        assert!(!e.flags().contains(ElementFlags::DIRTY));
        assert_eq!(backend.lookup(b"k").unwrap().unwrap().value(), b"v");
    }

    #[test]
    fn need_free_element_freed_on_drain_when_unreferenced() {
        let mut backend = MemoryBackend::new();
        let e = elt(b"k");
        backend.insert(b"k", e.clone()).unwrap();
        e.insert_flag(ElementFlags::NEED_FREE);
        drop(e); // only the backend's pending-queue Arc remains
        assert_eq!(backend.pending_len(), 1);
        backend.drain();
        assert_eq!(backend.pending_len(), 0);
    }
}
