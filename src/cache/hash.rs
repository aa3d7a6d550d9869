//! General-purpose hash cache: maps case-insensitive keys to elements.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::cache::Cache;
use crate::element::Element;
use crate::error::StorageError;

/// Hash-indexed [`Cache`].
///
/// Keys on a small lowercased copy of the element's key rather than
/// aliasing the element's own key storage, which would need unsafe
/// code to keep the pointer stable across the element's lifetime; the
/// copy is one allocation no larger than the key itself and keeps the
/// index entirely safe code.
#[derive(Default)]
pub struct HashCache {
    store: HashMap<Vec<u8>, Arc<Element>>,
}

impl HashCache {
    pub fn new() -> HashCache {
        HashCache {
            store: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> HashCache {
        HashCache {
            store: HashMap::with_capacity(capacity),
        }
    }

    fn normalize(key: &[u8]) -> Vec<u8> {
        key.iter().map(u8::to_ascii_lowercase).collect()
    }
}

impl Cache for HashCache {
    fn insert(&mut self, element: Arc<Element>) -> Option<Arc<Element>> {
        let key = Self::normalize(&element.key());
        self.store.insert(key, element)
    }

    fn lookup(&self, key: &[u8]) -> Option<Arc<Element>> {
        self.store.get(&Self::normalize(key)).cloned()
    }

    fn replace(&mut self, key: &[u8], element: Arc<Element>) -> Result<Arc<Element>, StorageError> {
        let norm = Self::normalize(key);
        if !self.store.contains_key(&norm) {
            return Err(StorageError::NotFound);
        }
        Ok(self.store.insert(norm, element).expect("checked above"))
    }

    fn steal(&mut self, key: &[u8]) -> Option<Arc<Element>> {
        self.store.remove(&Self::normalize(key))
    }

    fn destroy(&mut self) {
        self.store.clear();
    }

    fn len(&self) -> usize {
        self.store.len()
    }

    fn iter(&self) -> Vec<Arc<Element>> {
        self.store.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::ElementFlags;

    fn elt(key: &[u8], value: &[u8]) -> Arc<Element> {
        Arc::new(Element::new(key, value, 0, 0, 1, ElementFlags::empty()).unwrap())
    }

    #[test]
    fn insert_lookup_case_insensitive() {
        let mut c = HashCache::new();
        assert!(c.insert(elt(b"Key", b"v")).is_none());
        assert_eq!(c.lookup(b"key").unwrap().value(), b"v");
        assert_eq!(c.lookup(b"KEY").unwrap().value(), b"v");
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn insert_steals_prior_entry() {
        let mut c = HashCache::new();
        c.insert(elt(b"k", b"old"));
        let stolen = c.insert(elt(b"k", b"new"));
        assert_eq!(stolen.unwrap().value(), b"old");
        assert_eq!(c.lookup(b"k").unwrap().value(), b"new");
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn replace_fails_if_absent() {
        let mut c = HashCache::new();
        assert!(matches!(
            c.replace(b"missing", elt(b"missing", b"v")),
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn steal_unlinks_without_affecting_refcount_semantics() {
        let mut c = HashCache::new();
        let e = elt(b"k", b"v");
        c.insert(e.clone());
        let stolen = c.steal(b"k").unwrap();
        assert!(Arc::ptr_eq(&e, &stolen));
        assert_eq!(c.len(), 0);
        assert!(c.lookup(b"k").is_none());
        // the element is still alive via our own `e` handle and `stolen`
        assert_eq!(e.value(), b"v");
    }
}
