//! IPv4 radix cache: keys are dotted-quad strings, indexed by their
//! 32-bit address with mask `0xffffffff`.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use crate::cache::Cache;
use crate::element::Element;
use crate::error::StorageError;

fn parse_key(key: &[u8]) -> Option<u32> {
    let s = std::str::from_utf8(key).ok()?;
    let addr = Ipv4Addr::from_str(s).ok()?;
    let bits = u32::from(addr);
    // Keys that fail to parse are rejected by yielding 0; 0.0.0.0 is
    // therefore not representable as a key.
    if bits == 0 {
        None
    } else {
        Some(bits)
    }
}

/// `Cache` variant keyed by IPv4 address. Backed by a sorted map rather
/// than a hand-rolled patricia trie: with a full `/32` mask every
/// lookup is an exact match, so the radix structure degenerates to an
/// ordered key space, which `BTreeMap` gives for free while keeping
/// iteration sorted by address.
#[derive(Default)]
pub struct RadixCache {
    store: BTreeMap<u32, Arc<Element>>,
}

impl RadixCache {
    pub fn new() -> RadixCache {
        RadixCache {
            store: BTreeMap::new(),
        }
    }
}

impl Cache for RadixCache {
    fn insert(&mut self, element: Arc<Element>) -> Option<Arc<Element>> {
        let bits = parse_key(&element.key())?;
        self.store.insert(bits, element)
    }

    fn lookup(&self, key: &[u8]) -> Option<Arc<Element>> {
        let bits = parse_key(key)?;
        self.store.get(&bits).cloned()
    }

    fn replace(&mut self, key: &[u8], element: Arc<Element>) -> Result<Arc<Element>, StorageError> {
        let bits = parse_key(key).ok_or_else(|| StorageError::InvalidKey(format!("{:?}", key)))?;
        if !self.store.contains_key(&bits) {
            return Err(StorageError::NotFound);
        }
        Ok(self.store.insert(bits, element).expect("checked above"))
    }

    fn steal(&mut self, key: &[u8]) -> Option<Arc<Element>> {
        let bits = parse_key(key)?;
        self.store.remove(&bits)
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

    fn validate_key(&self, key: &[u8]) -> Result<(), StorageError> {
        parse_key(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::InvalidKey(String::from_utf8_lossy(key).into_owned()))
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
    fn rejects_unparseable_keys() {
        let c = RadixCache::new();
        assert!(c.validate_key(b"bogus").is_err());
        assert!(c.validate_key(b"10.0.0.1").is_ok());
    }

    #[test]
    fn insert_and_lookup_ipv4() {
        let mut c = RadixCache::new();
        assert!(c.insert(elt(b"10.0.0.1", b"a")).is_none());
        assert!(c.insert(elt(b"10.0.0.2", b"b")).is_none());
        assert!(c.insert(elt(b"bogus", b"c")).is_none());
        assert_eq!(c.lookup(b"10.0.0.1").unwrap().value(), b"a");
        assert_eq!(c.lookup(b"10.0.0.2").unwrap().value(), b"b");
        assert!(c.lookup(b"bogus").is_none());
        assert_eq!(c.len(), 2);
    }
}
