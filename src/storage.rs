//! The façade tying a `Cache`, an optional `Expire`, and an optional
//! `Backend` together behind one reader/writer lock.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::Backend;
use crate::cache::hash::HashCache;
use crate::cache::Cache;
use crate::element::Element;
use crate::error::{BuildError, StorageError};
use crate::expire::lru::LruExpire;
use crate::expire::Expire;
use crate::flags::ElementFlags;

/// Upper bound on eviction attempts a single insertion will drive
/// before giving up and reporting failure.
pub const MAX_EXPIRE_STEPS: u32 = 10;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

struct Inner {
    cache: Box<dyn Cache>,
    expire: Option<Box<dyn Expire>>,
    backend: Option<Box<dyn Backend>>,
    elts: usize,
    memory: usize,
}

/// The bounded key-value store. `id`, `name`, and the caps are fixed at
/// construction; everything else lives behind one `RwLock`.
pub struct Storage {
    id: u64,
    name: String,
    max_elts: usize,
    max_memory: usize,
    inner: RwLock<Inner>,
}

impl Storage {
    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elts(&self) -> usize {
        self.inner.read().elts
    }

    pub fn memory(&self) -> usize {
        self.inner.read().memory
    }

    /// Install or replace `key`. On success the new element is the
    /// unique entry for `key` across Cache, Expire, and Backend.
    pub fn insert(
        &self,
        key: &[u8],
        value: &[u8],
        flags: ElementFlags,
        ttl: u32,
        now: u64,
    ) -> Result<(), StorageError> {
        let mut guard = self.inner.write();
        let element = self.build_element(&guard, key, value, flags, ttl, now)?;
        self.insert_locked(&mut guard, key, element, true, now)
    }

    /// Hoist a value fetched from the Backend into the Cache. Skips the
    /// Backend write-through but still drives Expire and accounting.
    pub fn insert_internal(
        &self,
        key: &[u8],
        value: &[u8],
        flags: ElementFlags,
        ttl: u32,
        now: u64,
    ) -> Result<Arc<Element>, StorageError> {
        let mut guard = self.inner.write();
        let element = self.build_element(&guard, key, value, flags, ttl, now)?;
        self.insert_locked(&mut guard, key, element.clone(), false, now)?;
        Ok(element)
    }

    /// Replace the element stored for `key` in place. Fails with
    /// [`StorageError::NotFound`] if `key` is absent. Unlike `insert`,
    /// this never changes `elts` and goes through `Cache::replace` /
    /// `Backend::replace` rather than the steal-then-insert dance.
    pub fn replace(&self, key: &[u8], value: &[u8], flags: ElementFlags, ttl: u32, now: u64) -> Result<(), StorageError> {
        let mut guard = self.inner.write();
        let element = self.build_element(&guard, key, value, flags, ttl, now)?;
        self.admit(&mut guard, element.memory_len(), now)?;

        let old = guard.cache.replace(key, element.clone())?;
        if let Some(expire) = guard.expire.as_mut() {
            expire.delete(&old);
        }
        self.release(&old);
        guard.memory = guard.memory.saturating_sub(old.memory_len());

        if let Some(backend) = guard.backend.as_mut() {
            backend.replace(key, element.clone())?;
        }
        if let Some(expire) = guard.expire.as_mut() {
            expire.insert(element.clone());
        }
        guard.memory += element.memory_len();
        Ok(())
    }

    /// Look up `key`. Consults the Cache first; on miss, and if a
    /// Backend is configured, hoists a fresh copy into the Cache.
    /// Expired (non-persistent) elements are reported absent without
    /// being deleted.
    pub fn lookup(&self, key: &[u8], now: u64) -> Result<Option<Arc<Element>>, StorageError> {
        {
            let guard = self.inner.read();
            if let Some(element) = guard.cache.lookup(key) {
                if element.is_expired(now) {
                    return Ok(None);
                }
                return Ok(Some(element));
            }
        }

        // Miss: escalate to exclusive only if a Backend might answer.
        let mut guard = self.inner.write();
        if let Some(element) = guard.cache.lookup(key) {
            // Someone else populated it between the two locks.
            if element.is_expired(now) {
                return Ok(None);
            }
            return Ok(Some(element));
        }
        let Some(backend) = guard.backend.as_ref() else {
            return Ok(None);
        };
        let fresh = backend.lookup(key)?;
        let Some(fresh) = fresh else {
            return Ok(None);
        };
        if fresh.is_expired(now) {
            return Ok(None);
        }
        let element = Arc::new(fresh);
        self.insert_locked(&mut guard, key, element.clone(), false, now)?;
        Ok(Some(element))
    }

    /// Remove `key` from the Cache and Backend, notify Expire, and
    /// return the detached element.
    pub fn delete(&self, key: &[u8]) -> Result<Option<Arc<Element>>, StorageError> {
        let mut guard = self.inner.write();
        let Some(element) = guard.cache.steal(key) else {
            return Ok(None);
        };
        if let Some(expire) = guard.expire.as_mut() {
            expire.delete(&element);
        }
        self.release(&element);
        if let Some(backend) = guard.backend.as_mut() {
            backend.delete(key)?;
        }
        guard.elts = guard.elts.saturating_sub(1);
        guard.memory = guard.memory.saturating_sub(element.memory_len());
        Ok(Some(element))
    }

    /// Tear down Cache, then Backend, then Expire, in that order. Any
    /// element still `DIRTY` is hoisted to the Backend first, so a
    /// write that never went through `insert`/`replace` (for example an
    /// in-place array mutation marking `DIRTY` by hand) isn't silently
    /// dropped when the Cache's own reference goes away.
    pub fn destroy(&self) -> Result<(), StorageError> {
        let mut guard = self.inner.write();
        if let Some(backend) = guard.backend.as_mut() {
            for element in guard.cache.iter() {
                if element.flags().contains(ElementFlags::DIRTY) {
                    backend.replace(&element.key(), element.clone())?;
                }
            }
        }
        guard.cache.destroy();
        if let Some(backend) = guard.backend.as_mut() {
            backend.destroy()?;
        }
        if let Some(expire) = guard.expire.as_mut() {
            expire.destroy();
        }
        guard.elts = 0;
        guard.memory = 0;
        Ok(())
    }

    /// Install an element whose value is `slot_size` (one machine word)
    /// followed by `data`, tagged `ARRAY`.
    pub fn insert_array(
        &self,
        key: &[u8],
        slot_size: u32,
        data: &[u8],
        flags: ElementFlags,
        ttl: u32,
        now: u64,
    ) -> Result<(), StorageError> {
        let mut guard = self.inner.write();
        guard.cache.validate_key(key)?;
        let element = Arc::new(Element::new_array(key, slot_size, data, now, ttl, crate::cache::case_insensitive_hash(key), flags)?);
        self.insert_locked(&mut guard, key, element, true, now)
    }

    /// Overwrite the slot at `index` in place.
    pub fn set_array(&self, key: &[u8], index: usize, data: &[u8], now: u64) -> Result<(), StorageError> {
        let guard = self.inner.write();
        let element = guard.cache.lookup(key).ok_or(StorageError::NotFound)?;
        if element.is_expired(now) {
            return Err(StorageError::NotFound);
        }
        element.set_slot(index, data)
    }

    /// Read the slot at `index`.
    pub fn get_array(&self, key: &[u8], index: usize, now: u64) -> Result<Vec<u8>, StorageError> {
        let guard = self.inner.read();
        let element = guard.cache.lookup(key).ok_or(StorageError::NotFound)?;
        if element.is_expired(now) {
            return Err(StorageError::NotFound);
        }
        element.get_slot(index)
    }

    fn build_element(
        &self,
        guard: &Inner,
        key: &[u8],
        value: &[u8],
        flags: ElementFlags,
        ttl: u32,
        now: u64,
    ) -> Result<Arc<Element>, StorageError> {
        guard.cache.validate_key(key)?;
        let hash = crate::cache::case_insensitive_hash(key);
        let element = Element::new(key, value, now, ttl, hash, flags)?;
        Ok(Arc::new(element))
    }

    /// Pre-existing-key policy, eviction gate, and the fixed
    /// Expire-delete-old → Cache-steal/insert → Backend-notify →
    /// Expire-insert-new → accounting ordering within one critical
    /// section.
    fn insert_locked(
        &self,
        guard: &mut Inner,
        key: &[u8],
        element: Arc<Element>,
        notify_backend: bool,
        now: u64,
    ) -> Result<(), StorageError> {
        self.admit(guard, element.memory_len(), now)?;

        if let Some(old) = guard.cache.lookup(key) {
            if let Some(expire) = guard.expire.as_mut() {
                expire.delete(&old);
            }
            let stolen = guard.cache.steal(key).expect("just confirmed present under the same lock");
            guard.elts = guard.elts.saturating_sub(1);
            guard.memory = guard.memory.saturating_sub(stolen.memory_len());
            self.release(&stolen);
        }

        guard.cache.insert(element.clone());

        if notify_backend {
            if let Some(backend) = guard.backend.as_mut() {
                backend.insert(key, element.clone())?;
            }
        }

        if let Some(expire) = guard.expire.as_mut() {
            expire.insert(element.clone());
        }

        guard.elts += 1;
        guard.memory += element.memory_len();
        Ok(())
    }

    /// Release a detached element per the dirty rule: a dirty element
    /// stays alive (the Backend holds its own `Arc`); a clean one is
    /// simply dropped here.
    fn release(&self, element: &Arc<Element>) {
        if element.flags().contains(ElementFlags::DIRTY) {
            element.insert_flag(ElementFlags::NEED_FREE);
        }
    }

    /// Eviction gate: while the caps would be exceeded by admitting
    /// `new_len` more bytes and one more element, drive Expire. Always
    /// forces eviction, since a non-forced gate can never make progress
    /// against an all-persistent or all-dirty storage, which scenarios
    /// demand succeed; see `DESIGN.md`.
    fn admit(&self, guard: &mut Inner, new_len: usize, now: u64) -> Result<(), StorageError> {
        if self.max_memory > 0 && new_len > self.max_memory {
            return Err(StorageError::ValueTooLarge {
                len: new_len,
                max_memory: self.max_memory,
            });
        }

        let mut steps = 0;
        while self.over_capacity(guard, new_len) {
            if steps >= MAX_EXPIRE_STEPS {
                return Err(StorageError::EvictionBudgetExhausted { steps });
            }
            let Some(expire) = guard.expire.as_mut() else {
                return Err(StorageError::EvictionBudgetExhausted { steps });
            };
            let outcome = expire.step(now, true, guard.cache.as_mut());
            guard.elts = guard.elts.saturating_sub(outcome.freed_elements);
            guard.memory = guard.memory.saturating_sub(outcome.freed_memory);
            steps += 1;
        }
        Ok(())
    }

    fn over_capacity(&self, guard: &Inner, new_len: usize) -> bool {
        (self.max_memory > 0 && guard.memory + new_len > self.max_memory) || (self.max_elts > 0 && guard.elts >= self.max_elts)
    }
}

/// Configures and builds a [`Storage`]: a consuming builder with
/// `set_*` methods and a fallible `.build()`.
pub struct StorageBuilder {
    name: Option<String>,
    max_elts: usize,
    max_memory: usize,
    cache: Option<Box<dyn Cache>>,
    expire: Option<Box<dyn Expire>>,
    backend: Option<Box<dyn Backend>>,
}

impl Default for StorageBuilder {
    fn default() -> Self {
        StorageBuilder {
            name: None,
            max_elts: 0,
            max_memory: 0,
            cache: None,
            expire: Some(Box::new(LruExpire::new())),
            backend: None,
        }
    }
}

impl StorageBuilder {
    pub fn new() -> StorageBuilder {
        StorageBuilder::default()
    }

    pub fn set_name(mut self, name: impl Into<String>) -> StorageBuilder {
        self.name = Some(name.into());
        self
    }

    pub fn set_max_elts(mut self, max_elts: usize) -> StorageBuilder {
        self.max_elts = max_elts;
        self
    }

    pub fn set_max_memory(mut self, max_memory: usize) -> StorageBuilder {
        self.max_memory = max_memory;
        self
    }

    pub fn set_cache(mut self, cache: Box<dyn Cache>) -> StorageBuilder {
        self.cache = Some(cache);
        self
    }

    /// Replace the default `LruExpire`, or pass `None` to run without
    /// an eviction policy (insertions beyond caps will then always fail
    /// once caps are reached).
    pub fn set_expire(mut self, expire: Option<Box<dyn Expire>>) -> StorageBuilder {
        self.expire = expire;
        self
    }

    pub fn set_backend(mut self, backend: Box<dyn Backend>) -> StorageBuilder {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<Storage, BuildError> {
        let id = NEXT_ID.fetch_add(1, AtomicOrdering::Relaxed);
        let name = self.name.unwrap_or_else(|| id.to_string());
        let mut cache = self.cache.unwrap_or_else(|| Box::new(HashCache::new()));
        cache.init();
        let mut expire = self.expire;
        if let Some(expire) = expire.as_mut() {
            expire.init();
        }
        let mut backend = self.backend;
        if let Some(backend) = backend.as_mut() {
            backend.init()?;
        }
        Ok(Storage {
            id,
            name,
            max_elts: self.max_elts,
            max_memory: self.max_memory,
            inner: RwLock::new(Inner {
                cache,
                expire,
                backend,
                elts: 0,
                memory: 0,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::cache::radix::RadixCache;

    #[test]
    fn basic_ttl_expiry() {
        let storage = Storage::builder()
            .set_max_memory(1 << 20)
            .set_max_elts(1024)
            .build()
            .unwrap();
        storage.insert(b"k", b"v", ElementFlags::empty(), 1, 0).unwrap();
        assert_eq!(storage.lookup(b"k", 0).unwrap().unwrap().value(), b"v");
        assert!(storage.lookup(b"k", 2).unwrap().is_none());
    }

    #[test]
    fn forced_eviction_on_full_storage() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let storage = Storage::builder().set_max_elts(2).build().unwrap();
        storage.insert(b"k1", b"v", ElementFlags::empty(), 0, 0).unwrap();
        storage.insert(b"k2", b"v", ElementFlags::empty(), 0, 0).unwrap();
        storage.insert(b"k3", b"v", ElementFlags::empty(), 0, 0).unwrap();
        assert_eq!(storage.elts(), 2);
        assert!(storage.lookup(b"k3", 0).unwrap().is_some());
    }

    #[test]
    fn array_mutation_round_trip() {
        let storage = Storage::builder().build().unwrap();
        let data: Vec<u8> = vec![1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0];
        storage.insert_array(b"arr", 4, &data, ElementFlags::empty(), 0, 0).unwrap();
        assert_eq!(storage.get_array(b"arr", 1, 0).unwrap(), vec![2, 0, 0, 0]);
        storage.set_array(b"arr", 1, &[9, 0, 0, 0], 0).unwrap();
        assert_eq!(storage.get_array(b"arr", 1, 0).unwrap(), vec![9, 0, 0, 0]);
        assert!(storage.set_array(b"arr", 5, &[0, 0, 0, 0], 0).is_err());
    }

    #[test]
    fn ipv4_radix_cache_rejects_bogus_keys() {
        let storage = Storage::builder().set_cache(Box::new(RadixCache::new())).build().unwrap();
        storage.insert(b"10.0.0.1", b"a", ElementFlags::empty(), 0, 0).unwrap();
        storage.insert(b"10.0.0.2", b"b", ElementFlags::empty(), 0, 0).unwrap();
        assert!(storage.insert(b"bogus", b"c", ElementFlags::empty(), 0, 0).is_err());
        assert_eq!(storage.lookup(b"10.0.0.1", 0).unwrap().unwrap().value(), b"a");
    }

    #[test]
    fn dirty_element_survives_eviction_until_backend_drains() {
        let backend = Box::new(MemoryBackend::new());
        let storage = Storage::builder().set_max_elts(1).set_backend(backend).build().unwrap();
        storage.insert(b"k", b"v", ElementFlags::empty(), 0, 0).unwrap();
        let held = storage.lookup(b"k", 0).unwrap().unwrap();
        held.insert_flag(ElementFlags::DIRTY);

        storage.insert(b"k2", b"v2", ElementFlags::empty(), 0, 0).unwrap();
        assert!(storage.lookup(b"k", 0).unwrap().is_none());
        assert!(held.flags().contains(ElementFlags::NEED_FREE));
        assert!(held.flags().contains(ElementFlags::DIRTY));
    }

    #[test]
    fn delete_round_trip() {
        let storage = Storage::builder().build().unwrap();
        storage.insert(b"k", b"v", ElementFlags::empty(), 0, 0).unwrap();
        let deleted = storage.delete(b"k").unwrap().unwrap();
        assert_eq!(deleted.value(), b"v");
        assert!(storage.lookup(b"k", 0).unwrap().is_none());
        assert_eq!(storage.elts(), 0);
    }

    #[test]
    fn idempotent_reinsert_keeps_single_entry() {
        let storage = Storage::builder().build().unwrap();
        storage.insert(b"k", b"v", ElementFlags::empty(), 0, 0).unwrap();
        let memory_after_first = storage.memory();
        storage.insert(b"k", b"v", ElementFlags::empty(), 0, 0).unwrap();
        assert_eq!(storage.elts(), 1);
        assert_eq!(storage.memory(), memory_after_first);
    }

    #[test]
    fn value_over_max_memory_fails_without_evicting() {
        let storage = Storage::builder().set_max_memory(8).build().unwrap();
        assert!(storage.insert(b"k", b"a much too large value for this cap", ElementFlags::empty(), 0, 0).is_err());
        assert_eq!(storage.elts(), 0);
    }

    #[test]
    fn replace_fails_if_absent() {
        let storage = Storage::builder().build().unwrap();
        assert!(matches!(
            storage.replace(b"missing", b"v", ElementFlags::empty(), 0, 0),
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn replace_swaps_value_without_changing_elts() {
        let backend = Box::new(MemoryBackend::new());
        let storage = Storage::builder().set_backend(backend).build().unwrap();
        storage.insert(b"k", b"old", ElementFlags::empty(), 0, 0).unwrap();
        storage.replace(b"k", b"new", ElementFlags::empty(), 0, 0).unwrap();
        assert_eq!(storage.elts(), 1);
        assert_eq!(storage.lookup(b"k", 0).unwrap().unwrap().value(), b"new");
    }

    /// Backend double that only records calls to `replace`, so a test
    /// can tell a hand-off from an ordinary `insert`.
    #[derive(Clone, Default)]
    struct RecordingBackend {
        replaced: Arc<std::sync::Mutex<Vec<Vec<u8>>>>,
    }

    impl Backend for RecordingBackend {
        fn insert(&mut self, _key: &[u8], _element: Arc<Element>) -> Result<(), crate::error::BackendError> {
            Ok(())
        }

        fn replace(&mut self, key: &[u8], _element: Arc<Element>) -> Result<(), crate::error::BackendError> {
            self.replaced.lock().unwrap().push(key.to_vec());
            Ok(())
        }

        fn lookup(&self, _key: &[u8]) -> Result<Option<Element>, crate::error::BackendError> {
            Ok(None)
        }

        fn delete(&mut self, _key: &[u8]) -> Result<(), crate::error::BackendError> {
            Ok(())
        }

        fn destroy(&mut self) -> Result<(), crate::error::BackendError> {
            Ok(())
        }
    }

    #[test]
    fn destroy_hands_dirty_elements_to_backend() {
        let recorder = RecordingBackend::default();
        let replaced = recorder.replaced.clone();
        let storage = Storage::builder().set_backend(Box::new(recorder)).build().unwrap();

        storage.insert(b"k", b"v", ElementFlags::empty(), 0, 0).unwrap();
        let held = storage.lookup(b"k", 0).unwrap().unwrap();
        held.insert_flag(ElementFlags::DIRTY); // simulate a write the backend never saw

        storage.destroy().unwrap();
        assert!(replaced.lock().unwrap().contains(&b"k".to_vec()));
    }
}
