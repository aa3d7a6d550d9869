use kvstorage::backend::memory::MemoryBackend;
use kvstorage::{ElementFlags, Storage};

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
    let storage = Storage::builder().set_max_elts(2).build().unwrap();

    storage.insert(b"k1", b"v", ElementFlags::empty(), 0, 0).unwrap();
    storage.insert(b"k2", b"v", ElementFlags::empty(), 0, 0).unwrap();
    storage.insert(b"k3", b"v", ElementFlags::empty(), 0, 0).unwrap();

    assert_eq!(storage.elts(), 2);
    assert!(storage.lookup(b"k3", 0).unwrap().is_some());
}

#[test]
fn dirty_element_survives_eviction_until_backend_drains() {
    let backend = MemoryBackend::default();
    let storage = Storage::builder()
        .set_max_elts(1)
        .set_backend(Box::new(backend))
        .build()
        .unwrap();

    storage.insert(b"k", b"v", ElementFlags::empty(), 0, 0).unwrap();
    // Forces eviction of "k"; the backend never drained it, so it must
    // have been stolen (carrying NEED_FREE) rather than dropped.
    storage.insert(b"k2", b"v", ElementFlags::empty(), 0, 0).unwrap();

    assert_eq!(storage.elts(), 1);
}

#[test]
fn delete_round_trip() {
    let storage = Storage::builder().build().unwrap();

    storage.insert(b"k", b"v", ElementFlags::empty(), 0, 0).unwrap();
    storage.delete(b"k").unwrap();

    assert!(storage.lookup(b"k", 0).unwrap().is_none());
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
    let storage = Storage::builder().set_max_memory(40).build().unwrap();

    storage.insert(b"k", b"v", ElementFlags::empty(), 0, 0).unwrap();
    let huge_value = vec![0u8; 200];
    let result = storage.insert(b"huge-key-here", &huge_value, ElementFlags::empty(), 0, 0);

    assert!(result.is_err());
    assert!(storage.lookup(b"k", 0).unwrap().is_some());
}
