use kvstorage::cache::radix::RadixCache;
use kvstorage::{ElementFlags, Storage};

#[test]
fn ipv4_radix_cache_rejects_bogus_keys() {
    let storage = Storage::builder().set_cache(Box::new(RadixCache::new())).build().unwrap();

    storage.insert(b"10.0.0.1", b"a", ElementFlags::empty(), 0, 0).unwrap();
    storage.insert(b"10.0.0.2", b"b", ElementFlags::empty(), 0, 0).unwrap();
    assert!(storage.insert(b"bogus", b"c", ElementFlags::empty(), 0, 0).is_err());

    assert_eq!(storage.lookup(b"10.0.0.1", 0).unwrap().unwrap().value(), b"a");
    assert_eq!(storage.elts(), 2);
}
