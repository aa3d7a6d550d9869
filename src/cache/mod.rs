//! The index mapping keys to elements.
//!
//! A `Cache` is polymorphic over {`insert`, `lookup`, `replace`,
//! `delete`, `steal`, `destroy`, optional `init`}. Implementations hold no elements through
//! any lifetime decision of their own: every element is `Arc<Element>`,
//! shared with the `Expire` queue and, while dirty, the `Backend`'s
//! pending-write bookkeeping. A cache only ever inserts, looks up, or
//! unlinks its own reference.

pub mod hash;
pub mod radix;
pub mod trie;

use std::sync::Arc;

use crate::element::Element;
use crate::error::StorageError;

/// The index capability `Storage` depends on.
pub trait Cache: Send {
    /// Install `element` under its key, stealing and returning any
    /// prior entry for that key.
    fn insert(&mut self, element: Arc<Element>) -> Option<Arc<Element>>;

    /// Look up an element by key without touching its lifetime in any
    /// eviction order (that's `Expire`'s job).
    fn lookup(&self, key: &[u8]) -> Option<Arc<Element>>;

    /// Replace the element stored for `key`, returning the old one.
    /// Fails with [`StorageError::NotFound`] if `key` is absent.
    fn replace(&mut self, key: &[u8], element: Arc<Element>) -> Result<Arc<Element>, StorageError>;

    /// Detach the element for `key` from the index without freeing it.
    /// This is the primitive eviction and the façade's delete path use;
    /// it never drops the last strong reference itself.
    fn steal(&mut self, key: &[u8]) -> Option<Arc<Element>>;

    /// Remove `key` from the index. Default implementation is `steal`;
    /// a cache may override this if its backing structure makes a
    /// distinct removal path cheaper.
    fn delete(&mut self, key: &[u8]) -> Option<Arc<Element>> {
        self.steal(key)
    }

    /// Drop every entry. Elements already referenced elsewhere (for
    /// example a dirty element still queued at a backend) survive this
    /// call; only the cache's own references go away.
    fn destroy(&mut self);

    /// Hook for caches that need to prepare backing storage. No-op by
    /// default.
    fn init(&mut self) {}

    /// Reject keys this cache variant cannot index before the façade
    /// builds an `Element` for them. [`hash::HashCache`] and
    /// [`trie::TrieCache`] accept any byte string; [`radix::RadixCache`]
    /// rejects anything that doesn't parse as an IPv4 dotted quad.
    fn validate_key(&self, _key: &[u8]) -> Result<(), StorageError> {
        Ok(())
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All elements currently reachable through this cache. Used to
    /// check the `elts`/`memory` invariants and by the façade's
    /// `destroy()` to hand remaining elements to the backend.
    fn iter(&self) -> Vec<Arc<Element>>;
}

/// Case-insensitive hash of a key, shared by [`hash::HashCache`] and
/// used as the `Element::hash` field for any cache variant that wants
/// a cheap equality pre-check.
pub fn case_insensitive_hash(key: &[u8]) -> u32 {
    // FNV-1a over the lowercased key. Matches the "precomputed
    // case-insensitive hash" the element model requires without
    // pulling in a hashing crate just for this.
    let mut hash: u32 = 0x811c_9dc5;
    for &b in key {
        let lower = b.to_ascii_lowercase();
        hash ^= lower as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
