//! Least-recently-used eviction, threaded through every element via an
//! explicit order list. `VecDeque` plus identity lookups gives ordering
//! semantics equivalent to an intrusive doubly-linked queue without
//! unsafe links, reordered with a linear scan on access.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::cache::Cache;
use crate::element::Element;
use crate::expire::{Expire, StepOutcome};
use crate::flags::ElementFlags;

/// `Expire` variant ordering elements oldest-to-newest. `step` evicts
/// from the head.
#[derive(Default)]
pub struct LruExpire {
    /// Front = oldest (next to evict), back = most recently
    /// inserted/touched.
    order: VecDeque<Arc<Element>>,
}

impl LruExpire {
    pub fn new() -> LruExpire {
        LruExpire::default()
    }

    fn position(&self, element: &Arc<Element>) -> Option<usize> {
        self.order.iter().position(|e| Arc::ptr_eq(e, element))
    }
}

impl Expire for LruExpire {
    fn insert(&mut self, element: Arc<Element>) {
        self.order.push_back(element);
    }

    fn delete(&mut self, element: &Arc<Element>) {
        if let Some(i) = self.position(element) {
            self.order.remove(i);
        }
    }

    fn touch(&mut self, element: &Arc<Element>) {
        if let Some(i) = self.position(element) {
            let e = self.order.remove(i).expect("index just found");
            self.order.push_back(e);
        }
    }

    fn step(&mut self, now: u64, forced: bool, cache: &mut dyn Cache) -> StepOutcome {
        let mut freed_elements = 0;
        let mut freed_memory = 0;

        loop {
            let Some(head) = self.order.front().cloned() else {
                break;
            };
            let flags = head.flags();
            let blocked = flags.contains(ElementFlags::PERSISTENT) || flags.contains(ElementFlags::DIRTY);
            if blocked && !forced {
                break;
            }

            let head_expired = head.is_expired(now);
            // On the first element of a run we always proceed (either
            // it's expired, or nothing is and it's the oldest
            // candidate, or `forced` overrides the persistent/dirty
            // gate). Once we're past the first element, only keep
            // batching while the run is genuinely expired elements —
            // don't cascade-evict unrelated live elements just because
            // the head happened to go.
            if freed_elements > 0 && !head_expired {
                break;
            }

            self.order.pop_front();
            let key = head.key();
            let stolen = cache.steal(&key);
            debug_assert!(stolen.is_some(), "expire queue held a key the cache no longer has");

            if flags.contains(ElementFlags::DIRTY) {
                // Backend still owns a clone; it frees the element when
                // it drains the write. Accounting still drops now,
                // since `elts`/`memory` track what the cache reports
                // reachable, not physical allocation.
                head.insert_flag(ElementFlags::NEED_FREE);
                tracing::debug!(size = head.memory_len(), "evicted dirty element, deferring free to backend");
            }

            freed_elements += 1;
            freed_memory += head.memory_len();

            if !forced && !head_expired {
                // Non-expired oldest-candidate eviction only ever takes
                // one element per call.
                break;
            }
        }

        StepOutcome {
            freed_elements,
            freed_memory,
        }
    }

    fn destroy(&mut self) {
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}
