//! Chooses which element to drop under memory or element-count
//! pressure.
//!
//! `Expire` is polymorphic over {`insert`, `step`, `delete`, `destroy`,
//! optional `init`}. The one mandatory
//! variant is [`lru::LruExpire`].

pub mod lru;

use std::sync::Arc;

use crate::cache::Cache;
use crate::element::Element;

/// Result of one `Expire::step` call. The façade uses this to decide
/// whether an eviction attempt made progress (and to update its own
/// `elts`/`memory` counters) or whether to count the attempt against
/// `MAX_EXPIRE_STEPS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    pub freed_elements: usize,
    pub freed_memory: usize,
}

impl StepOutcome {
    pub const NOTHING: StepOutcome = StepOutcome {
        freed_elements: 0,
        freed_memory: 0,
    };

    pub fn made_progress(&self) -> bool {
        self.freed_elements > 0
    }
}

/// The eviction-policy capability `Storage` depends on.
pub trait Expire: Send {
    /// Track a newly inserted element (append at the tail of whatever
    /// order this policy keeps).
    fn insert(&mut self, element: Arc<Element>);

    /// Stop tracking `element` (the façade calls this before a
    /// replace/delete so the queue never holds a pointer to an element
    /// it will steal from the cache).
    fn delete(&mut self, element: &Arc<Element>);

    /// Update this policy's state to reflect that `element` was just
    /// accessed. No-op by default; `LruExpire` promotes to the tail.
    fn touch(&mut self, _element: &Arc<Element>) {}

    /// Try to make room. Steals whatever it evicts from `cache`, and
    /// returns how much was freed. See `lru::LruExpire::step` for the
    /// exact rule this implements.
    fn step(&mut self, now: u64, forced: bool, cache: &mut dyn Cache) -> StepOutcome;

    fn destroy(&mut self);

    fn init(&mut self) {}

    fn len(&self) -> usize;
}
