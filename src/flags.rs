//! Per-element flag bits.
//!
//! A real bitflags type rather than loose bits on a raw integer, so a
//! caller can't construct a flag set with garbage bits; the bit layout
//! still matches the wire header in [`crate::element`].

use bitflags::bitflags;

bitflags! {
    /// Flags carried on every [`crate::element::Element`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ElementFlags: u8 {
        /// `expire == 0`: exempt from time-based eviction. Eviction may
        /// still drop it if `step` is called with `forced = true`.
        const PERSISTENT = 0b0001;
        /// Enqueued for an asynchronous backend write. Must not be
        /// freed while this bit is set.
        const DIRTY = 0b0010;
        /// Logically removed while still `DIRTY`; the backend frees it
        /// once the pending write completes.
        const NEED_FREE = 0b0100;
        /// The value's first machine word is a slot-size prefix
        /// followed by fixed-size slots.
        const ARRAY = 0b1000;
    }
}

impl ElementFlags {
    /// Flags for a freshly inserted element given the caller's
    /// requested flags and TTL. `PERSISTENT` is implied by `ttl == 0`
    /// regardless of what the caller passed.
    pub fn for_insert(requested: ElementFlags, ttl: u32) -> ElementFlags {
        let mut flags = requested;
        if ttl == 0 {
            flags |= ElementFlags::PERSISTENT;
        }
        flags
    }
}
