//! The unit stored in the index: key, value, and the metadata the
//! façade, caches, and eviction policy all need to agree on.
//!
//! Key and value share one heap allocation (`key_value`), matching the
//! arena-friendly layout the engine is built to preserve: a single
//! allocation per element halves allocator traffic and keeps the key
//! pointer a cache index can alias stable across the element's life.
//!
//! `Element`s are shared through `Arc` between the `Cache` index, the
//! `Expire` queue, and — while dirty — the `Backend`'s pending-write
//! bookkeeping. Every holder
//! of that `Arc` can therefore observe the element concurrently, so the
//! two fields anything ever mutates after construction — `flags` and
//! the value bytes behind an array mutation — use interior mutability
//! rather than requiring exclusive ownership. The façade's own
//! exclusive lock still serializes every *structural* change (insert,
//! replace, delete, eviction); these per-element primitives exist so a
//! `Backend` can clear `DIRTY` from its own thread without taking that
//! lock, and so a shared `Arc<Element>` can still support `set_array`.

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::RwLock;

use crate::error::StorageError;
use crate::flags::ElementFlags;

/// Maximum key length the wire format can address (`u16` length prefix).
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Size in bytes of the per-slot-size prefix on an [`ElementFlags::ARRAY`]
/// value: one machine word, modeled as `u32`.
pub const ARRAY_WORD_SIZE: usize = std::mem::size_of::<u32>();

/// Packed size of the element's wire header:
/// `age: u64, expire: u32, flags: u32, size: u32, keylen: u16, hash: u32`.
pub const WIRE_HEADER_LEN: usize = 8 + 4 + 4 + 4 + 2 + 4;

/// One stored (key, value, metadata) triple.
#[derive(Debug)]
pub struct Element {
    /// `keylen + 1` (NUL-terminated key) bytes followed by `size` bytes
    /// of value, in one allocation.
    key_value: RwLock<Box<[u8]>>,
    keylen: u16,
    size: u32,
    /// Wall-clock seconds at insertion.
    pub age: u64,
    /// TTL in seconds; `0` means persistent.
    pub expire: u32,
    /// Case-insensitive hash of the key.
    pub hash: u32,
    flags: AtomicU8,
}

impl Element {
    pub fn new(
        key: &[u8],
        value: &[u8],
        age: u64,
        expire: u32,
        hash: u32,
        flags: ElementFlags,
    ) -> Result<Element, StorageError> {
        if key.len() > MAX_KEY_LEN || value.len() > u32::MAX as usize {
            return Err(StorageError::EncodingTooLarge);
        }
        let mut buf = Vec::with_capacity(key.len() + 1 + value.len());
        buf.extend_from_slice(key);
        buf.push(0);
        buf.extend_from_slice(value);
        let flags = ElementFlags::for_insert(flags, expire);
        Ok(Element {
            key_value: RwLock::new(buf.into_boxed_slice()),
            keylen: key.len() as u16,
            size: value.len() as u32,
            age,
            expire,
            hash,
            flags: AtomicU8::new(flags.bits()),
        })
    }

    /// Build an [`ElementFlags::ARRAY`] element whose value is
    /// `slot_size` (one machine word) followed by `data`.
    pub fn new_array(
        key: &[u8],
        slot_size: u32,
        data: &[u8],
        age: u64,
        expire: u32,
        hash: u32,
        flags: ElementFlags,
    ) -> Result<Element, StorageError> {
        if slot_size == 0 || data.len() % (slot_size as usize) != 0 {
            return Err(StorageError::SlotSizeMismatch {
                expected: slot_size as usize,
                actual: data.len(),
            });
        }
        let mut value = Vec::with_capacity(ARRAY_WORD_SIZE + data.len());
        value.extend_from_slice(&slot_size.to_ne_bytes());
        value.extend_from_slice(data);
        Element::new(key, &value, age, expire, hash, flags | ElementFlags::ARRAY)
    }

    pub fn key(&self) -> Vec<u8> {
        self.key_value.read()[..self.keylen as usize].to_vec()
    }

    pub fn keylen(&self) -> u16 {
        self.keylen
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn value(&self) -> Vec<u8> {
        let start = self.keylen as usize + 1;
        self.key_value.read()[start..start + self.size as usize].to_vec()
    }

    /// Bytes this element contributes to `Storage::memory`:
    /// `sizeof(header) + keylen + 1 + size`.
    pub fn memory_len(&self) -> usize {
        WIRE_HEADER_LEN + self.keylen as usize + 1 + self.size as usize
    }

    pub fn flags(&self) -> ElementFlags {
        ElementFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub fn set_flags(&self, flags: ElementFlags) {
        self.flags.store(flags.bits(), Ordering::Release);
    }

    pub fn insert_flag(&self, flag: ElementFlags) {
        self.flags.fetch_or(flag.bits(), Ordering::AcqRel);
    }

    pub fn remove_flag(&self, flag: ElementFlags) {
        self.flags.fetch_and(!flag.bits(), Ordering::AcqRel);
    }

    /// `!PERSISTENT ∧ expire > 0 ∧ now − age > expire`
    pub fn is_expired(&self, now: u64) -> bool {
        let flags = self.flags();
        if flags.contains(ElementFlags::PERSISTENT) || self.expire == 0 {
            return false;
        }
        now.saturating_sub(self.age) > self.expire as u64
    }

    pub fn is_array(&self) -> bool {
        self.flags().contains(ElementFlags::ARRAY)
    }

    fn array_slot_size(&self) -> Option<u32> {
        if !self.is_array() || (self.size as usize) < ARRAY_WORD_SIZE {
            return None;
        }
        let value = self.value();
        let bytes: [u8; ARRAY_WORD_SIZE] = value[..ARRAY_WORD_SIZE].try_into().ok()?;
        Some(u32::from_ne_bytes(bytes))
    }

    fn array_slot_count(&self, slot_size: u32) -> usize {
        if slot_size == 0 {
            return 0;
        }
        (self.size as usize - ARRAY_WORD_SIZE) / slot_size as usize
    }

    /// Read the slot at `index`, returning its raw bytes.
    pub fn get_slot(&self, index: usize) -> Result<Vec<u8>, StorageError> {
        let slot_size = self.array_slot_size().ok_or(StorageError::NotAnArray)?;
        let count = self.array_slot_count(slot_size);
        if index >= count {
            return Err(StorageError::IndexOutOfRange { index, len: count });
        }
        let value_start = self.keylen as usize + 1;
        let start = value_start + ARRAY_WORD_SIZE + index * slot_size as usize;
        Ok(self.key_value.read()[start..start + slot_size as usize].to_vec())
    }

    /// Overwrite the slot at `index` in place. Fails if `data.len()`
    /// does not equal the element's slot size, or `index` is out of
    /// range. Never reallocates the element.
    pub fn set_slot(&self, index: usize, data: &[u8]) -> Result<(), StorageError> {
        let slot_size = self.array_slot_size().ok_or(StorageError::NotAnArray)?;
        if data.len() != slot_size as usize {
            return Err(StorageError::SlotSizeMismatch {
                expected: slot_size as usize,
                actual: data.len(),
            });
        }
        let count = self.array_slot_count(slot_size);
        if index >= count {
            return Err(StorageError::IndexOutOfRange { index, len: count });
        }
        let value_start = self.keylen as usize + 1;
        let start = value_start + ARRAY_WORD_SIZE + index * slot_size as usize;
        self.key_value.write()[start..start + slot_size as usize].copy_from_slice(data);
        Ok(())
    }

    /// Serialize to the host-native wire layout: fixed header, then
    /// `keylen + 1` NUL-terminated key bytes, then `size` value bytes.
    /// Not portable across hosts.
    pub fn to_wire(&self) -> Vec<u8> {
        let body = self.key_value.read();
        let mut out = Vec::with_capacity(WIRE_HEADER_LEN + body.len());
        out.extend_from_slice(&self.age.to_ne_bytes());
        out.extend_from_slice(&self.expire.to_ne_bytes());
        out.extend_from_slice(&(self.flags.load(Ordering::Acquire) as u32).to_ne_bytes());
        out.extend_from_slice(&self.size.to_ne_bytes());
        out.extend_from_slice(&self.keylen.to_ne_bytes());
        out.extend_from_slice(&self.hash.to_ne_bytes());
        out.extend_from_slice(&body);
        out
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Element, StorageError> {
        if bytes.len() < WIRE_HEADER_LEN {
            return Err(StorageError::EncodingTooLarge);
        }
        let mut pos = 0;
        let read = |pos: &mut usize, n: usize| -> &[u8] {
            let slice = &bytes[*pos..*pos + n];
            *pos += n;
            slice
        };
        let age = u64::from_ne_bytes(read(&mut pos, 8).try_into().unwrap());
        let expire = u32::from_ne_bytes(read(&mut pos, 4).try_into().unwrap());
        let flags_bits = u32::from_ne_bytes(read(&mut pos, 4).try_into().unwrap());
        let size = u32::from_ne_bytes(read(&mut pos, 4).try_into().unwrap());
        let keylen = u16::from_ne_bytes(read(&mut pos, 2).try_into().unwrap());
        let hash = u32::from_ne_bytes(read(&mut pos, 4).try_into().unwrap());
        let body = &bytes[pos..];
        if body.len() != keylen as usize + 1 + size as usize {
            return Err(StorageError::EncodingTooLarge);
        }
        let flags = ElementFlags::from_bits_truncate(flags_bits as u8);
        let key = &body[..keylen as usize];
        let value = &body[keylen as usize + 1..];
        Element::new(key, value, age, expire, hash, flags)
    }
}
