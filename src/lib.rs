//! Bounded in-process key-value storage engine with pluggable index,
//! eviction, and persistence strategies.
//!
//! The core is [`storage::Storage`]: a façade over a [`cache::Cache`]
//! (the index), an optional [`expire::Expire`] (the eviction policy),
//! and an optional [`backend::Backend`] (durable write-behind store).
//! Every element lives in [`element::Element`], shared via `Arc`
//! between whichever of those three components currently reference it.
//!
//! ```
//! use kvstorage::{Storage, ElementFlags};
//!
//! let storage = Storage::builder()
//!     .set_max_elts(1024)
//!     .set_max_memory(1 << 20)
//!     .build()
//!     .unwrap();
//!
//! storage.insert(b"k", b"v", ElementFlags::empty(), 0, 0).unwrap();
//! assert_eq!(storage.lookup(b"k", 0).unwrap().unwrap().value(), b"v");
//! ```

pub mod adaptors;
pub mod backend;
pub mod cache;
pub mod element;
pub mod error;
pub mod expire;
pub mod flags;
pub mod storage;

pub use element::Element;
pub use error::{BackendError, BuildError, StorageError};
pub use flags::ElementFlags;
pub use storage::{Storage, StorageBuilder, MAX_EXPIRE_STEPS};
