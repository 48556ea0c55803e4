//! Persistent icon cache.
//!
//! - [`PersistentCacheStore`]: the key → icon path map, mirrored to disk with
//!   debounced saves
//! - atomic file helpers shared by every component that publishes files

mod atomic;
mod store;

pub use atomic::{
    atomic_read_json, atomic_write_bytes, atomic_write_json, atomic_write_png, atomic_write_with,
};
pub use store::{CacheEntry, PersistentCacheStore, StoreStats};
