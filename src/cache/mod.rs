//! Concurrent typed cache
//!
//! [`TypedCache`] is a reader/writer-locked map with a single-flight
//! `get_or_compute`. Share it between threads (or pool workers) with `Arc`.
//!
//! ```rust
//! use rust_cache_pool::TypedCache;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let cache = Arc::new(TypedCache::new());
//! let writer = {
//!     let cache = Arc::clone(&cache);
//!     thread::spawn(move || cache.put("k", 1))
//! };
//! writer.join().unwrap();
//! assert_eq!(cache.get(&"k"), Some(1));
//! ```

mod claim;
mod stats;
mod typed_cache;

pub use stats::CacheStatsSnapshot;
pub use typed_cache::TypedCache;
