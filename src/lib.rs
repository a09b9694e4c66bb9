//! # Rust Cache Pool
//!
//! Two small concurrency primitives that compose well:
//!
//! - **[`TypedCache`]**: a generic, reader/writer-locked key/value cache whose
//!   `get_or_compute` runs at most one computation per key at a time
//! - **[`WorkerPool`]**: a fixed set of worker threads that pull jobs from a
//!   bounded input stream, transform them, and emit tagged results onto an
//!   output stream, with graceful draining and cooperative cancellation
//!
//! The two share no state. Workers may capture an `Arc<TypedCache>` in their
//! transform to memoize or share intermediate values.
//!
//! ## Quick Start
//!
//! ```rust
//! use rust_cache_pool::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let cache: Arc<TypedCache<u64, u64>> = Arc::new(TypedCache::new());
//! let memo = Arc::clone(&cache);
//!
//! let pool = WorkerPool::new(4, move |x: u64| {
//!     memo.get_or_compute(x, || Ok::<_, String>(x * x))
//! })?;
//! let results = pool.results();
//! pool.start()?;
//!
//! for x in [3, 4, 3, 4] {
//!     pool.submit(x)?;
//! }
//! pool.shutdown()?;
//!
//! let mut squares: Vec<u64> = results.iter().filter_map(|r| r.into_result().ok()).collect();
//! squares.sort();
//! assert_eq!(squares, vec![9, 9, 16, 16]);
//! assert_eq!(cache.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancellation
//!
//! ```rust
//! use rust_cache_pool::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let config = PoolConfig::new(2).with_input_capacity(4);
//! let pool = WorkerPool::with_config(config, |x: u32| {
//!     std::thread::sleep(Duration::from_millis(5));
//!     Ok::<_, String>(x)
//! })?;
//! pool.start()?;
//! pool.submit(1)?;
//!
//! pool.cancel();
//! assert!(pool.submit(2).is_err());
//! pool.wait()?;
//! assert_eq!(pool.state(), PoolState::Stopped);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod core;
pub mod pool;
pub mod prelude;
pub mod queue;

pub use crate::cache::{CacheStatsSnapshot, TypedCache};
pub use crate::core::{
    CancellationReason, CancellationToken, JobId, JobResult, PipelineError, Result,
};
pub use crate::pool::{PoolConfig, PoolState, PoolStats, ResultReceiver, WorkerPool, WorkerStats};
