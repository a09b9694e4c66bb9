//! Convenient re-exports for common types and traits

pub use crate::cache::TypedCache;
pub use crate::core::{CancellationToken, JobId, JobResult, PipelineError, Result};
pub use crate::pool::{PoolConfig, PoolState, ResultReceiver, WorkerPool};
