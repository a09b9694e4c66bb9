//! Streaming worker pool and its workers

pub mod config;
pub mod worker;
pub mod worker_pool;

pub use config::PoolConfig;
pub use worker::{Worker, WorkerStats};
pub use worker_pool::{PoolState, PoolStats, ResultReceiver, WorkerPool};
