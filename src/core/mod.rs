//! Core types shared by the cache and the worker pool

pub mod cancellation;
pub mod error;
pub mod job;

pub use cancellation::{CancellationReason, CancellationToken};
pub use error::{PipelineError, Result};
pub use job::{BoxedTransform, JobId, JobResult};
