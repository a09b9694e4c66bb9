//! Job envelopes, transforms and results

use crate::core::error::{PipelineError, Result};
use std::fmt;
use std::sync::Arc;

/// Identifier assigned to a job at submission, unique within one pool
pub type JobId = u64;

/// A type-erased job transform shared by all workers of a pool.
///
/// Errors are flattened to their `Display` text so they can be carried in a
/// [`JobResult`] without constraining the caller's error type.
pub type BoxedTransform<J, R> = Arc<dyn Fn(J) -> std::result::Result<R, String> + Send + Sync>;

/// Wraps a user transform into a [`BoxedTransform`].
pub(crate) fn boxed_transform<J, R, E, F>(transform: F) -> BoxedTransform<J, R>
where
    F: Fn(J) -> std::result::Result<R, E> + Send + Sync + 'static,
    E: fmt::Display,
{
    Arc::new(move |job| transform(job).map_err(|e| e.to_string()))
}

/// A job payload tagged with its id while it travels through the input queue
#[derive(Debug)]
pub(crate) struct Envelope<J> {
    pub(crate) id: JobId,
    pub(crate) payload: J,
}

/// The outcome of one job, emitted on the pool's output stream.
///
/// Exactly one of value or error is present; a failed job is reported here
/// rather than dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult<R> {
    job_id: JobId,
    outcome: Result<R>,
}

impl<R> JobResult<R> {
    pub(crate) fn success(job_id: JobId, value: R) -> Self {
        Self {
            job_id,
            outcome: Ok(value),
        }
    }

    pub(crate) fn failure(job_id: JobId, message: impl Into<String>) -> Self {
        Self {
            job_id,
            outcome: Err(PipelineError::job_failed(job_id, message)),
        }
    }

    /// Id of the job this result belongs to
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Whether the transform succeeded
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Borrow the outcome
    pub fn outcome(&self) -> &Result<R> {
        &self.outcome
    }

    /// Consume the result, yielding the value or the `JobFailed` error
    pub fn into_result(self) -> Result<R> {
        self.outcome
    }
}
