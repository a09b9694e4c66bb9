//! Error types for the cache and the worker pool

/// Result type for cache and pool operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur in the cache or the worker pool
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// A `get_or_compute` computation failed or panicked
    #[error("Cache computation failed: {message}")]
    ComputeFailed {
        /// Error message reported by the compute function
        message: String,
    },

    /// The pool was started more than once
    #[error("Worker pool '{pool_name}' is already started with {worker_count} workers")]
    AlreadyStarted {
        /// Name of the worker pool
        pool_name: String,
        /// Number of worker threads
        worker_count: usize,
    },

    /// The pool no longer accepts jobs
    #[error("Worker pool '{pool_name}' is not accepting jobs (state: {state})")]
    PoolStopped {
        /// Name of the worker pool
        pool_name: String,
        /// State the pool was in when the submission was rejected
        state: String,
    },

    /// The pool was waited on before it was ever started
    #[error("Worker pool '{pool_name}' was never started")]
    NotStarted {
        /// Name of the worker pool
        pool_name: String,
    },

    /// A job's transform returned an error or panicked
    #[error("Job failed (job_id: {job_id}): {message}")]
    JobFailed {
        /// ID of the failed job
        job_id: u64,
        /// Error message
        message: String,
    },

    /// Input queue is at capacity
    #[error("Job queue is full ({capacity} jobs queued)")]
    QueueFull {
        /// Capacity of the input queue
        capacity: usize,
    },

    /// Invalid configuration with parameter
    #[error("Invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Configuration parameter name
        parameter: String,
        /// Error message
        message: String,
    },

    /// Failed to spawn a worker thread
    #[error("Failed to spawn worker thread #{worker_id}: {message}")]
    SpawnError {
        /// ID of the worker that failed to spawn
        worker_id: usize,
        /// Error message
        message: String,
    },

    /// Failed to join a worker thread
    #[error("Failed to join worker thread #{worker_id}: {message}")]
    JoinError {
        /// ID of the worker that failed to join
        worker_id: usize,
        /// Error message
        message: String,
    },

    /// A cancellation token was checked after cancellation
    #[error("Operation cancelled: {reason}")]
    Cancelled {
        /// Reason for cancellation
        reason: String,
    },
}

impl PipelineError {
    /// Create a compute failed error
    pub fn compute_failed(message: impl Into<String>) -> Self {
        PipelineError::ComputeFailed {
            message: message.into(),
        }
    }

    /// Create an already started error
    pub fn already_started(pool_name: impl Into<String>, worker_count: usize) -> Self {
        PipelineError::AlreadyStarted {
            pool_name: pool_name.into(),
            worker_count,
        }
    }

    /// Create a pool stopped error
    pub fn pool_stopped(pool_name: impl Into<String>, state: impl ToString) -> Self {
        PipelineError::PoolStopped {
            pool_name: pool_name.into(),
            state: state.to_string(),
        }
    }

    /// Create a not started error
    pub fn not_started(pool_name: impl Into<String>) -> Self {
        PipelineError::NotStarted {
            pool_name: pool_name.into(),
        }
    }

    /// Create a job failed error
    pub fn job_failed(job_id: u64, message: impl Into<String>) -> Self {
        PipelineError::JobFailed {
            job_id,
            message: message.into(),
        }
    }

    /// Create a queue full error
    pub fn queue_full(capacity: usize) -> Self {
        PipelineError::QueueFull { capacity }
    }

    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a spawn error
    pub fn spawn(worker_id: usize, message: impl Into<String>) -> Self {
        PipelineError::SpawnError {
            worker_id,
            message: message.into(),
        }
    }

    /// Create a join error
    pub fn join(worker_id: usize, message: impl Into<String>) -> Self {
        PipelineError::JoinError {
            worker_id,
            message: message.into(),
        }
    }

    /// Create a cancelled error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        PipelineError::Cancelled {
            reason: reason.into(),
        }
    }
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PipelineError::already_started("main_pool", 8);
        assert!(matches!(err, PipelineError::AlreadyStarted { .. }));

        let err = PipelineError::queue_full(100);
        assert!(matches!(err, PipelineError::QueueFull { .. }));

        let err = PipelineError::job_failed(7, "bad input");
        assert!(matches!(err, PipelineError::JobFailed { job_id: 7, .. }));
    }

    #[test]
    fn test_error_display() {
        let err = PipelineError::already_started("doubler", 4);
        assert_eq!(
            err.to_string(),
            "Worker pool 'doubler' is already started with 4 workers"
        );

        let err = PipelineError::pool_stopped("doubler", "Cancelled");
        assert_eq!(
            err.to_string(),
            "Worker pool 'doubler' is not accepting jobs (state: Cancelled)"
        );

        let err = PipelineError::compute_failed("backend down");
        assert_eq!(err.to_string(), "Cache computation failed: backend down");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(payload.as_ref()), "Unknown panic");
    }
}
