//! Worker pool configuration

use crate::core::{PipelineError, Result};

/// Configuration for a [`WorkerPool`](super::WorkerPool)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads (must be greater than 0)
    pub num_workers: usize,
    /// Input queue capacity (0 = synchronous hand-off to a worker)
    pub input_capacity: usize,
    /// Output queue capacity (`None` = unbounded)
    pub output_capacity: Option<usize>,
    /// Thread name prefix, also used as the pool name in errors
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
            // Bounded so a fast producer cannot exhaust memory
            input_capacity: 1024,
            output_capacity: None,
            thread_name_prefix: "pool-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with `num_workers` workers and default queues
    #[must_use]
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Set the input queue capacity
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_input_capacity(mut self, capacity: usize) -> Self {
        self.input_capacity = capacity;
        self
    }

    /// Bound the output queue.
    ///
    /// Workers block once `capacity` results are waiting for a consumer.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = Some(capacity);
        self
    }

    /// Let results accumulate without limit
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn unbounded_output(mut self) -> Self {
        self.output_capacity = None;
        self
    }

    /// Set thread name prefix
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(PipelineError::invalid_config(
                "num_workers",
                "Number of workers must be greater than 0",
            ));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(PipelineError::invalid_config(
                "thread_name_prefix",
                "Thread name prefix must not be empty",
            ));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(PipelineError::invalid_config(
                "thread_name_prefix",
                "Thread name prefix must not contain NUL bytes",
            ));
        }
        Ok(())
    }
}
