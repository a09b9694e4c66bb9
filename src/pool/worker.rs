//! Worker thread implementation

use crate::core::error::panic_message;
use crate::core::job::Envelope;
use crate::core::{BoxedTransform, CancellationToken, JobResult, PipelineError, Result};
use crate::queue::{recv_or_cancel, send_or_cancel, QueueError};
use crossbeam::channel::{Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::{span, Level};

/// Statistics for a worker thread
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Jobs whose transform succeeded
    pub jobs_processed: AtomicU64,
    /// Jobs whose transform returned an error
    pub jobs_failed: AtomicU64,
    /// Jobs whose transform panicked
    pub jobs_panicked: AtomicU64,
    /// Jobs dropped because the pool was cancelled
    pub jobs_abandoned: AtomicU64,
    /// Total time spent in transforms (microseconds)
    pub total_processing_time_us: AtomicU64,
}

impl WorkerStats {
    /// Create new worker statistics
    pub fn new() -> Self {
        Self::default()
    }

    fn increment_processed(&self) {
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_panicked(&self) {
        self.jobs_panicked.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_abandoned(&self) {
        self.jobs_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    fn add_processing_time(&self, microseconds: u64) {
        self.total_processing_time_us
            .fetch_add(microseconds, Ordering::Relaxed);
    }

    /// Get total jobs processed successfully
    pub fn get_jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    /// Get total jobs failed
    pub fn get_jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Get total jobs panicked
    pub fn get_jobs_panicked(&self) -> u64 {
        self.jobs_panicked.load(Ordering::Relaxed)
    }

    /// Get total jobs abandoned on cancellation
    pub fn get_jobs_abandoned(&self) -> u64 {
        self.jobs_abandoned.load(Ordering::Relaxed)
    }

    /// Get average processing time per job in microseconds
    pub fn get_average_processing_time_us(&self) -> f64 {
        let total = self.total_processing_time_us.load(Ordering::Relaxed);
        let count = self.get_jobs_processed() + self.get_jobs_failed() + self.get_jobs_panicked();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }
}

/// Everything a worker needs to run its loop
pub(crate) struct WorkerContext<J, R> {
    pub(crate) jobs: Receiver<Envelope<J>>,
    pub(crate) results: Sender<JobResult<R>>,
    pub(crate) transform: BoxedTransform<J, R>,
    pub(crate) token: CancellationToken,
}

/// A worker thread pulling jobs from the pool's input queue
#[derive(Debug)]
pub struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a named worker thread.
    ///
    /// The worker exits when the input queue is closed and drained, when the
    /// token is cancelled, or when the output queue has no receivers left.
    pub(crate) fn spawn<J, R>(id: usize, name: String, context: WorkerContext<J, R>) -> Result<Self>
    where
        J: Send + 'static,
        R: Send + 'static,
    {
        let stats = Arc::new(WorkerStats::new());
        let stats_clone = Arc::clone(&stats);

        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || Self::run(id, context, stats_clone))
            .map_err(|e| PipelineError::spawn(id, e.to_string()))?;

        Ok(Self {
            id,
            thread: Some(thread),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Join the worker thread
    pub fn join(mut self) -> Result<()> {
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|p| PipelineError::join(self.id, panic_message(p.as_ref())))?;
        }
        Ok(())
    }

    fn run<J, R>(id: usize, context: WorkerContext<J, R>, stats: Arc<WorkerStats>) {
        #[cfg(feature = "tracing")]
        let worker_span = span!(Level::DEBUG, "worker", id = id);
        #[cfg(feature = "tracing")]
        let _guard = worker_span.enter();

        log::debug!("worker {} started", id);

        let WorkerContext {
            jobs,
            results,
            transform,
            token,
        } = context;

        loop {
            let envelope = match recv_or_cancel(&jobs, &token) {
                Ok(envelope) => envelope,
                Err(QueueError::Disconnected) => {
                    log::debug!("worker {}: input drained", id);
                    break;
                }
                Err(_) => {
                    log::debug!("worker {}: cancelled while idle", id);
                    break;
                }
            };

            if token.is_cancelled() {
                stats.increment_abandoned();
                break;
            }

            let result = Self::execute_job(id, envelope, &transform, &stats);

            match send_or_cancel(&results, result, &token) {
                Ok(()) => {}
                Err(QueueError::Cancelled(_)) => {
                    log::debug!("worker {}: cancelled before result was delivered", id);
                    stats.increment_abandoned();
                    break;
                }
                Err(_) => {
                    log::warn!("worker {}: result stream has no receivers", id);
                    break;
                }
            }
        }

        log::debug!(
            "worker {} exiting (processed: {}, failed: {}, abandoned: {})",
            id,
            stats.get_jobs_processed(),
            stats.get_jobs_failed() + stats.get_jobs_panicked(),
            stats.get_jobs_abandoned()
        );
    }

    /// Run the transform on one job, converting errors and panics into a
    /// failed [`JobResult`].
    fn execute_job<J, R>(
        id: usize,
        envelope: Envelope<J>,
        transform: &BoxedTransform<J, R>,
        stats: &WorkerStats,
    ) -> JobResult<R> {
        let Envelope { id: job_id, payload } = envelope;

        #[cfg(feature = "tracing")]
        let job_span = span!(Level::DEBUG, "job_execution", job_id = job_id);
        #[cfg(feature = "tracing")]
        let _job_guard = job_span.enter();

        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| transform(payload)));
        stats.add_processing_time(start.elapsed().as_micros() as u64);

        match outcome {
            Ok(Ok(value)) => {
                stats.increment_processed();
                JobResult::success(job_id, value)
            }
            Ok(Err(message)) => {
                log::warn!("worker {}: job {} failed: {}", id, job_id, message);
                stats.increment_failed();
                JobResult::failure(job_id, message)
            }
            Err(panic_info) => {
                let message = panic_message(panic_info.as_ref());
                log::error!("worker {}: job {} panicked: {}", id, job_id, message);
                stats.increment_panicked();
                JobResult::failure(job_id, format!("transform panicked: {}", message))
            }
        }
    }
}
