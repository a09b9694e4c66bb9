//! Streaming worker pool implementation

use super::config::PoolConfig;
use super::worker::{Worker, WorkerContext, WorkerStats};
use crate::core::job::{boxed_transform, Envelope};
use crate::core::{BoxedTransform, CancellationToken, JobId, JobResult, PipelineError, Result};
use crate::queue::{JobQueue, QueueError};
use crossbeam::channel::Receiver;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Receiving half of a pool's output stream.
///
/// Iterating it yields results until every worker has exited.
pub type ResultReceiver<R> = Receiver<JobResult<R>>;

/// Lifecycle state of a [`WorkerPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum PoolState {
    /// Constructed, workers not yet spawned
    Created = 0,
    /// Workers are pulling jobs
    Running = 1,
    /// Input closed; workers finish buffered jobs then exit
    Draining = 2,
    /// Cancellation fired; workers exit without draining
    Cancelled = 3,
    /// All workers exited and the output stream is closed
    Stopped = 4,
}

impl PoolState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PoolState::Created,
            1 => PoolState::Running,
            2 => PoolState::Draining,
            3 => PoolState::Cancelled,
            _ => PoolState::Stopped,
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Aggregate statistics for a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Current lifecycle state
    pub state: PoolState,
    /// Configured worker count
    pub num_workers: usize,
    /// Jobs accepted by `submit`/`try_submit`
    pub jobs_submitted: u64,
    /// Jobs transformed successfully
    pub jobs_processed: u64,
    /// Jobs whose transform failed or panicked
    pub jobs_failed: u64,
    /// Jobs dropped by cancellation after a worker picked them up
    pub jobs_abandoned: u64,
    /// Jobs buffered in the input queue
    pub jobs_queued: usize,
}

#[derive(Default)]
struct WorkerSet {
    started: bool,
    joining: bool,
    handles: Vec<Worker>,
    stats: Vec<Arc<WorkerStats>>,
}

/// Unwinds a partially started pool
struct StartGuard<'a, J, R> {
    pool: &'a WorkerPool<J, R>,
    armed: bool,
}

impl<J, R> Drop for StartGuard<'_, J, R> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.fire_cancel();
            self.pool.output.close();
        }
    }
}

/// A fixed-size pool of worker threads that streams transformed jobs.
///
/// Jobs go in through [`submit`](Self::submit); every accepted job yields at
/// most one [`JobResult`] on the stream returned by
/// [`results`](Self::results). Results arrive in completion order, not
/// submission order.
///
/// # Lifecycle
///
/// `Created → Running → Draining → Stopped`, or
/// `Running|Draining → Cancelled → Stopped`:
///
/// - [`start`](Self::start) spawns the workers,
/// - [`close`](Self::close) stops intake and lets workers drain the queue,
/// - [`cancel`](Self::cancel) abandons queued and in-flight jobs,
/// - [`wait`](Self::wait) blocks until every worker has exited; the output
///   stream is disconnected by then.
///
/// # Example
///
/// ```rust
/// use rust_cache_pool::prelude::*;
///
/// # fn main() -> Result<()> {
/// let pool = WorkerPool::new(4, |x: u64| Ok::<_, String>(x * 2))?;
/// let results = pool.results();
/// pool.start()?;
///
/// for x in 1..=10 {
///     pool.submit(x)?;
/// }
/// pool.shutdown()?;
///
/// let mut doubled: Vec<u64> = results.iter().map(|r| r.into_result().unwrap()).collect();
/// doubled.sort();
/// assert_eq!(doubled, (1..=10).map(|x| x * 2).collect::<Vec<_>>());
/// # Ok(())
/// # }
/// ```
pub struct WorkerPool<J, R> {
    config: PoolConfig,
    transform: BoxedTransform<J, R>,
    input: JobQueue<Envelope<J>>,
    output: JobQueue<JobResult<R>>,
    token: CancellationToken,
    state: AtomicU8,
    workers: Mutex<WorkerSet>,
    stopped: Mutex<bool>,
    stopped_cv: Condvar,
    next_job_id: AtomicU64,
    total_jobs_submitted: AtomicU64,
}

impl<J, R> fmt::Debug for WorkerPool<J, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("state", &PoolState::from_u8(self.state.load(Ordering::Relaxed)))
            .field(
                "total_jobs_submitted",
                &self.total_jobs_submitted.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl<J, R> WorkerPool<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    /// Create a pool of `num_workers` workers with default queue settings
    pub fn new<F, E>(num_workers: usize, transform: F) -> Result<Self>
    where
        F: Fn(J) -> std::result::Result<R, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        Self::with_config(PoolConfig::new(num_workers), transform)
    }

    /// Create a pool from an explicit configuration
    pub fn with_config<F, E>(config: PoolConfig, transform: F) -> Result<Self>
    where
        F: Fn(J) -> std::result::Result<R, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        config.validate()?;

        let input = JobQueue::bounded(config.input_capacity);
        let output = match config.output_capacity {
            Some(capacity) => JobQueue::bounded(capacity),
            None => JobQueue::unbounded(),
        };

        Ok(Self {
            config,
            transform: boxed_transform(transform),
            input,
            output,
            token: CancellationToken::new(),
            state: AtomicU8::new(PoolState::Created as u8),
            workers: Mutex::new(WorkerSet::default()),
            stopped: Mutex::new(false),
            stopped_cv: Condvar::new(),
            next_job_id: AtomicU64::new(1),
            total_jobs_submitted: AtomicU64::new(0),
        })
    }

    /// Spawn the workers: `Created → Running`.
    ///
    /// # Errors
    ///
    /// - `AlreadyStarted` if called more than once; no extra workers are spawned
    /// - `PoolStopped` if the pool was cancelled before it was started
    /// - `SpawnError` if the OS refuses a thread; the pool is then cancelled
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        if workers.started {
            return Err(PipelineError::already_started(
                &self.config.thread_name_prefix,
                workers.stats.len(),
            ));
        }

        // The token may have been cancelled directly while the state is still Created
        if self.token.is_cancelled()
            || self.transition(PoolState::Created, PoolState::Running).is_err()
        {
            return Err(PipelineError::pool_stopped(
                &self.config.thread_name_prefix,
                self.state(),
            ));
        }
        workers.started = true;

        // Until disarmed, any exit (error or panic) cancels the pool and
        // disconnects the output stream.
        let mut guard = StartGuard {
            pool: self,
            armed: true,
        };

        let results = match self.output.sender() {
            Some(sender) => sender,
            None => {
                return Err(PipelineError::pool_stopped(
                    &self.config.thread_name_prefix,
                    self.state(),
                ))
            }
        };

        for id in 0..self.config.num_workers {
            let context = WorkerContext {
                jobs: self.input.receiver(),
                results: results.clone(),
                transform: Arc::clone(&self.transform),
                token: self.token.clone(),
            };
            let name = format!("{}-{}", self.config.thread_name_prefix, id);

            match Worker::spawn(id, name, context) {
                Ok(worker) => {
                    workers.stats.push(worker.stats());
                    workers.handles.push(worker);
                }
                Err(e) => {
                    log::error!("{}", e);
                    return Err(e);
                }
            }
        }

        // Workers now own every sender; the stream ends when the last one exits
        drop(results);
        self.output.close();
        guard.armed = false;

        log::debug!(
            "pool '{}' started with {} workers",
            self.config.thread_name_prefix,
            self.config.num_workers
        );
        Ok(())
    }

    /// Submit a job, blocking while the input queue is full.
    ///
    /// Returns the id that the job's [`JobResult`] will carry.
    ///
    /// # Errors
    ///
    /// `PoolStopped` unless the pool is `Running`, including when the pool is
    /// cancelled while this call is blocked.
    pub fn submit(&self, job: J) -> Result<JobId> {
        self.ensure_running()?;

        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        self.input
            .send(Envelope { id, payload: job }, &self.token)
            .map_err(|_| self.stopped_error())?;

        self.total_jobs_submitted.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Submit a job without blocking.
    ///
    /// # Errors
    ///
    /// - `QueueFull` if the input queue is at capacity (with a capacity of 0,
    ///   whenever no worker is waiting)
    /// - `PoolStopped` unless the pool is `Running`
    pub fn try_submit(&self, job: J) -> Result<JobId> {
        self.ensure_running()?;

        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        self.input
            .try_send(Envelope { id, payload: job })
            .map_err(|e| match e {
                QueueError::Full(_) => PipelineError::queue_full(self.config.input_capacity),
                _ => self.stopped_error(),
            })?;

        self.total_jobs_submitted.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Stop accepting jobs and let workers drain the queue: `Running → Draining`.
    ///
    /// No-op in any other state.
    pub fn close(&self) {
        if self.transition(PoolState::Running, PoolState::Draining).is_ok() {
            self.input.close();
            log::debug!("pool '{}' draining", self.config.thread_name_prefix);
        }
    }

    /// Fire the cancellation signal. Idempotent.
    ///
    /// Workers exit without finishing queued or in-flight jobs; blocked
    /// submitters return `PoolStopped`.
    pub fn cancel(&self) {
        self.fire_cancel();
        if self.workers.lock().stats.is_empty() {
            // No worker will ever hold a result sender
            self.output.close();
        }
    }

    /// Cancel the pool once `timeout` elapses
    pub fn cancel_after(&self, timeout: Duration) {
        self.token.cancel_after(timeout);
    }

    /// Block until every worker has exited: `→ Stopped`.
    ///
    /// Safe to call from several threads; all of them return once the pool is
    /// stopped. The output stream is disconnected when this returns.
    ///
    /// # Errors
    ///
    /// - `NotStarted` if the pool was never started and is not cancelled
    /// - `JoinError` if a worker thread died outside a job (first caller only)
    pub fn wait(&self) -> Result<()> {
        let handles = {
            let mut workers = self.workers.lock();
            if !workers.started {
                drop(workers);
                if self.token.is_cancelled() {
                    self.output.close();
                    self.mark_stopped();
                    return Ok(());
                }
                return Err(PipelineError::not_started(&self.config.thread_name_prefix));
            }
            if workers.joining {
                None
            } else {
                workers.joining = true;
                Some(std::mem::take(&mut workers.handles))
            }
        };

        let handles = match handles {
            Some(handles) => handles,
            None => {
                // Another caller is joining, or already has
                let mut stopped = self.stopped.lock();
                while !*stopped {
                    self.stopped_cv.wait(&mut stopped);
                }
                return Ok(());
            }
        };

        let mut first_error = None;
        for worker in handles {
            if let Err(e) = worker.join() {
                log::error!("{}", e);
                first_error.get_or_insert(e);
            }
        }

        // Normally closed by `start`; covers a start that never finished
        self.output.close();
        self.mark_stopped();
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close the input and wait for the queue to drain
    pub fn shutdown(&self) -> Result<()> {
        self.close();
        self.wait()
    }

    /// A receiver for the output stream. Every clone competes for results.
    pub fn results(&self) -> ResultReceiver<R> {
        self.output.receiver()
    }

    /// A clone of the pool's cancellation token.
    ///
    /// Cancelling it (or a parent it was derived from) cancels the pool.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> PoolState {
        let state = PoolState::from_u8(self.state.load(Ordering::Acquire));
        match state {
            PoolState::Created | PoolState::Running | PoolState::Draining
                if self.token.is_cancelled() =>
            {
                PoolState::Cancelled
            }
            _ => state,
        }
    }

    /// Configured number of workers
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// Number of worker threads spawned over the pool's lifetime
    pub fn spawned_workers(&self) -> usize {
        self.workers.lock().stats.len()
    }

    /// Jobs buffered in the input queue (approximate)
    pub fn queue_len(&self) -> usize {
        self.input.len()
    }

    /// Total jobs accepted
    pub fn total_jobs_submitted(&self) -> u64 {
        self.total_jobs_submitted.load(Ordering::Relaxed)
    }

    /// Per-worker statistics
    pub fn worker_stats(&self) -> Vec<Arc<WorkerStats>> {
        self.workers.lock().stats.clone()
    }

    /// Aggregate statistics snapshot
    pub fn stats(&self) -> PoolStats {
        let worker_stats = self.worker_stats();
        PoolStats {
            state: self.state(),
            num_workers: self.config.num_workers,
            jobs_submitted: self.total_jobs_submitted(),
            jobs_processed: worker_stats.iter().map(|s| s.get_jobs_processed()).sum(),
            jobs_failed: worker_stats
                .iter()
                .map(|s| s.get_jobs_failed() + s.get_jobs_panicked())
                .sum(),
            jobs_abandoned: worker_stats.iter().map(|s| s.get_jobs_abandoned()).sum(),
            jobs_queued: self.queue_len(),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state() {
            PoolState::Running => Ok(()),
            state => Err(PipelineError::pool_stopped(
                &self.config.thread_name_prefix,
                state,
            )),
        }
    }

    fn stopped_error(&self) -> PipelineError {
        PipelineError::pool_stopped(&self.config.thread_name_prefix, self.state())
    }

    fn transition(&self, from: PoolState, to: PoolState) -> std::result::Result<(), PoolState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(PoolState::from_u8)
    }

    fn mark_stopped(&self) {
        self.state.store(PoolState::Stopped as u8, Ordering::Release);
        let mut stopped = self.stopped.lock();
        *stopped = true;
        self.stopped_cv.notify_all();
        log::debug!("pool '{}' stopped", self.config.thread_name_prefix);
    }
}

impl<J, R> WorkerPool<J, R> {
    /// Move to `Cancelled`, fire the token and close the input. Never takes
    /// the worker lock.
    fn fire_cancel(&self) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let state = PoolState::from_u8(current);
            if matches!(state, PoolState::Cancelled | PoolState::Stopped) {
                break;
            }
            match self.state.compare_exchange(
                current,
                PoolState::Cancelled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    log::debug!(
                        "pool '{}' cancelled while {}",
                        self.config.thread_name_prefix,
                        state
                    );
                    break;
                }
                Err(actual) => current = actual,
            }
        }

        self.token.cancel();
        self.input.close();
    }
}

impl<J, R> Drop for WorkerPool<J, R> {
    fn drop(&mut self) {
        // A live pool is cancelled, not drained: nobody may be reading results.
        let workers = self.workers.get_mut();
        if workers.handles.is_empty() {
            return;
        }
        self.token.cancel();
        self.input.close();
        for worker in std::mem::take(&mut workers.handles) {
            if let Err(e) = worker.join() {
                log::error!(
                    "Failed to stop worker pool '{}' during drop: {}",
                    self.config.thread_name_prefix,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn doubler(num_workers: usize) -> WorkerPool<u64, u64> {
        WorkerPool::new(num_workers, |x: u64| Ok::<_, String>(x * 2))
            .expect("Failed to create pool")
    }

    #[test]
    fn test_pool_creation() {
        let pool = doubler(4);
        assert_eq!(pool.state(), PoolState::Created);
        assert_eq!(pool.num_workers(), 4);
        assert_eq!(pool.spawned_workers(), 0);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = WorkerPool::new(0, |x: u64| Ok::<_, String>(x));
        assert!(matches!(result, Err(PipelineError::InvalidConfig { .. })));
    }

    #[test]
    fn test_submit_before_start_fails() {
        let pool = doubler(1);
        assert!(matches!(
            pool.submit(1),
            Err(PipelineError::PoolStopped { .. })
        ));
    }

    #[test]
    fn test_start_twice() {
        let pool = doubler(3);
        pool.start().expect("Failed to start pool");
        assert_eq!(pool.state(), PoolState::Running);

        let err = pool.start().unwrap_err();
        assert_eq!(err, PipelineError::already_started("pool-worker", 3));
        assert_eq!(pool.spawned_workers(), 3);

        pool.shutdown().expect("Failed to shutdown pool");
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[test]
    fn test_drain_yields_every_result() {
        let pool = doubler(4);
        let results = pool.results();
        pool.start().unwrap();

        let mut ids = HashSet::new();
        for x in 1..=50 {
            ids.insert(pool.submit(x).unwrap());
        }
        assert_eq!(ids.len(), 50);

        pool.close();
        assert_eq!(pool.state(), PoolState::Draining);
        assert!(matches!(
            pool.submit(99),
            Err(PipelineError::PoolStopped { .. })
        ));

        pool.wait().unwrap();
        let collected: Vec<_> = results.iter().collect();
        assert_eq!(collected.len(), 50);
        for r in &collected {
            assert!(ids.contains(&r.job_id()));
        }

        let stats = pool.stats();
        assert_eq!(stats.state, PoolState::Stopped);
        assert_eq!(stats.jobs_submitted, 50);
        assert_eq!(stats.jobs_processed, 50);
        assert_eq!(stats.jobs_failed, 0);
    }

    #[test]
    fn test_cancel_before_start() {
        let pool = doubler(2);
        let results = pool.results();

        pool.cancel();
        assert_eq!(pool.state(), PoolState::Cancelled);
        assert!(matches!(pool.start(), Err(PipelineError::PoolStopped { .. })));

        pool.wait().unwrap();
        assert_eq!(pool.state(), PoolState::Stopped);
        assert!(results.recv().is_err());
    }

    #[test]
    fn test_wait_without_start() {
        let pool = doubler(1);
        assert_eq!(
            pool.wait(),
            Err(PipelineError::not_started("pool-worker"))
        );
    }

    #[test]
    fn test_concurrent_waiters() {
        let pool = Arc::new(doubler(2));
        pool.start().unwrap();
        pool.submit(1).unwrap();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let p = Arc::clone(&pool);
                thread::spawn(move || p.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        pool.close();

        for w in waiters {
            assert!(w.join().unwrap().is_ok());
        }
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[test]
    fn test_external_token_cancels_pool() {
        let pool = doubler(2);
        pool.start().unwrap();

        pool.cancellation_token().cancel();
        assert_eq!(pool.state(), PoolState::Cancelled);
        assert!(pool.submit(1).is_err());

        pool.wait().unwrap();
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[test]
    fn test_try_submit_full() {
        let config = PoolConfig::new(1).with_input_capacity(1);
        let (gate_tx, gate_rx) = crossbeam::channel::unbounded::<()>();

        let pool = WorkerPool::with_config(config, move |x: u64| {
            // Blocks until the gate sender is dropped
            let _ = gate_rx.recv();
            Ok::<_, String>(x)
        })
        .unwrap();
        pool.start().unwrap();

        // First job occupies the worker, second fills the queue
        pool.submit(1).unwrap();
        thread::sleep(Duration::from_millis(50));
        pool.submit(2).unwrap();
        assert_eq!(pool.try_submit(3), Err(PipelineError::queue_full(1)));

        drop(gate_tx);
        pool.shutdown().unwrap();
    }

    #[test]
    fn test_failed_start_disconnects_results() {
        let mut pool = doubler(2);
        let results = pool.results();
        // Bypasses validation so the OS-level spawn rejects the name
        pool.config.thread_name_prefix = "bad\0name".to_string();

        let started = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pool.start()));
        assert!(started.is_err());
        assert_eq!(pool.state(), PoolState::Cancelled);

        pool.wait().unwrap();
        assert_eq!(pool.state(), PoolState::Stopped);
        assert_eq!(
            results.recv_timeout(Duration::from_millis(300)),
            Err(crossbeam::channel::RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn test_drop_running_pool() {
        let pool = doubler(2);
        pool.start().unwrap();
        pool.submit(1).unwrap();
        drop(pool);
    }
}
