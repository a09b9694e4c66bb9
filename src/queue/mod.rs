//! Closable, cancellation-aware channels for job and result hand-off.
//!
//! [`JobQueue`] wraps a crossbeam channel with an explicit close operation and
//! three capacity modes:
//!
//! - **Rendezvous** (`bounded(0)`): every send waits for a receiver
//! - **Bounded** (`bounded(n)`): sends block while `n` items are buffered
//! - **Unbounded**: sends never block
//!
//! Blocking operations take a [`CancellationToken`](crate::CancellationToken) and return as soon as it
//! fires, handing the undelivered item back to the caller.
//!
//! ```rust
//! use rust_cache_pool::queue::{JobQueue, QueueError};
//! use rust_cache_pool::CancellationToken;
//!
//! let queue = JobQueue::bounded(1);
//! let token = CancellationToken::new();
//!
//! queue.send(1, &token).unwrap();
//! assert!(matches!(queue.try_send(2), Err(QueueError::Full(2))));
//!
//! queue.close();
//! assert!(matches!(queue.try_send(3), Err(QueueError::Closed(3))));
//! assert_eq!(queue.receiver().recv(), Ok(1));
//! ```

mod channel;

pub use channel::{recv_or_cancel, send_or_cancel, JobQueue};

/// Result type for queue operations
pub type QueueResult<T, U = ()> = std::result::Result<U, QueueError<T>>;

/// Errors returned by queue operations.
///
/// Send-side variants carry the undelivered item so the caller can retry or
/// report it.
#[derive(Debug, PartialEq, Eq)]
pub enum QueueError<T> {
    /// Queue is at capacity (non-blocking send only)
    Full(T),
    /// Queue is closed and not accepting new items
    Closed(T),
    /// The cancellation token fired while blocked; holds the item on send
    Cancelled(Option<T>),
    /// Queue is closed and fully drained
    Disconnected,
}

impl<T> QueueError<T> {
    /// Recover the undelivered item, if any
    pub fn into_inner(self) -> Option<T> {
        match self {
            QueueError::Full(item) | QueueError::Closed(item) => Some(item),
            QueueError::Cancelled(item) => item,
            QueueError::Disconnected => None,
        }
    }
}

impl<T> std::fmt::Display for QueueError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Full(_) => write!(f, "queue is full"),
            QueueError::Closed(_) => write!(f, "queue is closed"),
            QueueError::Cancelled(_) => write!(f, "operation cancelled"),
            QueueError::Disconnected => write!(f, "queue is disconnected"),
        }
    }
}

impl<T: std::fmt::Debug> std::error::Error for QueueError<T> {}
