//! Cooperative cancellation for worker pools
//!
//! A [`CancellationToken`] is a shared flag plus a "done" channel. Workers poll
//! the flag between jobs and block on the done channel (through
//! `crossbeam::select!`) wherever they would otherwise wait indefinitely, so a
//! cancellation is observed within one scheduling step.
//!
//! # Features
//!
//! - **Hierarchical cancellation**: child tokens are cancelled with their parent
//! - **Deadlines**: [`CancellationToken::cancel_after`] and
//!   [`CancellationToken::with_timeout`] fire the token after a duration
//! - **Cancellation reasons**: track why a token was cancelled
//!
//! # Example
//!
//! ```rust
//! use rust_cache_pool::CancellationToken;
//!
//! let parent = CancellationToken::new();
//! let child = parent.child();
//!
//! parent.cancel();
//!
//! assert!(parent.is_cancelled());
//! assert!(child.is_cancelled());
//! ```

use crate::core::{PipelineError, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Reason for cancellation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancellationReason {
    /// Explicitly cancelled via `cancel()`
    Manual,
    /// Cancelled because a deadline expired
    Timeout(Duration),
    /// Cancelled because the parent token was cancelled
    ParentCancelled,
    /// Custom cancellation reason
    Custom(String),
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationReason::Manual => write!(f, "manually cancelled"),
            CancellationReason::Timeout(d) => write!(f, "timeout after {:?}", d),
            CancellationReason::ParentCancelled => write!(f, "parent was cancelled"),
            CancellationReason::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

struct TokenInner {
    cancelled: AtomicBool,
    reason: RwLock<Option<CancellationReason>>,
    children: RwLock<Vec<Weak<TokenInner>>>,
    // Dropped on cancel so every clone of `done_rx` disconnects.
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
}

impl TokenInner {
    fn new() -> Self {
        let (done_tx, done_rx) = channel::bounded(0);
        Self {
            cancelled: AtomicBool::new(false),
            reason: RwLock::new(None),
            children: RwLock::new(Vec::new()),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
        }
    }
}

/// A thread-safe, cloneable cancellation signal.
///
/// Clones share state: cancelling any clone cancels all of them.
///
/// ```rust
/// use rust_cache_pool::CancellationToken;
/// use std::thread;
///
/// let token = CancellationToken::new();
/// let done = token.done();
///
/// let waiter = thread::spawn(move || {
///     // Returns once the token is cancelled
///     let _ = done.recv();
/// });
///
/// token.cancel();
/// waiter.join().unwrap();
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancellationToken {
    /// Create a new cancellation token (not cancelled)
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner::new()),
        }
    }

    /// Creates a token that cancels itself after `timeout`.
    ///
    /// ```rust
    /// use rust_cache_pool::{CancellationReason, CancellationToken};
    /// use std::time::Duration;
    ///
    /// let token = CancellationToken::with_timeout(Duration::from_millis(20));
    /// let _ = token.done().recv();
    /// assert_eq!(
    ///     token.reason(),
    ///     Some(CancellationReason::Timeout(Duration::from_millis(20)))
    /// );
    /// ```
    pub fn with_timeout(timeout: Duration) -> Self {
        let token = Self::new();
        token.cancel_after(timeout);
        token
    }

    /// Creates a child token linked to this parent.
    ///
    /// The child is cancelled when the parent is. Cancelling the child does
    /// not affect the parent.
    pub fn child(&self) -> Self {
        let child = Self::new();

        self.inner
            .children
            .write()
            .push(Arc::downgrade(&child.inner));

        if self.is_cancelled() {
            child.cancel_with_reason(CancellationReason::ParentCancelled);
        }

        child
    }

    /// Fires this token once `timeout` elapses.
    ///
    /// A helper thread waits on the done channel, so it exits as soon as the
    /// token is cancelled by other means.
    pub fn cancel_after(&self, timeout: Duration) {
        let token = self.clone();
        let done = self.done();
        std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = done.recv_timeout(timeout) {
                token.cancel_with_reason(CancellationReason::Timeout(timeout));
            }
        });
    }

    /// Cancel this token with the `Manual` reason.
    ///
    /// Idempotent: only the first call has any effect.
    pub fn cancel(&self) {
        self.cancel_with_reason(CancellationReason::Manual);
    }

    /// Cancel this token with a specific reason.
    ///
    /// The reason is recorded only on the first cancellation. Children are
    /// cancelled with [`CancellationReason::ParentCancelled`].
    pub fn cancel_with_reason(&self, reason: CancellationReason) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        *self.inner.reason.write() = Some(reason);

        // Wake everything blocked in a select! on the done channel
        self.inner.done_tx.lock().take();

        let children = self.inner.children.read();
        for child_weak in children.iter() {
            if let Some(child_inner) = child_weak.upgrade() {
                CancellationToken { inner: child_inner }
                    .cancel_with_reason(CancellationReason::ParentCancelled);
            }
        }
    }

    /// Check if this token has been cancelled
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Returns the cancellation reason, or `None` if not cancelled
    pub fn reason(&self) -> Option<CancellationReason> {
        self.inner.reason.read().clone()
    }

    /// A receiver that disconnects when the token is cancelled.
    ///
    /// No value is ever sent on it; `recv()` blocks until cancellation and then
    /// returns `Err`. Use it as a `recv(...)` arm in `crossbeam::select!`.
    pub fn done(&self) -> Receiver<()> {
        self.inner.done_rx.clone()
    }

    /// Returns [`PipelineError::Cancelled`] if cancelled, `Ok(())` otherwise.
    ///
    /// ```rust
    /// use rust_cache_pool::{CancellationToken, PipelineError};
    ///
    /// fn process_items(token: &CancellationToken) -> Result<(), PipelineError> {
    ///     for _ in 0..100 {
    ///         token.check()?;
    ///     }
    ///     Ok(())
    /// }
    /// # assert!(process_items(&CancellationToken::new()).is_ok());
    /// ```
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            let reason = self
                .reason()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Err(PipelineError::cancelled(reason))
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
