//! Per-key computation claims for `get_or_compute`

use crate::core::Result;
use parking_lot::{Condvar, Mutex};

/// A one-shot slot that the claiming caller fills and waiters block on.
pub(crate) struct Claim<V> {
    outcome: Mutex<Option<Result<V>>>,
    ready: Condvar,
}

impl<V: Clone> Claim<V> {
    pub(crate) fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Publish the outcome and wake every waiter. Only the first call counts.
    pub(crate) fn complete(&self, outcome: Result<V>) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
            self.ready.notify_all();
        }
    }

    /// Block until the claim is completed and return a copy of its outcome.
    pub(crate) fn wait(&self) -> Result<V> {
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            self.ready.wait(&mut slot);
        }
    }
}
