//! Closable FIFO queue over crossbeam channels.

use super::{QueueError, QueueResult};
use crate::core::CancellationToken;
use crossbeam::channel::{self, Receiver, Select, Sender, TrySendError};
use parking_lot::RwLock;

/// A multi-producer, multi-consumer FIFO queue that can be closed.
///
/// Closing drops the queue's own sender. Receivers keep draining buffered
/// items and observe [`QueueError::Disconnected`] once the buffer is empty and
/// every outstanding sender clone has been dropped.
pub struct JobQueue<T> {
    sender: RwLock<Option<Sender<T>>>,
    receiver: Receiver<T>,
    capacity: Option<usize>,
}

impl<T> std::fmt::Debug for JobQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.receiver.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> JobQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// A capacity of 0 makes every send a synchronous hand-off to a receiver.
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = channel::bounded(capacity);
        Self {
            sender: RwLock::new(Some(sender)),
            receiver,
            capacity: Some(capacity),
        }
    }

    /// Creates a queue without a capacity limit
    pub fn unbounded() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            sender: RwLock::new(Some(sender)),
            receiver,
            capacity: None,
        }
    }

    /// Sends `item`, blocking while the queue is full.
    ///
    /// Returns [`QueueError::Cancelled`] with the item if `token` fires first.
    pub fn send(&self, item: T, token: &CancellationToken) -> QueueResult<T> {
        match self.sender() {
            Some(sender) => send_or_cancel(&sender, item, token),
            None => Err(QueueError::Closed(item)),
        }
    }

    /// Sends `item` without blocking
    pub fn try_send(&self, item: T) -> QueueResult<T> {
        let sender = match self.sender() {
            Some(sender) => sender,
            None => return Err(QueueError::Closed(item)),
        };
        sender.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) => QueueError::Full(item),
            TrySendError::Disconnected(item) => QueueError::Closed(item),
        })
    }

    /// A clone of the sending half, or `None` once closed.
    ///
    /// Holders of a clone keep receivers connected until they drop it.
    pub fn sender(&self) -> Option<Sender<T>> {
        self.sender.read().clone()
    }

    /// A clone of the receiving half
    pub fn receiver(&self) -> Receiver<T> {
        self.receiver.clone()
    }

    /// Stops accepting items. Returns `true` if this call closed the queue.
    pub fn close(&self) -> bool {
        self.sender.write().take().is_some()
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Number of buffered items (approximate under contention)
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether no items are buffered
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Capacity limit, `None` for unbounded
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

/// Sends on `sender` unless `token` is cancelled first.
///
/// An already-cancelled token is checked before the send is attempted, so
/// nothing is handed off once cancellation is visible to the caller.
pub fn send_or_cancel<T>(sender: &Sender<T>, item: T, token: &CancellationToken) -> QueueResult<T> {
    if token.is_cancelled() {
        return Err(QueueError::Cancelled(Some(item)));
    }

    let done = token.done();
    let mut select = Select::new();
    let send_index = select.send(sender);
    let done_index = select.recv(&done);
    let oper = select.select();

    match oper.index() {
        i if i == send_index => oper
            .send(sender, item)
            .map_err(|e| QueueError::Closed(e.into_inner())),
        i => {
            debug_assert_eq!(i, done_index);
            // The done channel only ever disconnects
            let _ = oper.recv(&done);
            Err(QueueError::Cancelled(Some(item)))
        }
    }
}

/// Receives from `receiver` unless `token` is cancelled first.
///
/// Returns [`QueueError::Disconnected`] once the channel is closed and drained.
pub fn recv_or_cancel<T>(receiver: &Receiver<T>, token: &CancellationToken) -> QueueResult<T, T> {
    if token.is_cancelled() {
        return Err(QueueError::Cancelled(None));
    }

    let done = token.done();
    channel::select! {
        recv(receiver) -> msg => msg.map_err(|_| QueueError::Disconnected),
        recv(done) -> _ => Err(QueueError::Cancelled(None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_bounded_send_recv() {
        let queue = JobQueue::bounded(2);
        let token = CancellationToken::new();

        queue.send("a", &token).unwrap();
        queue.send("b", &token).unwrap();
        assert_eq!(queue.len(), 2);
        assert!(matches!(queue.try_send("c"), Err(QueueError::Full("c"))));

        let rx = queue.receiver();
        assert_eq!(recv_or_cancel(&rx, &token), Ok("a"));
        assert_eq!(recv_or_cancel(&rx, &token), Ok("b"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_unbounded_never_full() {
        let queue = JobQueue::unbounded();
        for i in 0..1000 {
            queue.try_send(i).unwrap();
        }
        assert_eq!(queue.len(), 1000);
        assert_eq!(queue.capacity(), None);
    }

    #[test]
    fn test_close_drains_then_disconnects() {
        let queue = JobQueue::bounded(4);
        let token = CancellationToken::new();
        queue.send(1, &token).unwrap();

        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_closed());
        assert!(matches!(queue.send(2, &token), Err(QueueError::Closed(2))));

        let rx = queue.receiver();
        assert_eq!(recv_or_cancel(&rx, &token), Ok(1));
        assert_eq!(recv_or_cancel(&rx, &token), Err(QueueError::Disconnected));
    }

    #[test]
    fn test_outstanding_sender_keeps_queue_connected() {
        let queue = JobQueue::unbounded();
        let token = CancellationToken::new();
        let sender = queue.sender().unwrap();
        queue.close();

        sender.send(5).unwrap();
        let rx = queue.receiver();
        assert_eq!(recv_or_cancel(&rx, &token), Ok(5));

        drop(sender);
        assert_eq!(recv_or_cancel(&rx, &token), Err(QueueError::Disconnected));
    }

    #[test]
    fn test_rendezvous_send_waits_for_receiver() {
        let queue = Arc::new(JobQueue::bounded(0));
        let token = CancellationToken::new();
        assert!(matches!(queue.try_send(1), Err(QueueError::Full(1))));

        let rx = queue.receiver();
        let receiver = thread::spawn(move || rx.recv().unwrap());

        queue.send(7, &token).unwrap();
        assert_eq!(receiver.join().unwrap(), 7);
    }

    #[test]
    fn test_blocked_send_released_by_cancel() {
        let queue = Arc::new(JobQueue::bounded(1));
        let token = CancellationToken::new();
        queue.send(1, &token).unwrap();

        let q = Arc::clone(&queue);
        let t = token.clone();
        let blocked = thread::spawn(move || q.send(2, &t));

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        assert_eq!(
            blocked.join().unwrap(),
            Err(QueueError::Cancelled(Some(2)))
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_recv_released_by_cancel() {
        let queue: JobQueue<u32> = JobQueue::unbounded();
        let token = CancellationToken::new();
        let rx = queue.receiver();

        let t = token.clone();
        let waiting = thread::spawn(move || recv_or_cancel(&rx, &t));

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        assert_eq!(waiting.join().unwrap(), Err(QueueError::Cancelled(None)));
    }

    #[test]
    fn test_cancelled_token_rejects_immediately() {
        let queue = JobQueue::unbounded();
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(queue.send(3, &token), Err(QueueError::Cancelled(Some(3))));
        assert_eq!(queue.len(), 0);
    }
}
