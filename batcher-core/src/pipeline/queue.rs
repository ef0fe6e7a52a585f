// batcher-core/src/pipeline/queue.rs

//! Bounded blocking queue shared by a pool of producers and consumers.
//!
//! Built on a `crossbeam` bounded channel. Two things are layered on top:
//!
//! * a producer count, so consumers can tell "empty for now" from "empty
//!   for good" once every producer has retired;
//! * a closed flag, so that shutdown wakes up every blocked caller within
//!   one poll interval.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Returned by [`BoundedQueue::push`] once the queue has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

pub struct BoundedQueue<T> {
    name: &'static str,
    sender: Sender<T>,
    receiver: Receiver<T>,
    capacity: usize,
    producers: AtomicUsize,
    closed: AtomicBool,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items, fed by `producers`
    /// producers.
    pub fn new(name: &'static str, capacity: usize, producers: usize) -> Self {
        let (sender, receiver) = channel::bounded(capacity);
        Self {
            name,
            sender,
            receiver,
            capacity,
            producers: AtomicUsize::new(producers),
            closed: AtomicBool::new(false),
        }
    }

    /// Pushes an item, blocking while the queue is full.
    pub fn push(&self, item: T) -> Result<(), QueueClosed> {
        let mut item = item;
        loop {
            if self.is_closed() {
                return Err(QueueClosed);
            }
            match self.sender.send_timeout(item, POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => item = back,
                Err(SendTimeoutError::Disconnected(_)) => return Err(QueueClosed),
            }
        }
    }

    /// Pops an item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed, or once it is empty and
    /// every producer has retired.
    pub fn pop(&self) -> Option<T> {
        loop {
            if self.is_closed() {
                return None;
            }
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(item) => return Some(item),
                Err(RecvTimeoutError::Timeout) => {
                    if self.producers() == 0 {
                        // a retired producer has finished all its pushes
                        return self.receiver.try_recv().ok();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Marks one producer as permanently gone.
    pub fn producer_done(&self) {
        let _ = self
            .producers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        tracing::debug!(
            queue = self.name,
            producers = self.producers(),
            "producer retired"
        );
    }

    pub fn producers(&self) -> usize {
        self.producers.load(Ordering::SeqCst)
    }

    /// True once every producer has retired and the queue is drained.
    pub fn is_exhausted(&self) -> bool {
        self.producers() == 0 && self.receiver.is_empty()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
