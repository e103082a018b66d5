//! Move Queue and Retry Queue: bounded, thread-safe work queues decoupling
//! the Decision Engine from the Migration Worker Pool's I/O.
//!
//! Implemented on `crossbeam-channel`. Enqueue is non-blocking (`try_send`)
//! with a drop-newest-and-log overflow policy; dequeue blocks with a timeout
//! so loops can observe shutdown promptly without busy-polling.

use crate::model::MoveRequest;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

/// Floor applied to any requested capacity; queues stay bounded but never
/// shrink below the size needed to absorb a full decision-engine pass.
const MIN_CAPACITY: usize = 1024;

/// A bounded FIFO of [`MoveRequest`]s shared between producers (Decision
/// Engine, Retry Queue drainer) and a single dispatcher.
#[derive(Clone)]
pub struct MoveQueue {
    tx: Sender<MoveRequest>,
    rx: Receiver<MoveRequest>,
}

impl MoveQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        MoveQueue { tx, rx }
    }

    /// Enqueue without blocking. Overflow is dropped and logged rather than
    /// backpressuring the caller.
    pub fn enqueue(&self, request: MoveRequest) {
        match self.tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(
                    path = %dropped.relative_path,
                    "move queue full, dropping newest request"
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::error!("move queue disconnected, request dropped");
            }
        }
    }

    /// Block for up to `timeout` waiting for the next request.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<MoveRequest> {
        match self.rx.recv_timeout(timeout) {
            Ok(request) => Some(request),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// The Retry Queue. Structurally identical to [`MoveQueue`] but kept as a
/// distinct type so the two can never be accidentally swapped at a call site.
#[derive(Clone)]
pub struct RetryQueue {
    tx: Sender<MoveRequest>,
    rx: Receiver<MoveRequest>,
}

impl RetryQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        RetryQueue { tx, rx }
    }

    pub fn enqueue(&self, request: MoveRequest) {
        match self.tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(
                    path = %dropped.relative_path,
                    "retry queue full, dropping newest request"
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::error!("retry queue disconnected, request dropped");
            }
        }
    }

    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<MoveRequest> {
        match self.rx.recv_timeout(timeout) {
            Ok(request) => Some(request),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tier;

    #[test]
    fn enqueue_then_dequeue_round_trips() {
        let mq = MoveQueue::new(16);
        mq.enqueue(MoveRequest::new("a", Tier::Hot, Tier::Warm));
        let got = mq.dequeue_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(got.relative_path, "a");
    }

    #[test]
    fn dequeue_times_out_when_empty() {
        let mq = MoveQueue::new(16);
        assert!(mq.dequeue_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn overflow_drops_newest_without_panicking() {
        let mq = MoveQueue::new(1024);
        for i in 0..1100 {
            mq.enqueue(MoveRequest::new(format!("f{i}"), Tier::Hot, Tier::Warm));
        }
        assert!(mq.len() <= 1024);
    }
}
