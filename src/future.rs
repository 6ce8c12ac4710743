//! Completion aggregation for asynchronous mutators and scanners.
//!
//! A [`FutureCore`] owns a bounded queue of results and the count of
//! operations that have not yet produced their terminal result. Producers
//! and the consumer coordinate through one mutex and two [`Notify`]s:
//! every state change happens under the lock, and every waiter registers
//! interest before inspecting the state, so no wake-up is lost.
//!
//! Outstanding work is represented by [`OutstandingGuard`]. A guard is
//! created when an operation is submitted and releases its count exactly
//! once: when it completes with a terminal result, or when it is dropped
//! (task aborted, scanner closed early, future closed).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::registry::FutureHandle;
use crate::result::FutureResult;

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<FutureResult>,
    outstanding: usize,
    cancelled: bool,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct FutureCore {
    handle: FutureHandle,
    capacity: usize,
    state: Mutex<QueueState>,
    /// Signalled when a result is queued, work completes, or the future closes.
    readable: Notify,
    /// Signalled when queue space frees up or the future closes.
    writable: Notify,
}

impl FutureCore {
    pub(crate) fn new(handle: FutureHandle, capacity: usize) -> Self {
        Self {
            handle,
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    pub(crate) fn handle(&self) -> FutureHandle {
        self.handle
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn closed_error(&self) -> Error {
        Error::Closed(self.handle.to_string())
    }

    /// Fails unless new work may be submitted against this future.
    pub(crate) fn check_accepting(&self) -> Result<()> {
        let state = self.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        if state.cancelled {
            return Err(Error::InvalidHandle(format!("{} is cancelled", self.handle)));
        }
        Ok(())
    }

    /// Registers one outstanding operation.
    pub(crate) fn register(self: &Arc<Self>) -> Result<OutstandingGuard> {
        let mut state = self.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        if state.cancelled {
            return Err(Error::InvalidHandle(format!("{} is cancelled", self.handle)));
        }
        state.outstanding += 1;
        trace!(future = %self.handle, outstanding = state.outstanding, "registered operation");
        Ok(OutstandingGuard {
            core: Arc::clone(self),
            released: false,
        })
    }

    /// Waits up to `timeout` for the next result.
    ///
    /// Returns [`FutureResult::Empty`] once the queue is drained and no
    /// operation is outstanding. A timeout consumes nothing.
    pub(crate) async fn get_result(&self, timeout: Duration) -> Result<FutureResult> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(self.closed_error());
                }
                if let Some(result) = state.queue.pop_front() {
                    drop(state);
                    self.writable.notify_waiters();
                    return Ok(result);
                }
                if state.outstanding == 0 {
                    return Ok(FutureResult::Empty);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(Error::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
    }

    /// Queues `result`, waiting for space while the queue is full.
    ///
    /// When `terminal` is set the outstanding count is released in the same
    /// critical section. Returns `false` if the future closed first, in which
    /// case the result is discarded.
    async fn deliver(&self, result: FutureResult, terminal: bool) -> bool {
        let mut result = Some(result);
        loop {
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    if terminal {
                        state.outstanding = state.outstanding.saturating_sub(1);
                    }
                    return false;
                }
                if state.queue.len() < self.capacity {
                    if let Some(result) = result.take() {
                        state.queue.push_back(result);
                    }
                    if terminal {
                        state.outstanding = state.outstanding.saturating_sub(1);
                    }
                    drop(state);
                    self.readable.notify_waiters();
                    return true;
                }
            }

            notified.await;
        }
    }

    fn release(&self) {
        let mut state = self.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        let outstanding = state.outstanding;
        drop(state);
        trace!(future = %self.handle, outstanding, "released operation");
        self.readable.notify_waiters();
    }

    pub(crate) fn is_cancelled(&self) -> Result<bool> {
        let state = self.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        Ok(state.cancelled)
    }

    pub(crate) fn is_full(&self) -> Result<bool> {
        let state = self.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        Ok(state.queue.len() >= self.capacity)
    }

    /// `true` when the next poll would return the empty sentinel.
    pub(crate) fn is_empty(&self) -> Result<bool> {
        let state = self.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        Ok(state.queue.is_empty() && state.outstanding == 0)
    }

    pub(crate) fn has_outstanding(&self) -> Result<bool> {
        let state = self.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        Ok(state.outstanding > 0)
    }

    /// Sets the cancellation flag. Returns `true` on the first call.
    pub(crate) fn cancel(&self) -> Result<bool> {
        let mut state = self.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        let first = !state.cancelled;
        state.cancelled = true;
        drop(state);
        if first {
            debug!(future = %self.handle, "future cancelled");
        }
        Ok(first)
    }

    /// Marks the future closed and drops every buffered result.
    ///
    /// Pending polls fail with [`Error::Closed`]; producers discard their
    /// results. Returns `false` if it was already closed.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        let dropped = state.queue.len();
        state.queue.clear();
        let outstanding = state.outstanding;
        drop(state);
        debug!(future = %self.handle, dropped, outstanding, "future closed");
        self.readable.notify_waiters();
        self.writable.notify_waiters();
        true
    }
}

/// One outstanding operation registered against a future.
#[derive(Debug)]
pub(crate) struct OutstandingGuard {
    core: Arc<FutureCore>,
    released: bool,
}

impl OutstandingGuard {
    /// Queues a non-terminal result (a scan batch). Returns `false` if the
    /// future closed.
    pub(crate) async fn push(&self, result: FutureResult) -> bool {
        self.core.deliver(result, false).await
    }

    /// Queues the terminal result and releases the operation.
    pub(crate) async fn complete(mut self, result: FutureResult) {
        self.core.deliver(result, true).await;
        self.released = true;
    }

    /// Releases the operation without a result.
    pub(crate) fn finish(self) {
        drop(self);
    }

    /// Whether the owning future was cancelled.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.core.lock().cancelled
    }
}

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.core.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::IdAllocator;

    fn open_core(capacity: usize) -> (Arc<FutureCore>, IdAllocator) {
        let ids = IdAllocator::new();
        (Arc::new(FutureCore::new(ids.future(), capacity)), ids)
    }

    #[tokio::test]
    async fn dropped_guard_releases_once() {
        let (core, _ids) = open_core(4);
        let guard = core.register().unwrap();
        assert!(core.has_outstanding().unwrap());
        guard.finish();
        assert!(!core.has_outstanding().unwrap());
        assert!(core.is_empty().unwrap());
    }

    #[tokio::test]
    async fn completed_guard_is_not_released_twice() {
        let (core, ids) = open_core(4);
        let first = core.register().unwrap();
        let _second = core.register().unwrap();
        let mutator = ids.mutator();
        first.complete(FutureResult::WriteAck { mutator }).await;
        assert!(core.has_outstanding().unwrap());
        assert_eq!(
            core.get_result(Duration::from_millis(10)).await.unwrap(),
            FutureResult::WriteAck { mutator }
        );
    }

    #[tokio::test]
    async fn full_queue_blocks_producer_until_drained() {
        let (core, ids) = open_core(1);
        let scanner = ids.scanner();
        let guard = core.register().unwrap();
        let batch = move |n: usize| -> FutureResult {
            FutureResult::ScanBatch {
                scanner,
                cells: vec![Default::default(); n],
            }
        };
        assert!(guard.push(batch(1)).await);
        assert!(core.is_full().unwrap());

        let producer = tokio::spawn(async move {
            guard.push(batch(2)).await;
            guard.finish();
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(core.get_result(Duration::from_secs(1)).await.unwrap().cells().len(), 1);
        assert_eq!(core.get_result(Duration::from_secs(1)).await.unwrap().cells().len(), 2);
        producer.await.unwrap();
        assert!(core.get_result(Duration::from_secs(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_after_cancel_is_rejected() {
        let (core, _ids) = open_core(4);
        assert!(core.cancel().unwrap());
        assert!(!core.cancel().unwrap());
        assert!(matches!(core.register(), Err(Error::InvalidHandle(_))));
        assert!(core.close());
        assert!(matches!(core.register(), Err(Error::Closed(_))));
        assert!(!core.close());
    }
}
