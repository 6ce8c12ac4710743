use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::future::{FutureCore, OutstandingGuard};
use crate::registry::MutatorHandle;
use crate::result::{FutureResult, Producer};
use crate::service::TableService;
use crate::types::{Cell, Namespace};

struct FlushJob {
    cells: Vec<Cell>,
    guard: OutstandingGuard,
}

#[derive(Default)]
struct MutatorState {
    buffer: Vec<Cell>,
    closed: bool,
}

/// A mutator whose flushes complete through a future.
///
/// Flushes are handed to a dedicated worker task and written one at a time,
/// so results from one mutator arrive in submission order.
pub(crate) struct AsyncMutator {
    handle: MutatorHandle,
    future: Weak<FutureCore>,
    state: Mutex<MutatorState>,
    in_flight: Arc<AtomicUsize>,
    jobs: mpsc::UnboundedSender<FlushJob>,
}

impl AsyncMutator {
    /// Creates the mutator and spawns its flush worker.
    pub(crate) fn spawn(
        handle: MutatorHandle,
        service: Arc<dyn TableService>,
        namespace: Namespace,
        table: String,
        future: &Arc<FutureCore>,
    ) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let in_flight = Arc::new(AtomicUsize::new(0));
        tokio::spawn(run_flush_worker(
            handle,
            service,
            namespace,
            table,
            rx,
            Arc::clone(&in_flight),
        ));
        Self {
            handle,
            future: Arc::downgrade(future),
            state: Mutex::new(MutatorState::default()),
            in_flight,
            jobs,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MutatorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn future(&self) -> Result<Arc<FutureCore>> {
        self.future
            .upgrade()
            .ok_or_else(|| Error::Closed(format!("future of {}", self.handle)))
    }

    /// Buffers cells for the next flush.
    pub(crate) fn set_cells(&self, cells: Vec<Cell>) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::InvalidHandle(format!("{} is closed", self.handle)));
        }
        self.future()?.check_accepting()?;
        state.buffer.extend(cells);
        Ok(())
    }

    /// Sends the buffered cells to the worker and registers one outstanding
    /// completion on the future.
    pub(crate) fn flush(&self) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::InvalidHandle(format!("{} is closed", self.handle)));
        }
        let guard = self.future()?.register()?;
        let cells = std::mem::take(&mut state.buffer);
        let count = cells.len();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.jobs.send(FlushJob { cells, guard }).is_err() {
            // The worker is gone; the returned job drops its guard.
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Closed(self.handle.to_string()));
        }
        debug!(mutator = %self.handle, cells = count, "flush submitted");
        Ok(())
    }

    /// Closes the mutator.
    ///
    /// Every flush must have completed first: closing with a flush in flight
    /// fails with [`Error::FlushInFlight`] and leaves the mutator open.
    pub(crate) fn close(&self) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::InvalidHandle(format!("{} is closed", self.handle)));
        }
        let pending = self.in_flight.load(Ordering::SeqCst);
        if pending > 0 {
            return Err(Error::FlushInFlight {
                mutator: self.handle.id(),
                pending,
            });
        }
        if !state.buffer.is_empty() {
            warn!(
                mutator = %self.handle,
                cells = state.buffer.len(),
                "closing mutator with unflushed cells"
            );
        }
        state.buffer.clear();
        state.closed = true;
        Ok(())
    }
}

async fn run_flush_worker(
    handle: MutatorHandle,
    service: Arc<dyn TableService>,
    namespace: Namespace,
    table: String,
    mut jobs: mpsc::UnboundedReceiver<FlushJob>,
    in_flight: Arc<AtomicUsize>,
) {
    while let Some(FlushJob { cells, guard }) = jobs.recv().await {
        let result = match service.write_cells(namespace, &table, cells).await {
            Ok(()) => FutureResult::WriteAck { mutator: handle },
            Err(err) => {
                warn!(mutator = %handle, table = %table, error = %err, "async flush failed");
                FutureResult::Error {
                    producer: Producer::Mutator(handle),
                    message: err.to_string(),
                }
            }
        };
        // Visible as done before the result can be observed by a poller.
        in_flight.fetch_sub(1, Ordering::SeqCst);
        guard.complete(result).await;
    }
    debug!(mutator = %handle, "flush worker stopped");
}
