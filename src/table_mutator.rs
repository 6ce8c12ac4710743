use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::registry::TableMutatorHandle;
use crate::service::{ServiceError, TableService};
use crate::types::{Cell, Namespace};

/// State shared between the mutator and its periodic flush task.
struct Shared {
    handle: TableMutatorHandle,
    service: Arc<dyn TableService>,
    namespace: Namespace,
    table: String,
    buffer: Mutex<Vec<Cell>>,
    /// Held across take-and-write so flushes never interleave.
    write_gate: tokio::sync::Mutex<()>,
}

impl Shared {
    fn buffer(&self) -> MutexGuard<'_, Vec<Cell>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Writes everything buffered. On failure the cells go back to the
    /// front of the buffer, ahead of anything added since.
    async fn flush(&self) -> Result<(), ServiceError> {
        let _gate = self.write_gate.lock().await;
        let cells = std::mem::take(&mut *self.buffer());
        if cells.is_empty() {
            return Ok(());
        }
        let count = cells.len();
        debug!(mutator = %self.handle, cells = count, "flushing table mutator");
        match self.service.write_cells(self.namespace, &self.table, cells.clone()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let mut buffer = self.buffer();
                let newer = std::mem::replace(&mut *buffer, cells);
                buffer.extend(newer);
                Err(err)
            }
        }
    }
}

/// A buffering mutator that writes on explicit flush, on close, and
/// optionally on a fixed interval.
///
/// Cells from a failed write stay buffered, so the failure resurfaces on
/// the next [`flush`](Self::flush) or [`close`](Self::close) unless a
/// later write succeeds.
pub(crate) struct TableMutator {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl TableMutator {
    /// Creates the mutator. A non-zero `flush_interval` starts a background
    /// task that flushes the buffer on every tick.
    pub(crate) fn new(
        handle: TableMutatorHandle,
        service: Arc<dyn TableService>,
        namespace: Namespace,
        table: String,
        flush_interval: Duration,
    ) -> Self {
        let shared = Arc::new(Shared {
            handle,
            service,
            namespace,
            table,
            buffer: Mutex::new(Vec::new()),
            write_gate: tokio::sync::Mutex::new(()),
        });
        let (shutdown, stop) = watch::channel(false);
        let ticker = (!flush_interval.is_zero())
            .then(|| tokio::spawn(run_periodic_flush(Arc::clone(&shared), flush_interval, stop)));
        Self {
            shared,
            shutdown,
            ticker: Mutex::new(ticker),
        }
    }

    pub(crate) fn set_cells(&self, cells: Vec<Cell>) {
        self.shared.buffer().extend(cells);
    }

    pub(crate) async fn flush(&self) -> Result<(), ServiceError> {
        self.shared.flush().await
    }

    /// Stops the periodic flush, waits for a write it has in progress, then
    /// writes whatever is still buffered.
    pub(crate) async fn close(&self) -> Result<(), ServiceError> {
        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(ticker) = ticker {
            self.shutdown.send_replace(true);
            if let Err(err) = ticker.await {
                if err.is_panic() {
                    warn!(mutator = %self.shared.handle, "periodic flush task panicked");
                }
            }
        }
        self.shared.flush().await
    }
}

impl Drop for TableMutator {
    fn drop(&mut self) {
        let ticker = self
            .ticker
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(ticker) = ticker {
            ticker.abort();
        }
    }
}

async fn run_periodic_flush(shared: Arc<Shared>, interval: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        if let Err(err) = shared.flush().await {
            warn!(mutator = %shared.handle, error = %err, "periodic flush failed, cells kept for retry");
        }
    }
    debug!(mutator = %shared.handle, "periodic flush stopped");
}
