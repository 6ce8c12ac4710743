use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::future::OutstandingGuard;
use crate::registry::ScannerHandle;
use crate::result::{FutureResult, Producer};
use crate::service::{RemoteScanner, ServiceError, TableService};

/// A scanner whose batches are delivered through a future.
///
/// The scanner owns one outstanding registration for its whole stream. The
/// fetch task releases it when the stream is exhausted, fails, or the future
/// is cancelled; [`close`](Self::close) aborts the task, which releases it
/// through the guard's drop.
pub(crate) struct AsyncScanner {
    handle: ScannerHandle,
    service: Arc<dyn TableService>,
    remote: RemoteScanner,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncScanner {
    pub(crate) fn spawn(
        handle: ScannerHandle,
        service: Arc<dyn TableService>,
        remote: RemoteScanner,
        guard: OutstandingGuard,
    ) -> Self {
        let task = tokio::spawn(run_scanner(handle, Arc::clone(&service), remote, guard));
        Self {
            handle,
            service,
            remote,
            task: Mutex::new(Some(task)),
        }
    }

    /// Stops batch delivery and closes the remote scanner.
    ///
    /// Batches already queued on the future stay drainable.
    pub(crate) async fn close(&self) -> Result<(), ServiceError> {
        self.stop().await;
        self.service.scanner_close(self.remote).await
    }

    /// Aborts the fetch task and waits until it is gone, so its outstanding
    /// registration has been released when this returns.
    pub(crate) async fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
            if let Err(err) = task.await {
                if err.is_panic() {
                    warn!(scanner = %self.handle, "scanner task panicked");
                }
            }
        }
    }
}

async fn run_scanner(
    handle: ScannerHandle,
    service: Arc<dyn TableService>,
    remote: RemoteScanner,
    guard: OutstandingGuard,
) {
    let mut batches = 0usize;
    loop {
        if guard.is_cancelled() {
            debug!(scanner = %handle, batches, "future cancelled, scanner stopping");
            break;
        }
        match service.scanner_get_cells(remote).await {
            Ok(cells) if cells.is_empty() => break,
            Ok(cells) => {
                batches += 1;
                let batch = FutureResult::ScanBatch { scanner: handle, cells };
                if !guard.push(batch).await {
                    break;
                }
            }
            Err(err) => {
                warn!(scanner = %handle, error = %err, "scan batch failed");
                guard
                    .complete(FutureResult::Error {
                        producer: Producer::Scanner(handle),
                        message: err.to_string(),
                    })
                    .await;
                return;
            }
        }
    }
    debug!(scanner = %handle, batches, "scanner stream finished");
    guard.finish();
}
