use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tracing::{debug, info, warn};

use crate::async_mutator::AsyncMutator;
use crate::async_scanner::AsyncScanner;
use crate::error::{Error, Result};
use crate::future::FutureCore;
use crate::registry::*;
use crate::result::{decode_cells, encode_cells, ArraysResult, FutureResult, SerializedResult};
use crate::service::{RemoteScanner, TableService};
use crate::table_mutator::TableMutator;
use crate::transport::GrpcTableService;
use crate::types::*;

/// Client for a Hypertable-style table service.
///
/// Every object the client opens (futures, mutators, scanners) is addressed
/// by a small value handle and lives in the client's session until it is
/// closed or the client itself is closed.
///
/// # Cloning
/// The client is cheap to clone. Clones share one session.
#[derive(Clone)]
pub struct HypertableClient {
    session: Arc<Session>,
}

struct Session {
    service: Arc<dyn TableService>,
    config: ClientConfig,
    connected: AtomicBool,
    ids: IdAllocator,
    futures: HandleRegistry<FutureCore>,
    mutators: HandleRegistry<AsyncMutator>,
    scanners: HandleRegistry<AsyncScanner>,
    table_mutators: HandleRegistry<TableMutator>,
    table_scanners: HandleRegistry<RemoteScanner>,
}

impl fmt::Debug for HypertableClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HypertableClient")
            .field("config", &self.session.config)
            .field("connected", &self.session.connected.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl HypertableClient {
    /// Connect to the gRPC gateway described by `config`.
    ///
    /// # Returns
    /// The connected client, or [`Error::Connection`] if the endpoint cannot be reached.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let service = GrpcTableService::connect(&config).await?;
        info!(endpoint = %config.endpoint_uri(), "connected to table service");
        Ok(Self::with_service(Arc::new(service), config))
    }

    /// Create a client over any [`TableService`] implementation.
    pub fn with_service(service: Arc<dyn TableService>, config: ClientConfig) -> Self {
        Self {
            session: Arc::new(Session {
                service,
                config,
                connected: AtomicBool::new(true),
                ids: IdAllocator::new(),
                futures: HandleRegistry::new(),
                mutators: HandleRegistry::new(),
                scanners: HandleRegistry::new(),
                table_mutators: HandleRegistry::new(),
                table_scanners: HandleRegistry::new(),
            }),
        }
    }

    /// The configuration this client was created with.
    pub fn config(&self) -> &ClientConfig {
        &self.session.config
    }

    fn service(&self) -> Result<&Arc<dyn TableService>> {
        if !self.session.connected.load(Ordering::SeqCst) {
            return Err(Error::Connection("client is closed".to_string()));
        }
        Ok(&self.session.service)
    }

    /// Closes the session.
    ///
    /// Every open future is closed (pending polls fail with [`Error::Closed`]),
    /// async scanners stop, and table mutators flush what they buffered.
    /// Further calls fail with [`Error::Connection`].
    pub async fn close(&self) {
        if !self.session.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        for future in self.session.futures.drain() {
            future.close();
        }
        for scanner in self.session.scanners.drain() {
            if let Err(err) = scanner.close().await {
                debug!(error = %err, "scanner close during shutdown failed");
            }
        }
        self.session.mutators.drain();
        for mutator in self.session.table_mutators.drain() {
            if let Err(err) = mutator.close().await {
                warn!(error = %err, "final flush during shutdown failed");
            }
        }
        for scanner in self.session.table_scanners.drain() {
            if let Err(err) = self.session.service.scanner_close(*scanner).await {
                debug!(error = %err, "table scanner close during shutdown failed");
            }
        }
        info!("client closed");
    }

    // ============================================================================================
    // Namespaces
    // ============================================================================================

    /// Checks whether a namespace exists. `"/"` names the root.
    pub async fn namespace_exists(&self, name: &str) -> Result<bool> {
        Ok(self.service()?.namespace_exists(name).await?)
    }

    /// Creates a namespace. Its parent must already exist.
    pub async fn namespace_create(&self, name: &str) -> Result<()> {
        Ok(self.service()?.namespace_create(name).await?)
    }

    /// Opens a namespace for table operations.
    pub async fn namespace_open(&self, name: &str) -> Result<Namespace> {
        Ok(self.service()?.namespace_open(name).await?)
    }

    /// Closes a namespace opened with [`namespace_open`](Self::namespace_open).
    pub async fn namespace_close(&self, namespace: Namespace) -> Result<()> {
        Ok(self.service()?.namespace_close(namespace).await?)
    }

    /// Lists the tables and sub-namespaces directly inside `namespace`.
    pub async fn namespace_get_listing(&self, namespace: Namespace) -> Result<Vec<NamespaceListing>> {
        Ok(self.service()?.namespace_get_listing(namespace).await?)
    }

    // ============================================================================================
    // Cells
    // ============================================================================================

    /// Writes cells to a table in one request.
    pub async fn set_cells(&self, namespace: Namespace, table: &str, cells: Vec<Cell>) -> Result<()> {
        Ok(self.service()?.write_cells(namespace, table, cells).await?)
    }

    /// Writes a single cell.
    pub async fn set_cell(&self, namespace: Namespace, table: &str, cell: Cell) -> Result<()> {
        self.set_cells(namespace, table, vec![cell]).await
    }

    /// Writes cells given in array form. Each array is parsed with
    /// [`Cell::from_array`]; nothing is written if any array is malformed.
    pub async fn set_cells_as_arrays(
        &self,
        namespace: Namespace,
        table: &str,
        cells: Vec<CellAsArray>,
    ) -> Result<()> {
        let cells = cells
            .iter()
            .map(|array| Cell::from_array(array))
            .collect::<Result<Vec<_>>>()?;
        self.set_cells(namespace, table, cells).await
    }

    /// Writes cells given as a serialized buffer.
    pub async fn set_cells_serialized(&self, namespace: Namespace, table: &str, buffer: &[u8]) -> Result<()> {
        let cells = decode_cells(buffer)?;
        self.set_cells(namespace, table, cells).await
    }

    /// Reads every cell selected by `spec`.
    pub async fn get_cells(&self, namespace: Namespace, table: &str, spec: ScanSpec) -> Result<Vec<Cell>> {
        let service = self.service()?;
        let scanner = service.scanner_open(namespace, table, spec).await?;
        let mut cells = Vec::new();
        let fetched = loop {
            match service.scanner_get_cells(scanner).await {
                Ok(batch) if batch.is_empty() => break Ok(()),
                Ok(batch) => cells.extend(batch),
                Err(err) => break Err(err),
            }
        };
        let closed = service.scanner_close(scanner).await;
        fetched?;
        closed?;
        Ok(cells)
    }

    /// Reads every cell selected by `spec` in array form
    /// (`[row, family, qualifier, value, timestamp]`).
    pub async fn get_cells_as_arrays(
        &self,
        namespace: Namespace,
        table: &str,
        spec: ScanSpec,
    ) -> Result<Vec<CellAsArray>> {
        let cells = self.get_cells(namespace, table, spec).await?;
        Ok(cells.iter().map(Cell::to_array).collect())
    }

    /// Reads every cell selected by `spec` as an encoded buffer
    /// (see [`decode_cells`](crate::decode_cells)).
    pub async fn get_cells_serialized(&self, namespace: Namespace, table: &str, spec: ScanSpec) -> Result<Bytes> {
        let cells = self.get_cells(namespace, table, spec).await?;
        Ok(encode_cells(cells))
    }

    // ============================================================================================
    // Table Mutators & Scanners
    // ============================================================================================

    /// Opens a buffering mutator.
    ///
    /// A non-zero `flush_interval` flushes the buffer periodically in the background.
    /// `flags` is accepted for wire compatibility and is only recorded in logs;
    /// it does not change how cells are written.
    pub async fn mutator_open(
        &self,
        namespace: Namespace,
        table: &str,
        flags: i32,
        flush_interval: Duration,
    ) -> Result<TableMutatorHandle> {
        let service = self.service()?;
        let handle = self.session.ids.table_mutator();
        let mutator = TableMutator::new(handle, Arc::clone(service), namespace, table.to_string(), flush_interval);
        self.session.table_mutators.insert(handle.id(), Arc::new(mutator));
        debug!(mutator = %handle, table, flags, "table mutator opened");
        Ok(handle)
    }

    fn table_mutator(&self, handle: TableMutatorHandle) -> Result<Arc<TableMutator>> {
        self.service()?;
        self.session
            .table_mutators
            .get(handle.id())
            .ok_or_else(|| Error::InvalidHandle(handle.to_string()))
    }

    /// Buffers cells until the next flush.
    pub async fn mutator_set_cells(&self, handle: TableMutatorHandle, cells: Vec<Cell>) -> Result<()> {
        self.table_mutator(handle)?.set_cells(cells);
        Ok(())
    }

    /// Buffers a single cell.
    pub async fn mutator_set_cell(&self, handle: TableMutatorHandle, cell: Cell) -> Result<()> {
        self.mutator_set_cells(handle, vec![cell]).await
    }

    /// Writes the buffered cells. On failure they stay buffered for the next attempt.
    pub async fn mutator_flush(&self, handle: TableMutatorHandle) -> Result<()> {
        Ok(self.table_mutator(handle)?.flush().await?)
    }

    /// Flushes any buffered cells and closes the mutator.
    pub async fn mutator_close(&self, handle: TableMutatorHandle) -> Result<()> {
        self.service()?;
        let mutator = self
            .session
            .table_mutators
            .remove(handle.id())
            .ok_or_else(|| Error::InvalidHandle(handle.to_string()))?;
        Ok(mutator.close().await?)
    }

    /// Opens a scanner over the cells selected by `spec`.
    pub async fn scanner_open(&self, namespace: Namespace, table: &str, spec: ScanSpec) -> Result<TableScannerHandle> {
        let remote = self.service()?.scanner_open(namespace, table, spec).await?;
        let handle = self.session.ids.table_scanner();
        self.session.table_scanners.insert(handle.id(), Arc::new(remote));
        Ok(handle)
    }

    /// Fetches the next batch. An empty batch means the scanner is exhausted.
    pub async fn scanner_get_cells(&self, handle: TableScannerHandle) -> Result<Vec<Cell>> {
        let service = self.service()?;
        let remote = self
            .session
            .table_scanners
            .get(handle.id())
            .ok_or_else(|| Error::InvalidHandle(handle.to_string()))?;
        Ok(service.scanner_get_cells(*remote).await?)
    }

    /// Closes a scanner, even before it is exhausted.
    pub async fn scanner_close(&self, handle: TableScannerHandle) -> Result<()> {
        let service = self.service()?;
        let remote = self
            .session
            .table_scanners
            .remove(handle.id())
            .ok_or_else(|| Error::InvalidHandle(handle.to_string()))?;
        Ok(service.scanner_close(*remote).await?)
    }

    // ============================================================================================
    // Futures
    // ============================================================================================

    /// Opens a future that collects results from async mutators and scanners.
    ///
    /// # Arguments
    /// * `capacity` - Maximum buffered results. 0 uses [`ClientConfig::future_capacity`].
    pub async fn future_open(&self, capacity: usize) -> Result<FutureHandle> {
        self.service()?;
        let handle = self.session.ids.future();
        let capacity = self.session.config.resolve_capacity(capacity);
        self.session
            .futures
            .insert(handle.id(), Arc::new(FutureCore::new(handle, capacity)));
        debug!(future = %handle, capacity, "future opened");
        Ok(handle)
    }

    fn future(&self, handle: FutureHandle) -> Result<Arc<FutureCore>> {
        self.service()?;
        self.session
            .futures
            .get(handle.id())
            .ok_or_else(|| Error::Closed(handle.to_string()))
    }

    /// Waits up to `timeout_ms` for the next result.
    ///
    /// Returns [`FutureResult::Empty`] once every submitted operation has
    /// delivered and the queue is drained; callers loop until they see it.
    /// Fails with [`Error::Timeout`] when nothing arrives in time (nothing is
    /// consumed, so retrying is safe) and with [`Error::Closed`] if the future
    /// is closed while waiting.
    pub async fn future_get_result(&self, handle: FutureHandle, timeout_ms: u64) -> Result<FutureResult> {
        let future = self.future(handle)?;
        future.get_result(Duration::from_millis(timeout_ms)).await
    }

    /// Like [`future_get_result`](Self::future_get_result), with scan batches
    /// as an encoded buffer (see [`decode_cells`](crate::decode_cells)).
    pub async fn future_get_result_serialized(
        &self,
        handle: FutureHandle,
        timeout_ms: u64,
    ) -> Result<SerializedResult> {
        Ok(self.future_get_result(handle, timeout_ms).await?.into_serialized())
    }

    /// Like [`future_get_result`](Self::future_get_result), with scan batch
    /// cells flattened to string arrays.
    pub async fn future_get_result_as_arrays(&self, handle: FutureHandle, timeout_ms: u64) -> Result<ArraysResult> {
        Ok(self.future_get_result(handle, timeout_ms).await?.into_arrays())
    }

    /// Streams results until the empty sentinel.
    ///
    /// Timeouts are yielded as errors and polling continues; any other error
    /// ends the stream after it is yielded.
    pub fn future_results(
        &self,
        handle: FutureHandle,
        timeout_ms: u64,
    ) -> impl Stream<Item = Result<FutureResult>> + Send + 'static {
        let client = self.clone();
        async_stream::stream! {
            loop {
                match client.future_get_result(handle, timeout_ms).await {
                    Ok(result) if result.is_empty() => break,
                    Ok(result) => yield Ok(result),
                    Err(err) if err.is_timeout() => yield Err(err),
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        }
    }

    /// `true` once [`future_cancel`](Self::future_cancel) has been called.
    pub async fn future_is_cancelled(&self, handle: FutureHandle) -> Result<bool> {
        self.future(handle)?.is_cancelled()
    }

    /// `true` when the queue holds as many results as its capacity.
    pub async fn future_is_full(&self, handle: FutureHandle) -> Result<bool> {
        self.future(handle)?.is_full()
    }

    /// `true` when no result is buffered and no operation is outstanding.
    pub async fn future_is_empty(&self, handle: FutureHandle) -> Result<bool> {
        self.future(handle)?.is_empty()
    }

    /// `true` while some submitted operation has not delivered its final result.
    pub async fn future_has_outstanding(&self, handle: FutureHandle) -> Result<bool> {
        self.future(handle)?.has_outstanding()
    }

    /// Cancels the future. Idempotent.
    pub async fn future_cancel(&self, handle: FutureHandle) -> Result<()> {
        self.future(handle)?.cancel()?;
        Ok(())
    }

    /// Closes the future, dropping buffered results and failing pending polls.
    pub async fn future_close(&self, handle: FutureHandle) -> Result<()> {
        self.service()?;
        let future = self
            .session
            .futures
            .remove(handle.id())
            .ok_or_else(|| Error::Closed(handle.to_string()))?;
        future.close();
        Ok(())
    }

    // ============================================================================================
    // Async Mutators
    // ============================================================================================

    /// Opens a mutator whose flushes complete through `future`.
    ///
    /// `flags` is accepted for wire compatibility and is only recorded in logs.
    pub async fn async_mutator_open(
        &self,
        namespace: Namespace,
        table: &str,
        future: FutureHandle,
        flags: i32,
    ) -> Result<MutatorHandle> {
        let service = self.service()?;
        let core = self.future(future)?;
        core.check_accepting()?;
        let handle = self.session.ids.mutator();
        let mutator = AsyncMutator::spawn(handle, Arc::clone(service), namespace, table.to_string(), &core);
        self.session.mutators.insert(handle.id(), Arc::new(mutator));
        debug!(mutator = %handle, future = %core.handle(), table, flags, "async mutator opened");
        Ok(handle)
    }

    fn async_mutator(&self, handle: MutatorHandle) -> Result<Arc<AsyncMutator>> {
        self.service()?;
        self.session
            .mutators
            .get(handle.id())
            .ok_or_else(|| Error::InvalidHandle(format!("{handle} is closed")))
    }

    /// Buffers cells for the next flush. Fails with [`Error::InvalidHandle`]
    /// once the mutator is closed or its future cancelled.
    pub async fn async_mutator_set_cells(&self, handle: MutatorHandle, cells: Vec<Cell>) -> Result<()> {
        self.async_mutator(handle)?.set_cells(cells)
    }

    /// Buffers a single cell for the next flush.
    pub async fn async_mutator_set_cell(&self, handle: MutatorHandle, cell: Cell) -> Result<()> {
        self.async_mutator(handle)?.set_cells(vec![cell])
    }

    /// Submits the buffered cells. The write completes as one result on the
    /// mutator's future.
    pub async fn async_mutator_flush(&self, handle: MutatorHandle) -> Result<()> {
        self.async_mutator(handle)?.flush()
    }

    /// Closes the mutator.
    ///
    /// Call only after every flush has delivered its result; otherwise this
    /// fails with [`Error::FlushInFlight`] and the mutator stays open.
    pub async fn async_mutator_close(&self, handle: MutatorHandle) -> Result<()> {
        self.async_mutator(handle)?.close()?;
        self.session.mutators.remove(handle.id());
        debug!(mutator = %handle, "async mutator closed");
        Ok(())
    }

    // ============================================================================================
    // Async Scanners
    // ============================================================================================

    /// Opens a scanner whose batches are delivered through `future`.
    ///
    /// The future counts the scanner as outstanding until its stream is
    /// exhausted, fails, or the scanner is closed.
    pub async fn async_scanner_open(
        &self,
        namespace: Namespace,
        table: &str,
        future: FutureHandle,
        spec: ScanSpec,
    ) -> Result<ScannerHandle> {
        let service = self.service()?;
        let core = self.future(future)?;
        let guard = core.register()?;
        let remote = service.scanner_open(namespace, table, spec).await?;
        let handle = self.session.ids.scanner();
        let scanner = AsyncScanner::spawn(handle, Arc::clone(service), remote, guard);
        self.session.scanners.insert(handle.id(), Arc::new(scanner));
        debug!(scanner = %handle, future = %core.handle(), table, "async scanner opened");
        Ok(handle)
    }

    /// Stops the scanner, even before its stream is exhausted.
    pub async fn async_scanner_close(&self, handle: ScannerHandle) -> Result<()> {
        self.service()?;
        let scanner = self
            .session
            .scanners
            .remove(handle.id())
            .ok_or_else(|| Error::InvalidHandle(format!("{handle} is closed")))?;
        scanner.close().await?;
        debug!(scanner = %handle, "async scanner closed");
        Ok(())
    }
}
