//! # Hypertable Rust Client
//!
//! An async Rust client for Hypertable-style table storage.
//!
//! ## Overview
//!
//! The client drives a table service through the [`TableService`] boundary
//! (gRPC via [`GrpcTableService`], or the in-process [`MemoryService`]).
//! It supports:
//! - Namespace management (exists, create, open, close, listing)
//! - Cell reads and writes, including serialized and array forms
//! - Buffering table mutators and table scanners
//! - Futures that multiplex results from async mutators and scanners
//!
//! ## Futures
//!
//! A future collects one result per completed async operation. Callers poll
//! it with a bounded wait until [`FutureResult::Empty`] arrives, which means
//! every submitted operation has delivered.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hypertable_client::{Cell, ClientConfig, HypertableClient, Key, MemoryService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = Arc::new(MemoryService::default());
//!     service.create_table("/", "events")?;
//!     let client = HypertableClient::with_service(service, ClientConfig::default());
//!     let ns = client.namespace_open("/").await?;
//!
//!     let future = client.future_open(0).await?;
//!     let mutator = client.async_mutator_open(ns, "events", future, 0).await?;
//!     client
//!         .async_mutator_set_cell(mutator, Cell::new(Key::new("row1", "data")).with_value("v"))
//!         .await?;
//!     client.async_mutator_flush(mutator).await?;
//!
//!     loop {
//!         let result = client.future_get_result(future, 10_000).await?;
//!         if result.is_empty() {
//!             break;
//!         }
//!         // inspect result ...
//!     }
//!
//!     client.async_mutator_close(mutator).await?;
//!     client.future_close(future).await?;
//!     Ok(())
//! }
//! ```

pub mod proto;

mod async_mutator;
mod async_scanner;
mod client;
mod error;
mod future;
mod memory;
mod registry;
mod result;
mod service;
mod table_mutator;
mod transport;
mod types;

pub use client::*;
pub use error::{Error, Result};
pub use memory::{MemoryService, MemoryServiceOptions};
pub use registry::{FutureHandle, MutatorHandle, ScannerHandle, TableMutatorHandle, TableScannerHandle};
pub use result::{decode_cells, encode_cells, ArraysResult, FutureResult, Producer, SerializedResult};
pub use service::{RemoteScanner, ServiceError, TableService};
pub use transport::GrpcTableService;
pub use types::*;
