//! The RPC boundary between the client and the table service.
//!
//! Everything behind [`TableService`] (transport, storage, encoding) is owned
//! by the service. The client only drives it: the future machinery in this
//! crate is built entirely from these raw calls.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Cell, Namespace, NamespaceListing, ScanSpec};

/// Failure reported by a [`TableService`] call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The service could not be reached.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service executed the call and reported a failure.
    #[error("{message} (code {code})")]
    Remote {
        /// Service-specific error code, 0 when unknown.
        code: i32,
        message: String,
    },
}

impl ServiceError {
    pub fn remote(message: impl Into<String>) -> Self {
        ServiceError::Remote {
            code: 0,
            message: message.into(),
        }
    }
}

impl From<tonic::Status> for ServiceError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::Unavailable | tonic::Code::Cancelled => {
                ServiceError::Unavailable(status.message().to_string())
            }
            code => ServiceError::Remote {
                code: code as i32,
                message: status.message().to_string(),
            },
        }
    }
}

/// A scanner opened on the service side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RemoteScanner(u64);

impl RemoteScanner {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Raw operations exposed by a table service.
#[async_trait]
pub trait TableService: Send + Sync + 'static {
    async fn namespace_exists(&self, name: &str) -> Result<bool, ServiceError>;

    async fn namespace_create(&self, name: &str) -> Result<(), ServiceError>;

    async fn namespace_open(&self, name: &str) -> Result<Namespace, ServiceError>;

    async fn namespace_close(&self, namespace: Namespace) -> Result<(), ServiceError>;

    async fn namespace_get_listing(
        &self,
        namespace: Namespace,
    ) -> Result<Vec<NamespaceListing>, ServiceError>;

    /// Applies `cells` to `table` in one request.
    async fn write_cells(
        &self,
        namespace: Namespace,
        table: &str,
        cells: Vec<Cell>,
    ) -> Result<(), ServiceError>;

    async fn scanner_open(
        &self,
        namespace: Namespace,
        table: &str,
        spec: ScanSpec,
    ) -> Result<RemoteScanner, ServiceError>;

    /// Fetches the next batch of cells. An empty batch means the scanner is exhausted.
    async fn scanner_get_cells(&self, scanner: RemoteScanner) -> Result<Vec<Cell>, ServiceError>;

    async fn scanner_close(&self, scanner: RemoteScanner) -> Result<(), ServiceError>;
}
