use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};

use crate::proto::table_service_client::TableServiceClient;
use crate::proto::*;
use crate::service::{RemoteScanner, ServiceError, TableService};
use crate::types::{self, ClientConfig, Namespace, NamespaceListing};

/// [`TableService`] over a gRPC channel.
///
/// # Cloning
/// Cheap to clone. Clones share the underlying channel.
#[derive(Clone, Debug)]
pub struct GrpcTableService {
    client: TableServiceClient,
}

impl GrpcTableService {
    /// Connects to the endpoint described by `config`.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ServiceError> {
        let mut endpoint = Endpoint::from_shared(config.endpoint_uri())
            .map_err(|e| ServiceError::Unavailable(format!("invalid endpoint: {e}")))?
            .connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.timeout {
            endpoint = endpoint.timeout(timeout);
        }
        let client = TableServiceClient::connect(endpoint)
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }

    /// Create a service from an existing Tonic `Channel`.
    pub fn new(channel: Channel) -> Self {
        Self {
            client: TableServiceClient::new(channel),
        }
    }
}

#[async_trait]
impl TableService for GrpcTableService {
    async fn namespace_exists(&self, name: &str) -> Result<bool, ServiceError> {
        let req = NamespaceNameRequest { name: name.to_string() };
        let resp = self.client.clone().namespace_exists(req).await?;
        Ok(resp.exists)
    }

    async fn namespace_create(&self, name: &str) -> Result<(), ServiceError> {
        let req = NamespaceNameRequest { name: name.to_string() };
        self.client.clone().namespace_create(req).await?;
        Ok(())
    }

    async fn namespace_open(&self, name: &str) -> Result<Namespace, ServiceError> {
        let req = NamespaceNameRequest { name: name.to_string() };
        let resp = self.client.clone().namespace_open(req).await?;
        Ok(Namespace::new(resp.namespace_id))
    }

    async fn namespace_close(&self, namespace: Namespace) -> Result<(), ServiceError> {
        let req = NamespaceIdMessage { namespace_id: namespace.id() };
        self.client.clone().namespace_close(req).await?;
        Ok(())
    }

    async fn namespace_get_listing(
        &self,
        namespace: Namespace,
    ) -> Result<Vec<NamespaceListing>, ServiceError> {
        let req = NamespaceIdMessage { namespace_id: namespace.id() };
        let resp = self.client.clone().namespace_get_listing(req).await?;
        Ok(resp.entries.into_iter().map(Into::into).collect())
    }

    async fn write_cells(
        &self,
        namespace: Namespace,
        table: &str,
        cells: Vec<types::Cell>,
    ) -> Result<(), ServiceError> {
        let req = WriteCellsRequest {
            namespace_id: namespace.id(),
            table: table.to_string(),
            cells: cells.into_iter().map(Into::into).collect(),
        };
        self.client.clone().write_cells(req).await?;
        Ok(())
    }

    async fn scanner_open(
        &self,
        namespace: Namespace,
        table: &str,
        spec: types::ScanSpec,
    ) -> Result<RemoteScanner, ServiceError> {
        let req = ScannerOpenRequest {
            namespace_id: namespace.id(),
            table: table.to_string(),
            spec: Some(spec.into()),
        };
        let resp = self.client.clone().scanner_open(req).await?;
        Ok(RemoteScanner::new(resp.scanner_id))
    }

    async fn scanner_get_cells(&self, scanner: RemoteScanner) -> Result<Vec<types::Cell>, ServiceError> {
        let req = ScannerIdMessage { scanner_id: scanner.id() };
        let resp = self.client.clone().scanner_get_cells(req).await?;
        Ok(resp.cells.into_iter().map(Into::into).collect())
    }

    async fn scanner_close(&self, scanner: RemoteScanner) -> Result<(), ServiceError> {
        let req = ScannerIdMessage { scanner_id: scanner.id() };
        self.client.clone().scanner_close(req).await?;
        Ok(())
    }
}
