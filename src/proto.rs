//! Wire messages and the gRPC client stub for the `hypertable.TableService` service.
//!
//! The messages are declared directly with `prost` derives so the crate
//! builds without a protobuf compiler.

#![allow(clippy::all)]

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, Message)]
pub struct Key {
    #[prost(string, tag = "1")]
    pub row: String,
    #[prost(string, tag = "2")]
    pub column_family: String,
    #[prost(string, tag = "3")]
    pub column_qualifier: String,
    #[prost(int64, optional, tag = "4")]
    pub timestamp: Option<i64>,
    #[prost(int64, optional, tag = "5")]
    pub revision: Option<i64>,
    #[prost(int32, tag = "6")]
    pub flag: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Cell {
    #[prost(message, optional, tag = "1")]
    pub key: Option<Key>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub value: Option<Vec<u8>>,
}

/// The serialized form of a group of cells.
#[derive(Clone, PartialEq, Message)]
pub struct CellBatch {
    #[prost(message, repeated, tag = "1")]
    pub cells: Vec<Cell>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RowInterval {
    #[prost(string, tag = "1")]
    pub start_row: String,
    #[prost(bool, tag = "2")]
    pub start_inclusive: bool,
    #[prost(string, tag = "3")]
    pub end_row: String,
    #[prost(bool, tag = "4")]
    pub end_inclusive: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct ColumnPredicate {
    #[prost(string, tag = "1")]
    pub column_family: String,
    #[prost(string, optional, tag = "2")]
    pub column_qualifier: Option<String>,
    #[prost(int32, tag = "3")]
    pub operation: i32,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub value: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ScanSpec {
    #[prost(message, repeated, tag = "1")]
    pub row_intervals: Vec<RowInterval>,
    #[prost(string, repeated, tag = "2")]
    pub columns: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub column_predicates: Vec<ColumnPredicate>,
    #[prost(bool, tag = "4")]
    pub and_column_predicates: bool,
    #[prost(uint32, tag = "5")]
    pub versions: u32,
    #[prost(uint32, tag = "6")]
    pub row_limit: u32,
    #[prost(uint32, tag = "7")]
    pub cell_limit: u32,
    #[prost(int64, optional, tag = "8")]
    pub start_time: Option<i64>,
    #[prost(int64, optional, tag = "9")]
    pub end_time: Option<i64>,
    #[prost(bool, tag = "10")]
    pub keys_only: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct NamespaceNameRequest {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct NamespaceExistsResponse {
    #[prost(bool, tag = "1")]
    pub exists: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct NamespaceIdMessage {
    #[prost(uint64, tag = "1")]
    pub namespace_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct NamespaceListing {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bool, tag = "2")]
    pub is_namespace: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct NamespaceListingResponse {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<NamespaceListing>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WriteCellsRequest {
    #[prost(uint64, tag = "1")]
    pub namespace_id: u64,
    #[prost(string, tag = "2")]
    pub table: String,
    #[prost(message, repeated, tag = "3")]
    pub cells: Vec<Cell>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ScannerOpenRequest {
    #[prost(uint64, tag = "1")]
    pub namespace_id: u64,
    #[prost(string, tag = "2")]
    pub table: String,
    #[prost(message, optional, tag = "3")]
    pub spec: Option<ScanSpec>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ScannerIdMessage {
    #[prost(uint64, tag = "1")]
    pub scanner_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct CellsResponse {
    #[prost(message, repeated, tag = "1")]
    pub cells: Vec<Cell>,
}

pub mod table_service_client {
    use tonic::codegen::http::uri::PathAndQuery;
    use tonic::transport::{Channel, Endpoint};
    use tonic::{Request, Status};

    use super::*;

    /// Unary client for `hypertable.TableService`.
    #[derive(Debug, Clone)]
    pub struct TableServiceClient {
        inner: tonic::client::Grpc<Channel>,
    }

    impl TableServiceClient {
        pub async fn connect(endpoint: Endpoint) -> Result<Self, tonic::transport::Error> {
            let channel = endpoint.connect().await?;
            Ok(Self::new(channel))
        }

        pub fn new(channel: Channel) -> Self {
            Self {
                inner: tonic::client::Grpc::new(channel),
            }
        }

        async fn unary<Req, Resp>(&mut self, request: Req, path: &'static str) -> Result<Resp, Status>
        where
            Req: prost::Message + Send + Sync + 'static,
            Resp: prost::Message + Default + Send + Sync + 'static,
        {
            self.inner
                .ready()
                .await
                .map_err(|e| Status::unavailable(format!("service was not ready: {e}")))?;
            let codec: tonic::codec::ProstCodec<Req, Resp> = tonic::codec::ProstCodec::default();
            let path = PathAndQuery::from_static(path);
            let response = self.inner.unary(Request::new(request), path, codec).await?;
            Ok(response.into_inner())
        }

        pub async fn namespace_exists(
            &mut self,
            request: NamespaceNameRequest,
        ) -> Result<NamespaceExistsResponse, Status> {
            self.unary(request, "/hypertable.TableService/NamespaceExists").await
        }

        pub async fn namespace_create(&mut self, request: NamespaceNameRequest) -> Result<Empty, Status> {
            self.unary(request, "/hypertable.TableService/NamespaceCreate").await
        }

        pub async fn namespace_open(
            &mut self,
            request: NamespaceNameRequest,
        ) -> Result<NamespaceIdMessage, Status> {
            self.unary(request, "/hypertable.TableService/NamespaceOpen").await
        }

        pub async fn namespace_close(&mut self, request: NamespaceIdMessage) -> Result<Empty, Status> {
            self.unary(request, "/hypertable.TableService/NamespaceClose").await
        }

        pub async fn namespace_get_listing(
            &mut self,
            request: NamespaceIdMessage,
        ) -> Result<NamespaceListingResponse, Status> {
            self.unary(request, "/hypertable.TableService/NamespaceGetListing").await
        }

        pub async fn write_cells(&mut self, request: WriteCellsRequest) -> Result<Empty, Status> {
            self.unary(request, "/hypertable.TableService/WriteCells").await
        }

        pub async fn scanner_open(
            &mut self,
            request: ScannerOpenRequest,
        ) -> Result<ScannerIdMessage, Status> {
            self.unary(request, "/hypertable.TableService/ScannerOpen").await
        }

        pub async fn scanner_get_cells(
            &mut self,
            request: ScannerIdMessage,
        ) -> Result<CellsResponse, Status> {
            self.unary(request, "/hypertable.TableService/ScannerGetCells").await
        }

        pub async fn scanner_close(&mut self, request: ScannerIdMessage) -> Result<Empty, Status> {
            self.unary(request, "/hypertable.TableService/ScannerClose").await
        }
    }
}
