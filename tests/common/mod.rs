//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use hypertable_client::{
    Cell, ClientConfig, FutureHandle, FutureResult, HypertableClient, Key, MemoryService,
    MemoryServiceOptions, Namespace,
};

/// Namespace every fixture creates and opens.
pub const TEST_NAMESPACE: &str = "test";

/// Poll timeout used when a result is expected promptly.
pub const POLL_TIMEOUT_MS: u64 = 10_000;

/// A client wired to an in-memory service with an open test namespace.
pub struct Fixture {
    pub service: Arc<MemoryService>,
    pub client: HypertableClient,
    pub ns: Namespace,
}

/// Build a fixture with the given service options and empty tables.
pub async fn fixture_with(options: MemoryServiceOptions, tables: &[&str]) -> Fixture {
    let service = Arc::new(MemoryService::new(options));
    let client = HypertableClient::with_service(service.clone(), ClientConfig::default());
    client.namespace_create(TEST_NAMESPACE).await.unwrap();
    for table in tables {
        service.create_table(TEST_NAMESPACE, table).unwrap();
    }
    let ns = client.namespace_open(TEST_NAMESPACE).await.unwrap();
    Fixture { service, client, ns }
}

pub async fn fixture(tables: &[&str]) -> Fixture {
    fixture_with(MemoryServiceOptions::default(), tables).await
}

pub fn cell(row: &str, family: &str, value: &str) -> Cell {
    Cell::new(Key::new(row, family)).with_value(value)
}

/// Cells `row00..rowNN` in family `col`.
pub fn rows(count: usize) -> Vec<Cell> {
    (0..count)
        .map(|i| cell(&format!("row{i:02}"), "col", &format!("v{i}")))
        .collect()
}

/// Poll `future` until the empty sentinel, returning every non-empty result.
pub async fn drain(client: &HypertableClient, future: FutureHandle) -> Vec<FutureResult> {
    let mut results = Vec::new();
    loop {
        let result = client.future_get_result(future, POLL_TIMEOUT_MS).await.unwrap();
        if result.is_empty() {
            return results;
        }
        results.push(result);
    }
}
