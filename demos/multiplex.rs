//! Writes to two tables through async mutators and scans one of them,
//! with every completion arriving on a single future.
//!
//! Runs against an in-process service. Set `RUST_LOG=hypertable_client=debug`
//! to watch the handles open and close.

use std::sync::Arc;

use hypertable_client::{Cell, ClientConfig, FutureResult, HypertableClient, Key, MemoryService, ScanSpec};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let service = Arc::new(MemoryService::default());
    let client = HypertableClient::with_service(service.clone(), ClientConfig::from_env());
    client.namespace_create("demo").await?;
    service.create_table("demo", "clicks")?;
    service.create_table("demo", "views")?;
    let ns = client.namespace_open("demo").await?;

    // Seed something for the scanner to read.
    let seed = (0..5)
        .map(|i| Cell::new(Key::new(format!("page{i}"), "hits")).with_value(format!("{}", i * 10)))
        .collect();
    client.set_cells(ns, "views", seed).await?;

    let future = client.future_open(0).await?;
    let clicks = client.async_mutator_open(ns, "clicks", future, 0).await?;
    let views = client.async_mutator_open(ns, "views", future, 0).await?;
    let scanner = client.async_scanner_open(ns, "views", future, ScanSpec::new()).await?;

    client
        .async_mutator_set_cell(clicks, Cell::new(Key::new("user1", "button").with_qualifier("buy")).with_value("1"))
        .await?;
    client.async_mutator_flush(clicks).await?;
    client
        .async_mutator_set_cell(views, Cell::new(Key::new("page9", "hits")).with_value("90"))
        .await?;
    client.async_mutator_flush(views).await?;

    loop {
        let result = client.future_get_result(future, 5_000).await?;
        match result {
            FutureResult::Empty => break,
            FutureResult::WriteAck { mutator } => println!("write applied by {mutator}"),
            FutureResult::ScanBatch { scanner, cells } => {
                println!("{scanner} returned {} cells", cells.len());
                for cell in &cells {
                    println!("  {:?}", cell.to_array());
                }
            }
            FutureResult::Error { producer, message } => eprintln!("{producer:?} failed: {message}"),
        }
    }

    client.async_scanner_close(scanner).await?;
    client.async_mutator_close(clicks).await?;
    client.async_mutator_close(views).await?;
    client.future_close(future).await?;
    client.close().await;
    Ok(())
}
