//! Connects to a table service gateway and streams a table through a future.
//!
//! ```text
//! HYPERTABLE_HOST=10.0.0.11 cargo run --example scan_table -- <namespace> <table>
//! ```

use futures::StreamExt;
use hypertable_client::{ClientConfig, FutureResult, HypertableClient, ScanSpec};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,h2=warn,hyper=warn".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let namespace = args.next().unwrap_or_else(|| "/".to_string());
    let table = args.next().ok_or("usage: scan_table <namespace> <table>")?;

    let client = HypertableClient::connect(ClientConfig::from_env()).await?;
    let ns = client.namespace_open(&namespace).await?;

    let future = client.future_open(64).await?;
    let scanner = client
        .async_scanner_open(ns, &table, future, ScanSpec::new().with_versions(1))
        .await?;

    let mut total = 0usize;
    let mut results = Box::pin(client.future_results(future, 30_000));
    while let Some(result) = results.next().await {
        match result {
            Ok(FutureResult::ScanBatch { cells, .. }) => {
                total += cells.len();
                for cell in cells {
                    println!("{}", cell.to_array().join("\t"));
                }
            }
            Ok(FutureResult::Error { message, .. }) => {
                warn!(%message, "scan failed");
                break;
            }
            Ok(_) => {}
            Err(err) if err.is_timeout() => warn!("still waiting for the next batch"),
            Err(err) => return Err(err.into()),
        }
    }
    info!(table = %table, cells = total, "scan finished");

    client.async_scanner_close(scanner).await?;
    client.future_close(future).await?;
    client.namespace_close(ns).await?;
    client.close().await;
    Ok(())
}
