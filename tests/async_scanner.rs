mod common;

use std::collections::HashMap;
use std::time::Duration;

use hypertable_client::{Error, FutureResult, MemoryServiceOptions, Producer, RowInterval, ScanSpec};

use common::*;

#[tokio::test]
async fn scanners_multiplex_onto_one_future() {
    let options = MemoryServiceOptions {
        batch_size: 2,
        ..Default::default()
    };
    let fx = fixture_with(options, &["a", "b", "c"]).await;
    fx.client.set_cells(fx.ns, "a", rows(5)).await.unwrap();
    fx.client.set_cells(fx.ns, "b", rows(3)).await.unwrap();

    let future = fx.client.future_open(0).await.unwrap();
    let mut tables = HashMap::new();
    for table in ["a", "b", "c"] {
        let scanner = fx
            .client
            .async_scanner_open(fx.ns, table, future, ScanSpec::new())
            .await
            .unwrap();
        tables.insert(scanner, table);
    }

    let mut rows_by_table: HashMap<&str, Vec<String>> = HashMap::new();
    for result in drain(&fx.client, future).await {
        match result {
            FutureResult::ScanBatch { scanner, cells } => {
                assert!(cells.len() <= 2);
                rows_by_table
                    .entry(tables[&scanner])
                    .or_default()
                    .extend(cells.into_iter().map(|c| c.key.row));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
    assert_eq!(rows_by_table["a"], vec!["row00", "row01", "row02", "row03", "row04"]);
    assert_eq!(rows_by_table["b"], vec!["row00", "row01", "row02"]);
    assert!(!rows_by_table.contains_key("c"));

    for scanner in tables.into_keys() {
        fx.client.async_scanner_close(scanner).await.unwrap();
    }
    assert_eq!(fx.service.open_scanners(), 0);
    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn scan_spec_is_applied_to_async_scans() {
    let fx = fixture(&["t"]).await;
    fx.client.set_cells(fx.ns, "t", rows(10)).await.unwrap();
    let future = fx.client.future_open(0).await.unwrap();
    let spec = ScanSpec::new()
        .with_row_interval(RowInterval::new("row03", "row06").with_end_inclusive(false))
        .with_keys_only(true);
    let scanner = fx.client.async_scanner_open(fx.ns, "t", future, spec).await.unwrap();

    let results = drain(&fx.client, future).await;
    let cells: Vec<_> = results.iter().flat_map(|r| r.cells().iter().cloned()).collect();
    let rows: Vec<_> = cells.iter().map(|c| c.key.row.as_str()).collect();
    assert_eq!(rows, vec!["row03", "row04", "row05"]);
    assert!(cells.iter().all(|c| c.value.is_none()));

    fx.client.async_scanner_close(scanner).await.unwrap();
    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn early_close_releases_outstanding() {
    let options = MemoryServiceOptions {
        batch_size: 1,
        ..Default::default()
    };
    let fx = fixture_with(options, &["t"]).await;
    fx.client.set_cells(fx.ns, "t", rows(10)).await.unwrap();
    let future = fx.client.future_open(1).await.unwrap();
    let scanner = fx
        .client
        .async_scanner_open(fx.ns, "t", future, ScanSpec::new())
        .await
        .unwrap();

    let first = fx.client.future_get_result(future, POLL_TIMEOUT_MS).await.unwrap();
    assert_eq!(first.cells().len(), 1);
    assert_eq!(first.cells()[0].key.row, "row00");
    assert!(fx.client.future_has_outstanding(future).await.unwrap());

    fx.client.async_scanner_close(scanner).await.unwrap();
    assert!(!fx.client.future_has_outstanding(future).await.unwrap());
    assert_eq!(fx.service.open_scanners(), 0);

    // At most the one batch that was already queued remains.
    let rest = drain(&fx.client, future).await;
    assert!(rest.len() <= 1);
    assert!(rest.iter().all(|r| r.producer() == Some(Producer::Scanner(scanner))));

    assert!(matches!(
        fx.client.async_scanner_close(scanner).await,
        Err(Error::InvalidHandle(_))
    ));
    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn failed_fetch_is_delivered_as_error_result() {
    let fx = fixture(&["t"]).await;
    fx.client.set_cells(fx.ns, "t", rows(3)).await.unwrap();
    fx.service.fail_table("t", "scan aborted");
    let future = fx.client.future_open(0).await.unwrap();
    let scanner = fx
        .client
        .async_scanner_open(fx.ns, "t", future, ScanSpec::new())
        .await
        .unwrap();

    let results = drain(&fx.client, future).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].producer(), Some(Producer::Scanner(scanner)));
    assert!(results[0].error_message().unwrap().contains("scan aborted"));
    assert!(!fx.client.future_is_cancelled(future).await.unwrap());

    fx.client.async_scanner_close(scanner).await.unwrap();
    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn cancel_stops_scanner_at_next_fetch() {
    let options = MemoryServiceOptions {
        batch_size: 1,
        scan_latency: Duration::from_millis(20),
        ..Default::default()
    };
    let fx = fixture_with(options, &["t"]).await;
    fx.client.set_cells(fx.ns, "t", rows(10)).await.unwrap();
    let future = fx.client.future_open(0).await.unwrap();
    let scanner = fx
        .client
        .async_scanner_open(fx.ns, "t", future, ScanSpec::new())
        .await
        .unwrap();

    let first = fx.client.future_get_result(future, POLL_TIMEOUT_MS).await.unwrap();
    assert!(first.is_scan());
    fx.client.future_cancel(future).await.unwrap();

    let rest = drain(&fx.client, future).await;
    assert!(rest.len() < 9, "scanner kept running after cancel: {} batches", rest.len());
    assert!(!fx.client.future_has_outstanding(future).await.unwrap());

    fx.client.async_scanner_close(scanner).await.unwrap();
    assert_eq!(fx.service.open_scanners(), 0);
    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn open_on_missing_table_fails_without_registering() {
    let fx = fixture(&[]).await;
    let future = fx.client.future_open(0).await.unwrap();

    let err = fx
        .client
        .async_scanner_open(fx.ns, "missing", future, ScanSpec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RemoteOperation { .. }), "got {err:?}");
    assert!(!fx.client.future_has_outstanding(future).await.unwrap());
    assert!(fx.client.future_get_result(future, 10).await.unwrap().is_empty());

    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn closing_future_unblocks_scanner() {
    let options = MemoryServiceOptions {
        batch_size: 1,
        ..Default::default()
    };
    let fx = fixture_with(options, &["t"]).await;
    fx.client.set_cells(fx.ns, "t", rows(5)).await.unwrap();
    let future = fx.client.future_open(1).await.unwrap();
    let scanner = fx
        .client
        .async_scanner_open(fx.ns, "t", future, ScanSpec::new())
        .await
        .unwrap();

    // The scanner fills the single slot and then blocks on the next batch.
    tokio::time::sleep(Duration::from_millis(50)).await;
    fx.client.future_close(future).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), fx.client.async_scanner_close(scanner))
        .await
        .expect("scanner close hung")
        .unwrap();
    assert_eq!(fx.service.open_scanners(), 0);
}
