mod common;

use std::time::{Duration, Instant};

use futures::StreamExt;
use hypertable_client::{decode_cells, Error, FutureResult, MemoryServiceOptions};

use common::*;

#[tokio::test]
async fn empty_future_returns_sentinel_immediately() {
    let fx = fixture(&[]).await;
    let future = fx.client.future_open(0).await.unwrap();

    assert!(fx.client.future_is_empty(future).await.unwrap());
    assert!(!fx.client.future_has_outstanding(future).await.unwrap());
    assert!(!fx.client.future_is_full(future).await.unwrap());
    assert!(!fx.client.future_is_cancelled(future).await.unwrap());

    let result = fx.client.future_get_result(future, 10).await.unwrap();
    assert!(result.is_empty());
    assert_eq!(result.producer(), None);

    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn drain_yields_every_completion_exactly_once() {
    let fx = fixture(&["a", "b"]).await;
    fx.client.set_cells(fx.ns, "b", rows(3)).await.unwrap();
    let future = fx.client.future_open(0).await.unwrap();

    let mut mutators = Vec::new();
    for table in ["a", "a", "b"] {
        let mutator = fx.client.async_mutator_open(fx.ns, table, future, 0).await.unwrap();
        fx.client.async_mutator_set_cells(mutator, rows(2)).await.unwrap();
        fx.client.async_mutator_flush(mutator).await.unwrap();
        mutators.push(mutator);
    }
    let scanner = fx
        .client
        .async_scanner_open(fx.ns, "b", future, Default::default())
        .await
        .unwrap();

    let results = drain(&fx.client, future).await;
    let acks = results
        .iter()
        .filter(|r| matches!(r, FutureResult::WriteAck { .. }))
        .count();
    let scanned: usize = results.iter().filter(|r| r.is_scan()).map(|r| r.cells().len()).sum();
    assert_eq!(acks, 3);
    assert!(scanned >= 3);
    assert!(results.iter().all(|r| !r.is_error()));

    // Every mutator acknowledged exactly once.
    for mutator in &mutators {
        let mine = results
            .iter()
            .filter(|r| matches!(r, FutureResult::WriteAck { mutator: m } if m == mutator))
            .count();
        assert_eq!(mine, 1);
    }

    assert!(fx.client.future_get_result(future, 10).await.unwrap().is_empty());
    assert!(fx.client.future_is_empty(future).await.unwrap());

    for mutator in mutators {
        fx.client.async_mutator_close(mutator).await.unwrap();
    }
    fx.client.async_scanner_close(scanner).await.unwrap();
    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn outstanding_tracks_in_flight_work() {
    let options = MemoryServiceOptions {
        write_latency: Duration::from_millis(200),
        ..Default::default()
    };
    let fx = fixture_with(options, &["t"]).await;
    let future = fx.client.future_open(0).await.unwrap();
    let mutator = fx.client.async_mutator_open(fx.ns, "t", future, 0).await.unwrap();

    // Opening a mutator registers nothing.
    assert!(!fx.client.future_has_outstanding(future).await.unwrap());

    fx.client.async_mutator_set_cells(mutator, rows(1)).await.unwrap();
    fx.client.async_mutator_flush(mutator).await.unwrap();
    assert!(fx.client.future_has_outstanding(future).await.unwrap());
    assert!(!fx.client.future_is_empty(future).await.unwrap());

    let result = fx.client.future_get_result(future, POLL_TIMEOUT_MS).await.unwrap();
    assert!(matches!(result, FutureResult::WriteAck { mutator: m } if m == mutator));
    assert!(!fx.client.future_has_outstanding(future).await.unwrap());
    assert!(fx.client.future_is_empty(future).await.unwrap());
    assert!(fx.client.future_get_result(future, 10).await.unwrap().is_empty());

    fx.client.async_mutator_close(mutator).await.unwrap();
    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn timeout_is_distinct_from_empty_and_consumes_nothing() {
    let options = MemoryServiceOptions {
        write_latency: Duration::from_millis(300),
        ..Default::default()
    };
    let fx = fixture_with(options, &["t"]).await;
    let future = fx.client.future_open(0).await.unwrap();
    let mutator = fx.client.async_mutator_open(fx.ns, "t", future, 0).await.unwrap();
    fx.client.async_mutator_set_cells(mutator, rows(1)).await.unwrap();
    fx.client.async_mutator_flush(mutator).await.unwrap();

    let started = Instant::now();
    let err = fx.client.future_get_result(future, 50).await.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    assert!(started.elapsed() >= Duration::from_millis(45));
    assert!(fx.client.future_has_outstanding(future).await.unwrap());

    let result = fx.client.future_get_result(future, POLL_TIMEOUT_MS).await.unwrap();
    assert!(matches!(result, FutureResult::WriteAck { .. }));
    assert!(fx.client.future_get_result(future, 10).await.unwrap().is_empty());

    fx.client.async_mutator_close(mutator).await.unwrap();
    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn cancel_is_idempotent_and_permanent() {
    let fx = fixture(&[]).await;
    let future = fx.client.future_open(0).await.unwrap();

    fx.client.future_cancel(future).await.unwrap();
    assert!(fx.client.future_is_cancelled(future).await.unwrap());
    fx.client.future_cancel(future).await.unwrap();
    assert!(fx.client.future_is_cancelled(future).await.unwrap());

    // Cancellation alone does not make results vanish or appear.
    assert!(fx.client.future_get_result(future, 10).await.unwrap().is_empty());
    assert!(fx.client.future_is_cancelled(future).await.unwrap());

    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn close_fails_pending_poll_and_later_calls() {
    let options = MemoryServiceOptions {
        write_latency: Duration::from_millis(500),
        ..Default::default()
    };
    let fx = fixture_with(options, &["t"]).await;
    let future = fx.client.future_open(0).await.unwrap();
    let mutator = fx.client.async_mutator_open(fx.ns, "t", future, 0).await.unwrap();
    fx.client.async_mutator_flush(mutator).await.unwrap();

    let poller = {
        let client = fx.client.clone();
        tokio::spawn(async move { client.future_get_result(future, POLL_TIMEOUT_MS).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    fx.client.future_close(future).await.unwrap();

    let polled = poller.await.unwrap();
    assert!(matches!(polled, Err(Error::Closed(_))), "got {polled:?}");

    assert!(matches!(fx.client.future_get_result(future, 10).await, Err(Error::Closed(_))));
    assert!(matches!(fx.client.future_is_empty(future).await, Err(Error::Closed(_))));
    assert!(matches!(fx.client.future_cancel(future).await, Err(Error::Closed(_))));
    assert!(matches!(fx.client.future_close(future).await, Err(Error::Closed(_))));

    // The mutator's future is gone, so new work fails cleanly.
    assert!(matches!(
        fx.client.async_mutator_set_cells(mutator, rows(1)).await,
        Err(Error::Closed(_))
    ));
    assert!(matches!(
        fx.client.async_scanner_open(fx.ns, "t", future, Default::default()).await,
        Err(Error::Closed(_))
    ));
}

#[tokio::test]
async fn small_capacity_reports_full_and_applies_backpressure() {
    let options = MemoryServiceOptions {
        batch_size: 1,
        ..Default::default()
    };
    let fx = fixture_with(options, &["t"]).await;
    fx.client.set_cells(fx.ns, "t", rows(5)).await.unwrap();
    let future = fx.client.future_open(2).await.unwrap();
    let scanner = fx
        .client
        .async_scanner_open(fx.ns, "t", future, Default::default())
        .await
        .unwrap();

    let mut waited = 0;
    while !fx.client.future_is_full(future).await.unwrap() {
        waited += 1;
        assert!(waited < 200, "queue never filled");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(fx.client.future_has_outstanding(future).await.unwrap());

    let results = drain(&fx.client, future).await;
    let rows_seen: Vec<String> = results
        .iter()
        .flat_map(|r| r.cells().iter().map(|c| c.key.row.clone()))
        .collect();
    assert_eq!(rows_seen, vec!["row00", "row01", "row02", "row03", "row04"]);

    fx.client.async_scanner_close(scanner).await.unwrap();
    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn serialized_and_array_forms_carry_scan_payload() {
    let fx = fixture(&["t"]).await;
    fx.client.set_cells(fx.ns, "t", rows(3)).await.unwrap();

    let future = fx.client.future_open(0).await.unwrap();
    let scanner = fx
        .client
        .async_scanner_open(fx.ns, "t", future, Default::default())
        .await
        .unwrap();
    let serialized = fx.client.future_get_result_serialized(future, POLL_TIMEOUT_MS).await.unwrap();
    match serialized {
        FutureResult::ScanBatch { scanner: s, cells } => {
            assert_eq!(s, scanner);
            assert_eq!(decode_cells(&cells).unwrap().len(), 3);
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert!(fx.client.future_get_result_serialized(future, POLL_TIMEOUT_MS).await.unwrap().is_empty());
    fx.client.async_scanner_close(scanner).await.unwrap();

    let scanner = fx
        .client
        .async_scanner_open(fx.ns, "t", future, Default::default())
        .await
        .unwrap();
    let arrays = fx.client.future_get_result_as_arrays(future, POLL_TIMEOUT_MS).await.unwrap();
    match arrays {
        FutureResult::ScanBatch { cells, .. } => {
            assert_eq!(cells[0][0], "row00");
            assert_eq!(cells[0][1], "col");
            assert_eq!(cells[0][3], "v0");
        }
        other => panic!("unexpected result {other:?}"),
    }
    fx.client.async_scanner_close(scanner).await.unwrap();
    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn result_stream_ends_at_sentinel() {
    let fx = fixture(&["a", "b"]).await;
    let future = fx.client.future_open(0).await.unwrap();
    let first = fx.client.async_mutator_open(fx.ns, "a", future, 0).await.unwrap();
    let second = fx.client.async_mutator_open(fx.ns, "b", future, 0).await.unwrap();
    for mutator in [first, second] {
        fx.client.async_mutator_set_cells(mutator, rows(1)).await.unwrap();
        fx.client.async_mutator_flush(mutator).await.unwrap();
    }

    let results: Vec<_> = fx.client.future_results(future, POLL_TIMEOUT_MS).collect().await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| matches!(r, Ok(FutureResult::WriteAck { .. }))));

    fx.client.future_close(future).await.unwrap();
}

#[tokio::test]
async fn closing_the_client_closes_futures() {
    let options = MemoryServiceOptions {
        write_latency: Duration::from_millis(500),
        ..Default::default()
    };
    let fx = fixture_with(options, &["t"]).await;
    let future = fx.client.future_open(0).await.unwrap();
    let mutator = fx.client.async_mutator_open(fx.ns, "t", future, 0).await.unwrap();
    fx.client.async_mutator_flush(mutator).await.unwrap();

    let poller = {
        let client = fx.client.clone();
        tokio::spawn(async move { client.future_get_result(future, POLL_TIMEOUT_MS).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    fx.client.close().await;

    assert!(matches!(poller.await.unwrap(), Err(Error::Closed(_))));
    assert!(matches!(fx.client.future_open(0).await, Err(Error::Connection(_))));
    assert!(matches!(fx.client.namespace_exists("test").await, Err(Error::Connection(_))));
}
