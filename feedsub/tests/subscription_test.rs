//! Integration tests for feedsub
//!
//! These drive a subscription end to end through its public handles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use feedsub::fetch::{FailMode, ScriptStep, ScriptedFetcher, SimulatedFetcher, SimulatedFetcherConfig};
use feedsub::subscription::{Gate, Subscription, SubscriptionConfig, SubscriptionError};
use feedsub::{Config, Item};
use tempfile::TempDir;
use tokio::time::{self, Instant};

fn numbered(prefix: &str, count: usize) -> Vec<Item> {
    (0..count).map(|i| Item::new(format!("{}-{}", prefix, i))).collect()
}

fn items_now(items: Vec<Item>) -> ScriptStep {
    ScriptStep::Items {
        items,
        next_after: Duration::ZERO,
    }
}

// =============================================================================
// Backpressure
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_oversized_batch_holds_off_next_fetch() {
    let fetcher = Arc::new(ScriptedFetcher::new([items_now(numbered("first", 25)), ScriptStep::Hang]));
    let (handle, mut updates, task) = Subscription::spawn(SubscriptionConfig::default(), fetcher.clone()).unwrap();

    // Consumer stalled: all 25 stay queued
    time::sleep(Duration::from_secs(30)).await;
    let metrics = handle.metrics().await.unwrap();
    assert_eq!(metrics.peak_pending, 25);
    assert_eq!(metrics.pending, 25);
    assert_eq!(fetcher.calls(), 1);

    // Four taken: 21 pending, still over the bound
    for _ in 0..4 {
        updates.recv().await.unwrap();
    }
    time::sleep(Duration::from_secs(30)).await;
    assert_eq!(handle.metrics().await.unwrap().pending, 21);
    assert_eq!(fetcher.calls(), 1);

    // One more brings it to 20 and the gate opens
    updates.recv().await.unwrap();
    time::sleep(Duration::from_secs(1)).await;
    let metrics = handle.metrics().await.unwrap();
    assert_eq!(metrics.pending, 20);
    assert_eq!(fetcher.calls(), 2);
    assert!(metrics.in_flight);

    handle.close().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pending_never_exceeds_bound_plus_one_batch() {
    let batch_size = 7;
    let max_pending = 10;
    let steps = (0..30).map(|n| items_now(numbered(&format!("b{}", n), batch_size)));
    let fetcher = Arc::new(ScriptedFetcher::new(steps).with_latency(Duration::from_millis(100)));
    let config = SubscriptionConfig {
        max_pending,
        ..Default::default()
    };
    let (handle, mut updates, task) = Subscription::spawn(config, fetcher).unwrap();

    // Slow consumer so the queue stays near its bound
    for _ in 0..60 {
        updates.recv().await.unwrap();
        time::sleep(Duration::from_millis(250)).await;
    }

    let metrics = handle.metrics().await.unwrap();
    assert!(metrics.peak_pending > max_pending);
    assert!(metrics.peak_pending <= max_pending + batch_size);

    handle.close().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_eligible_time_gate_ignores_queue_length() {
    let steps = (0..3).map(|n| items_now(numbered(&format!("b{}", n), 10)));
    let fetcher = Arc::new(ScriptedFetcher::new(steps));
    let config = SubscriptionConfig {
        max_pending: 5,
        gate: Gate::EligibleTime,
        ..Default::default()
    };
    let (handle, _updates, task) = Subscription::spawn(config, fetcher.clone()).unwrap();

    time::sleep(Duration::from_secs(1)).await;

    // All three scripted batches plus the exhausted call
    assert_eq!(fetcher.calls(), 4);
    assert_eq!(handle.metrics().await.unwrap().pending, 30);

    handle.cancel();
    task.await.unwrap();
}

// =============================================================================
// Deduplication and ordering
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_shared_id_enqueued_once() {
    let fetcher = Arc::new(ScriptedFetcher::new([
        items_now(vec![
            Item::with_data("a", serde_json::json!(1)),
            Item::with_data("a", serde_json::json!(2)),
        ]),
        items_now(vec![Item::new("a"), Item::new("b")]),
    ]));
    let (handle, mut updates, task) = Subscription::spawn(SubscriptionConfig::default(), fetcher).unwrap();

    let first = updates.recv().await.unwrap();
    assert_eq!(first.id.as_str(), "a");
    assert_eq!(first.data, serde_json::json!(1));
    assert_eq!(updates.recv().await.unwrap().id.as_str(), "b");

    let nothing_more = time::timeout(Duration::from_secs(10), updates.recv()).await;
    assert!(nothing_more.is_err());

    let metrics = handle.metrics().await.unwrap();
    assert_eq!(metrics.items_accepted, 2);
    assert_eq!(metrics.duplicates_dropped, 2);
    assert_eq!(metrics.items_delivered, 2);

    handle.close().await.unwrap();
    task.await.unwrap();
}

// =============================================================================
// Failure and retry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_waits_backoff_before_retry() {
    let fetcher = Arc::new(
        ScriptedFetcher::new([ScriptStep::Error("unavailable".to_string()), ScriptStep::Hang])
            .with_latency(Duration::from_secs(1)),
    );
    let (handle, _updates, task) = Subscription::spawn(SubscriptionConfig::default(), fetcher.clone()).unwrap();
    let begin = Instant::now();

    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(fetcher.calls(), 1);
    let metrics = handle.metrics().await.unwrap();
    assert_eq!(metrics.fetches_failed, 1);
    assert_eq!(metrics.pending, 0);

    time::sleep(Duration::from_secs(5)).await;
    // Failed at t=1s, retried at t=6s
    assert_eq!(
        fetcher.call_times().await,
        vec![begin, begin + Duration::from_secs(6)]
    );

    let last_error = handle.close().await.unwrap().unwrap();
    assert_eq!(last_error.to_string(), "Source error: unavailable");
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_counts_as_failure() {
    let fetcher = Arc::new(ScriptedFetcher::new([ScriptStep::Hang]));
    let config = SubscriptionConfig {
        fetch_timeout_ms: Some(2000),
        ..Default::default()
    };
    let (handle, _updates, task) = Subscription::spawn(config, fetcher).unwrap();

    time::sleep(Duration::from_secs(3)).await;

    let last_error = handle.close().await.unwrap().unwrap();
    assert!(last_error.is_timeout());
    task.await.unwrap();
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_close_with_pending_items_stops_delivery() {
    let fetcher = Arc::new(ScriptedFetcher::new([
        ScriptStep::Error("earlier failure".to_string()),
        items_now(numbered("x", 4)),
        ScriptStep::Hang,
    ]));
    let (handle, mut updates, task) = Subscription::spawn(SubscriptionConfig::default(), fetcher).unwrap();

    time::sleep(Duration::from_secs(6)).await;
    let metrics = handle.metrics().await.unwrap();
    assert_eq!(metrics.pending, 4);
    assert_eq!(metrics.items_delivered, 0);

    let reply = handle.close().await.unwrap();
    assert!(reply.is_none());

    // Nothing reaches the consumer once the reply is out
    assert!(updates.recv().await.is_none());
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_live_consumer_receives_nothing_after_close_reply() {
    let fetcher = Arc::new(ScriptedFetcher::new([items_now(numbered("c", 10)), ScriptStep::Hang]));
    let (handle, mut updates, task) = Subscription::spawn(SubscriptionConfig::default(), fetcher).unwrap();
    let closed = Arc::new(AtomicBool::new(false));

    // Takes one item per second, noting whether the close had already returned
    let consumer = tokio::spawn({
        let closed = closed.clone();
        async move {
            let mut received = Vec::new();
            while let Some(item) = updates.recv().await {
                received.push((item.id.to_string(), closed.load(Ordering::SeqCst)));
                time::sleep(Duration::from_secs(1)).await;
            }
            received
        }
    });

    time::sleep(Duration::from_millis(3500)).await;
    let reply = handle.close().await.unwrap();
    closed.store(true, Ordering::SeqCst);
    assert!(reply.is_none());
    task.await.unwrap();

    let received = consumer.await.unwrap();
    let ids: Vec<&str> = received.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["c-0", "c-1", "c-2", "c-3"]);
    assert!(received.iter().all(|(_, after_close)| !after_close));
}

#[tokio::test(start_paused = true)]
async fn test_close_ends_a_parked_receive() {
    let fetcher = Arc::new(ScriptedFetcher::new([ScriptStep::Hang]));
    let (handle, mut updates, task) = Subscription::spawn(SubscriptionConfig::default(), fetcher).unwrap();

    let (reply, next) = tokio::join!(
        async {
            time::sleep(Duration::from_secs(2)).await;
            handle.close().await
        },
        updates.recv()
    );

    assert!(reply.unwrap().is_none());
    assert!(next.is_none());
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_second_close_reports_terminated() {
    let fetcher = Arc::new(ScriptedFetcher::new(Vec::<ScriptStep>::new()));
    let (handle, _updates, task) = Subscription::spawn(SubscriptionConfig::default(), fetcher).unwrap();

    assert!(handle.close().await.is_ok());
    task.await.unwrap();
    assert!(matches!(handle.close().await, Err(SubscriptionError::Terminated)));
}

#[tokio::test]
async fn test_slow_fetch_does_not_block_delivery_or_close() {
    let fetcher = Arc::new(ScriptedFetcher::new([items_now(numbered("p", 3)), ScriptStep::Hang]));
    let (handle, mut updates, task) = Subscription::spawn(SubscriptionConfig::default(), fetcher.clone()).unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), async {
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(updates.recv().await.unwrap().id.to_string());
        }
        ids
    })
    .await
    .expect("delivery blocked by in-flight fetch");
    assert_eq!(received, vec!["p-0", "p-1", "p-2"]);
    assert!(fetcher.max_active() <= 1);

    let reply = tokio::time::timeout(Duration::from_secs(2), handle.close())
        .await
        .expect("close blocked by in-flight fetch");
    assert!(reply.unwrap().is_none());
    assert!(updates.recv().await.is_none());

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("loop did not exit")
        .unwrap();
}

// =============================================================================
// Simulated source and configuration
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_simulated_source_end_to_end() {
    let fetcher = Arc::new(SimulatedFetcher::new(SimulatedFetcherConfig {
        latency_ms: 100,
        next_after_ms: 500,
        batch_size: 4,
        overlap: 2,
        fail_mode: FailMode::Never,
        ..Default::default()
    }));
    let (handle, mut updates, task) = Subscription::spawn(SubscriptionConfig::default(), fetcher.clone()).unwrap();

    let mut ids = Vec::new();
    for _ in 0..10 {
        ids.push(updates.recv().await.unwrap().id.to_string());
    }
    let expected: Vec<String> = (0..10).map(|i| format!("item-{}", i)).collect();
    assert_eq!(ids, expected);

    let metrics = handle.metrics().await.unwrap();
    assert!(metrics.duplicates_dropped > 0);
    assert_eq!(metrics.fetches_failed, 0);
    assert!(fetcher.calls() >= 5);

    assert!(handle.close().await.unwrap().is_none());
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_simulated_default_source_reports_error_on_close() {
    let fetcher = Arc::new(SimulatedFetcher::default());
    let (handle, _updates, task) = Subscription::spawn(SubscriptionConfig::default(), fetcher.clone()).unwrap();

    time::sleep(Duration::from_secs(20)).await;
    // Calls at 0s, 6s, 12s, 18s: one second latency plus five seconds backoff
    assert_eq!(fetcher.calls(), 4);

    let last_error = handle.close().await.unwrap().unwrap();
    assert_eq!(last_error.to_string(), "Source error: still error from fetch");
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_config_file_drives_subscription() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("feedsub.yml");
    std::fs::write(
        &path,
        "subscription:\n  max-pending: 2\n  retry-backoff-ms: 1000\nfetcher:\n  latency-ms: 0\n",
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();
    config.validate().unwrap();

    let fetcher = Arc::new(SimulatedFetcher::new(config.fetcher.clone()));
    let (handle, _updates, task) = Subscription::spawn(config.subscription, fetcher.clone()).unwrap();

    time::sleep(Duration::from_millis(3500)).await;
    // Default source always fails; one second backoff gives calls at 0, 1, 2, 3
    assert_eq!(fetcher.calls(), 4);

    handle.cancel();
    task.await.unwrap();
}
