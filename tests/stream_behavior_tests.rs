//! Stream Factory Behaviour Tests
//!
//! Exercises the interactive stream factories end to end on a paused
//! clock: debounce collapsing, switch-to-latest, scroll thresholds,
//! retryable settling, realtime polling and auto-save status.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use smart_cache::stream::{
    create_autosave_stream, create_filter_stream, create_infinite_scroll_stream,
    create_realtime_stream, create_retryable_stream, create_search_stream, SaveStatus,
    ScrollConfig, ScrollEvent, Settled, StreamRetryPolicy,
};
use tokio::time::sleep;

// == Helpers ==

fn scrolled_to(ratio: f64) -> ScrollEvent {
    ScrollEvent {
        scroll_y: ratio * 1000.0 - 100.0,
        viewport_height: 100.0,
        content_height: 1000.0,
    }
}

// == Search ==

#[tokio::test(start_paused = true)]
async fn test_rapid_keystrokes_collapse_into_one_search() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    let stream = create_search_stream(
        move |query: String| {
            recorded.lock().push(query.clone());
            async move { Ok::<_, anyhow::Error>(format!("results for {}", query)) }
        },
        Duration::from_millis(300),
    );

    for query in ["m", "me", "mer", "merc"] {
        stream.search.publish(query.to_string()).unwrap();
        sleep(Duration::from_millis(50)).await;
    }

    let mut results = stream.results.clone();
    let delivered = results.wait_for(|r| r.is_ok()).await.unwrap();
    assert_eq!(delivered.unwrap(), "results for merc");
    assert_eq!(*calls.lock(), vec!["merc".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_only_latest_search_result_is_delivered() {
    let stream = create_search_stream(
        |query: String| async move {
            // "a" is slow and would land after "b" if it were not discarded.
            let latency = if query == "a" { 500 } else { 50 };
            sleep(Duration::from_millis(latency)).await;
            Ok::<_, anyhow::Error>(query)
        },
        Duration::from_millis(10),
    );

    stream.search.publish("a".to_string()).unwrap();
    sleep(Duration::from_millis(100)).await;
    stream.search.publish("b".to_string()).unwrap();

    let mut results = stream.results.clone();
    let first = results.wait_for(|r| r.is_ok()).await.unwrap();
    assert_eq!(first.unwrap(), "b");

    sleep(Duration::from_secs(1)).await;
    assert_eq!(stream.results.latest(), Some(Ok("b".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_search_failure_is_delivered_as_error() {
    let stream = create_search_stream(
        |_query: String| async move { Err::<String, _>(anyhow::anyhow!("backend down")) },
        Duration::from_millis(10),
    );

    stream.search.publish("rent".to_string()).unwrap();

    let mut results = stream.results.clone();
    let delivered = results.next_value().await.unwrap();
    assert!(delivered.unwrap_err().to_string().contains("backend down"));
}

// == Filter ==

#[tokio::test(start_paused = true)]
async fn test_repeated_filter_is_not_refetched() {
    #[derive(Debug, Clone, PartialEq)]
    struct Filter {
        kind: &'static str,
        min: i64,
    }

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let stream = create_filter_stream(
        move |filter: Filter| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, anyhow::Error>(filter.min) }
        },
        Duration::from_millis(500),
    );

    let filter = Filter {
        kind: "debit",
        min: 100,
    };
    stream.filters.publish(filter.clone()).unwrap();
    sleep(Duration::from_secs(1)).await;
    stream.filters.publish(filter).unwrap();
    sleep(Duration::from_secs(1)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(stream.results.latest(), Some(Ok(100)));
}

// == Infinite Scroll ==

#[tokio::test(start_paused = true)]
async fn test_scroll_threshold_gates_load_more() {
    let pages = Arc::new(Mutex::new(Vec::new()));
    let recorded = pages.clone();
    let stream = create_infinite_scroll_stream(
        move |page: usize| {
            recorded.lock().push(page);
            async move { Ok::<_, anyhow::Error>(vec![page * 10, page * 10 + 1]) }
        },
        ScrollConfig::default(),
    );

    stream.scroll.publish(scrolled_to(0.75)).unwrap();
    sleep(Duration::from_secs(2)).await;
    assert!(pages.lock().is_empty());
    assert!(stream.pages.latest().is_none());

    stream.scroll.publish(scrolled_to(0.85)).unwrap();
    let mut output = stream.pages.clone();
    let page = output.wait_for(|p| p.is_ok()).await.unwrap().unwrap();

    assert_eq!(page.number, 1);
    assert_eq!(page.items, vec![10, 11]);
    assert_eq!(*pages.lock(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_scroll_triggers_are_throttled_and_pages_advance() {
    let pages = Arc::new(Mutex::new(Vec::new()));
    let recorded = pages.clone();
    let stream = create_infinite_scroll_stream(
        move |page: usize| {
            recorded.lock().push(page);
            async move { Ok::<_, anyhow::Error>(page) }
        },
        ScrollConfig::default(),
    );

    // A burst inside one trigger window loads a single page.
    for _ in 0..4 {
        stream.scroll.publish(scrolled_to(0.9)).unwrap();
        sleep(Duration::from_millis(250)).await;
    }
    assert_eq!(*pages.lock(), vec![1]);

    sleep(Duration::from_secs(1)).await;
    stream.scroll.publish(scrolled_to(0.95)).unwrap();
    let mut output = stream.pages.clone();
    let page = output
        .wait_for(|p| matches!(p, Ok(page) if page.number == 2))
        .await
        .unwrap();
    assert_eq!(page.unwrap().items, 2);
}

// == Retryable ==

#[tokio::test(start_paused = true)]
async fn test_retryable_settles_on_value_after_failures() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let stream = create_retryable_stream(
        move |id: u32| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    anyhow::bail!("attempt {} failed", attempt);
                }
                Ok(id * 2)
            }
        },
        StreamRetryPolicy::default(),
    );

    stream.trigger.publish(21).unwrap();
    let mut results = stream.results.clone();
    assert_eq!(results.next_value().await, Some(Settled::Value(42)));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retryable_substitutes_failure_sentinel() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let stream = create_retryable_stream(
        move |_: ()| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Err::<u32, _>(anyhow::anyhow!("still down")) }
        },
        StreamRetryPolicy::default(),
    );

    stream.trigger.publish(()).unwrap();
    let mut results = stream.results.clone();
    assert_eq!(
        results.next_value().await,
        Some(Settled::Failed("still down".to_string()))
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_retryable_timeout_is_distinct() {
    let stream = create_retryable_stream(
        |_: ()| async move {
            sleep(Duration::from_secs(10)).await;
            Ok::<_, anyhow::Error>(1)
        },
        StreamRetryPolicy {
            max_retries: 1,
            delay: Duration::from_millis(100),
            timeout: Some(Duration::from_millis(500)),
        },
    );

    stream.trigger.publish(()).unwrap();
    let mut results = stream.results.clone();
    assert_eq!(results.next_value().await, Some(Settled::TimedOut));
}

// == Realtime ==

#[tokio::test(start_paused = true)]
async fn test_realtime_emits_only_changes() {
    let polls = Arc::new(AtomicU32::new(0));
    let counter = polls.clone();
    let stream = create_realtime_stream(
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, anyhow::Error>(n / 3) }
        },
        Duration::from_secs(1),
    );

    let mut updates = stream.updates.clone();
    assert_eq!(updates.next_value().await, Some(0));
    // Polls 1 and 2 return the same value and are swallowed.
    assert_eq!(updates.next_value().await, Some(1));
    assert!(polls.load(Ordering::SeqCst) >= 4);
}

#[tokio::test(start_paused = true)]
async fn test_realtime_refresh_polls_immediately() {
    let polls = Arc::new(AtomicU32::new(0));
    let counter = polls.clone();
    let stream = create_realtime_stream(
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, anyhow::Error>(n) }
        },
        Duration::from_secs(60),
    );

    let mut updates = stream.updates.clone();
    assert_eq!(updates.next_value().await, Some(0));

    stream.refresh.publish(()).unwrap();
    assert_eq!(updates.next_value().await, Some(1));
}

// == Auto-save ==

#[tokio::test(start_paused = true)]
async fn test_autosave_status_lifecycle() {
    let saved = Arc::new(Mutex::new(Vec::new()));
    let store = saved.clone();
    let stream = create_autosave_stream(
        move |draft: String| {
            store.lock().push(draft);
            async move { Ok::<(), anyhow::Error>(()) }
        },
        Duration::from_millis(2000),
    );
    assert_eq!(stream.status.latest(), Some(SaveStatus::Idle));

    stream.drafts.publish("De".to_string()).unwrap();
    stream.drafts.publish("Dear".to_string()).unwrap();

    let mut status = stream.status.clone();
    assert_eq!(
        status.wait_for(|s| *s == SaveStatus::Saving).await,
        Some(SaveStatus::Saving)
    );

    let done = status
        .wait_for(|s| matches!(s, SaveStatus::Saved { .. }))
        .await;
    assert!(done.is_some());
    assert_eq!(*saved.lock(), vec!["Dear".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_autosave_failure_is_reported() {
    let stream = create_autosave_stream(
        |_draft: String| async move { Err::<(), _>(anyhow::anyhow!("disk full")) },
        Duration::from_millis(100),
    );

    stream.drafts.publish("x".to_string()).unwrap();
    let mut status = stream.status.clone();
    let failed = status
        .wait_for(|s| matches!(s, SaveStatus::Error { .. }))
        .await
        .unwrap();
    assert_eq!(
        failed,
        SaveStatus::Error {
            message: "disk full".to_string()
        }
    );
}
