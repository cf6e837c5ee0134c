//! Queue discipline: FIFO, single worker per key, capacity and drain callbacks.

use call_governor::{CallLimiter, Discipline, DispatchError, HeaderReporter, Headers, Limit};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

fn queue_limiter(capacity: Limit) -> CallLimiter {
    CallLimiter::new(Discipline::Queue, capacity).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_fifo_order_with_hints_between_items() {
    let limiter = queue_limiter(Limit::Disabled);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let start = Instant::now();

    for n in 0..4u32 {
        let tx = tx.clone();
        limiter
            .dispatch_with("k", move |reporter: &HeaderReporter| {
                let _ = tx.send((n, Instant::now()));
                reporter.report(&Headers::new().with("Retry-After", 1));
            })
            .unwrap();
    }

    let mut runs = Vec::new();
    for _ in 0..4 {
        runs.push(rx.recv().await.unwrap());
    }

    let order: Vec<u32> = runs.iter().map(|(n, _)| *n).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);

    // Each item waits for the hint the previous one reported.
    for pair in runs.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= Duration::from_secs(1));
    }
    assert!(runs[0].1 - start < Duration::from_millis(5));
}

#[tokio::test(start_paused = true)]
async fn test_capacity_rejects_without_scheduling() {
    let limiter = queue_limiter(Limit::Max(3));
    limiter.report_headers("k", &Headers::new().with("Retry-After", 10));

    for _ in 0..3 {
        limiter.dispatch_with("k", |_: &HeaderReporter| {}).unwrap();
    }
    let err = limiter
        .dispatch_with("k", |_: &HeaderReporter| {})
        .unwrap_err();

    assert_eq!(
        err,
        DispatchError::QueueFull {
            key: "k".to_string(),
            capacity: 3,
        }
    );
    assert_eq!(limiter.queue_len("k"), 3);
    assert!(limiter.is_worker_active("k"));
    assert_eq!(limiter.metrics().queue_full(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_capacity_frees_up_as_worker_drains() {
    let limiter = queue_limiter(Limit::Max(1));
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();

    let first = tx.clone();
    limiter
        .dispatch_with("k", move |_: &HeaderReporter| {
            let _ = first.send(());
        })
        .unwrap();
    assert!(limiter.dispatch_with("k", |_: &HeaderReporter| {}).is_err());

    rx.recv().await.unwrap();
    limiter
        .dispatch_with("k", move |_: &HeaderReporter| {
            let _ = tx.send(());
        })
        .unwrap();
    rx.recv().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_drain_callback_once_per_episode() {
    let limiter = queue_limiter(Limit::Disabled);
    let drained = Arc::new(Mutex::new(Vec::new()));
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();

    let dispatch = |n: u32| {
        let drained = drained.clone();
        let tx = tx.clone();
        limiter
            .dispatch(
                "k",
                |_: &HeaderReporter| {},
                move || {
                    drained.lock().unwrap().push(n);
                    let _ = tx.send(());
                },
            )
            .unwrap();
    };

    dispatch(1);
    dispatch(2);
    rx.recv().await.unwrap();
    assert!(!limiter.is_worker_active("k"));

    dispatch(3);
    rx.recv().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(*drained.lock().unwrap(), vec![2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_keys_drain_independently() {
    let limiter = queue_limiter(Limit::Disabled);
    let (tx, mut rx) = mpsc::unbounded_channel();

    limiter.report_headers("slow", &Headers::new().with("Retry-After", 60));
    for key in ["slow", "fast"] {
        let tx = tx.clone();
        limiter
            .dispatch_with(key, move |_: &HeaderReporter| {
                let _ = tx.send(key);
            })
            .unwrap();
    }

    assert_eq!(rx.recv().await, Some("fast"));
    assert_eq!(rx.recv().await, Some("slow"));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_item_does_not_wedge_queue() {
    let limiter = queue_limiter(Limit::Disabled);
    let (tx, mut rx) = mpsc::unbounded_channel();

    limiter
        .dispatch_with("k", |_: &HeaderReporter| panic!("upstream exploded"))
        .unwrap();
    limiter
        .dispatch(
            "k",
            move |_: &HeaderReporter| {
                let _ = tx.send("second ran");
            },
            || {},
        )
        .unwrap();

    assert_eq!(rx.recv().await, Some("second ran"));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!limiter.is_worker_active("k"));
    assert_eq!(limiter.metrics().actions_panicked(), 1);
    assert_eq!(limiter.metrics().calls_executed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_queue_without_draining() {
    let limiter = queue_limiter(Limit::Disabled);
    let drained = Arc::new(Mutex::new(false));
    limiter.report_headers("k", &Headers::new().with("Retry-After", 5));

    let flag = drained.clone();
    limiter
        .dispatch("k", |_: &HeaderReporter| {}, move || *flag.lock().unwrap() = true)
        .unwrap();
    limiter.dispatch_with("k", |_: &HeaderReporter| {}).unwrap();

    assert_eq!(limiter.shutdown(), 2);
    assert_eq!(limiter.queue_len("k"), 0);
    assert!(!limiter.is_worker_active("k"));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!*drained.lock().unwrap());

    // The limiter keeps working after a shutdown.
    let (tx, rx) = tokio::sync::oneshot::channel();
    limiter
        .dispatch_with("k", move |_: &HeaderReporter| {
            let _ = tx.send(());
        })
        .unwrap();
    rx.await.unwrap();
}

async fn wait_until_idle(limiter: &CallLimiter, key: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while limiter.is_worker_active(key) {
        assert!(Instant::now() < deadline, "worker for `{key}` never went idle");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatchers_keep_order_and_single_worker() {
    const DISPATCHERS: usize = 8;
    const CALLS: usize = 50;

    let limiter = queue_limiter(Limit::Disabled);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut tasks = Vec::new();
    for dispatcher in 0..DISPATCHERS {
        let limiter = limiter.clone();
        let in_flight = in_flight.clone();
        let overlaps = overlaps.clone();
        let tx = tx.clone();
        tasks.push(tokio::spawn(async move {
            for n in 0..CALLS {
                let in_flight = in_flight.clone();
                let overlaps = overlaps.clone();
                let tx = tx.clone();
                limiter
                    .dispatch_with("shared", move |_: &HeaderReporter| {
                        if in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        std::thread::yield_now();
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        let _ = tx.send((dispatcher, n));
                    })
                    .unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut next = [0usize; DISPATCHERS];
    for _ in 0..DISPATCHERS * CALLS {
        let (dispatcher, n) = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, next[dispatcher], "dispatcher {dispatcher} ran out of order");
        next[dispatcher] += 1;
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    wait_until_idle(&limiter, "shared").await;
    assert_eq!(limiter.queue_len("shared"), 0);
    assert_eq!(
        limiter.metrics().calls_executed(),
        (DISPATCHERS * CALLS) as u64
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_send_only_action_runs_on_worker_thread() {
    let limiter = queue_limiter(Limit::Disabled);
    let (tx, rx) = oneshot::channel();
    let counter = Cell::new(41u32);

    limiter
        .dispatch_with("k", move |_: &HeaderReporter| {
            counter.set(counter.get() + 1);
            let _ = tx.send(counter.get());
        })
        .unwrap();

    assert_eq!(rx.await.unwrap(), 42);
    wait_until_idle(&limiter, "k").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_holds_under_concurrent_dispatch() {
    const CAPACITY: u64 = 5;

    let limiter = queue_limiter(Limit::Max(CAPACITY));
    limiter.report_headers("k", &Headers::new().with("Retry-After", 60));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let limiter = limiter.clone();
        tasks.push(tokio::spawn(async move {
            let mut accepted = 0u64;
            for _ in 0..10 {
                if limiter.dispatch_with("k", |_: &HeaderReporter| {}).is_ok() {
                    accepted += 1;
                }
                tokio::task::yield_now().await;
            }
            accepted
        }));
    }

    let mut accepted = 0;
    for task in tasks {
        accepted += task.await.unwrap();
    }

    assert_eq!(accepted, CAPACITY);
    assert_eq!(limiter.queue_len("k"), CAPACITY as usize);
    assert!(limiter.is_worker_active("k"));
    assert_eq!(limiter.metrics().queue_full(), 80 - CAPACITY);

    assert_eq!(limiter.shutdown(), CAPACITY as usize);
    assert!(!limiter.is_worker_active("k"));
}
