//! Integration tests for the cooperative shutdown protocol.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use dynpool::{handler_fn, Pool, PoolConfig};

const SHUTDOWN_BUDGET: Duration = Duration::from_secs(5);

#[tokio::test]
async fn shutdown_drains_all_workers() {
    let pool = Pool::new(PoolConfig::new(8).with_initial_workers(3)).unwrap();
    assert_eq!(pool.worker_count(), 3);

    timeout(SHUTDOWN_BUDGET, pool.shutdown()).await.unwrap();
    assert_eq!(pool.worker_count(), 0);
}

#[tokio::test]
async fn submit_after_shutdown_is_a_noop() {
    let counter = Arc::new(AtomicU64::new(0));
    let handler_counter = Arc::clone(&counter);
    let pool = Pool::new(
        PoolConfig::new(8)
            .with_initial_workers(1)
            .with_handler(handler_fn(move |_ctx, _job| {
                let counter = Arc::clone(&handler_counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })),
    )
    .unwrap();

    timeout(SHUTDOWN_BUDGET, pool.shutdown()).await.unwrap();

    // Must return promptly and deliver nothing.
    timeout(Duration::from_secs(1), pool.submit("too-late")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(pool.stats().jobs_dropped, 1);
}

#[tokio::test]
async fn add_worker_after_shutdown_burns_the_identity() {
    let pool = Pool::new(PoolConfig::new(8).with_initial_workers(2)).unwrap();
    timeout(SHUTDOWN_BUDGET, pool.shutdown()).await.unwrap();

    let burned = pool.add_worker();
    assert_eq!(burned, 2, "identity allocation continues past shutdown");
    assert_eq!(pool.worker_count(), 0, "no worker may start after shutdown");

    let next = pool.add_worker();
    assert_eq!(next, 3);
}

#[tokio::test]
async fn repeated_shutdown_is_idempotent() {
    let pool = Pool::new(PoolConfig::new(8).with_initial_workers(2)).unwrap();

    timeout(SHUTDOWN_BUDGET, pool.shutdown()).await.unwrap();
    timeout(SHUTDOWN_BUDGET, pool.shutdown()).await.unwrap();
    assert_eq!(pool.worker_count(), 0);
}

#[tokio::test]
async fn concurrent_shutdowns_both_complete() {
    let pool = Pool::new(PoolConfig::new(8).with_initial_workers(2)).unwrap();

    let first = pool.clone();
    let second = pool.clone();
    let (a, b) = tokio::join!(
        timeout(SHUTDOWN_BUDGET, first.shutdown()),
        timeout(SHUTDOWN_BUDGET, second.shutdown()),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(pool.worker_count(), 0);
}

#[tokio::test]
async fn shutdown_waits_for_the_job_in_flight() {
    let counter = Arc::new(AtomicU64::new(0));
    let handler_counter = Arc::clone(&counter);
    let pool = Pool::new(
        PoolConfig::new(8)
            .with_initial_workers(1)
            .with_handler(handler_fn(move |_ctx, _job| {
                let counter = Arc::clone(&handler_counter);
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })),
    )
    .unwrap();

    pool.submit("slow-job").await;
    // Give the worker time to pick the job up before tearing down.
    tokio::time::sleep(Duration::from_millis(30)).await;

    timeout(SHUTDOWN_BUDGET, pool.shutdown()).await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1, "the current job finishes first");
}
