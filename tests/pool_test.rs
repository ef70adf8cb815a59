//! Integration tests for pool lifecycle, submission, and worker identity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use dynpool::{handler_fn, Handler, Pool, PoolConfig};

/// Poll `condition` until it holds, failing the test after five seconds.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn counting_handler(counter: &Arc<AtomicU64>) -> Handler {
    let counter = Arc::clone(counter);
    handler_fn(move |_ctx, _job| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

#[tokio::test]
async fn five_jobs_two_workers_counter_reaches_five() {
    let counter = Arc::new(AtomicU64::new(0));
    let pool = Pool::new(
        PoolConfig::new(10)
            .with_initial_workers(2)
            .with_handler(counting_handler(&counter)),
    )
    .unwrap();

    for i in 0..5 {
        pool.submit(format!("job-{i}")).await;
    }

    let observed = Arc::clone(&counter);
    wait_until(move || observed.load(Ordering::SeqCst) == 5).await;
    assert_eq!(pool.worker_count(), 2);

    pool.shutdown().await;
}

#[tokio::test]
async fn throughput_counts_every_submitted_job_exactly_once() {
    let counter = Arc::new(AtomicU64::new(0));
    let pool = Pool::new(
        PoolConfig::new(64)
            .with_initial_workers(4)
            .with_handler(counting_handler(&counter)),
    )
    .unwrap();

    for i in 0..200 {
        pool.submit(format!("job-{i}")).await;
    }

    let observed = Arc::clone(&counter);
    wait_until(move || observed.load(Ordering::SeqCst) == 200).await;

    // Settle, then confirm nothing was delivered twice.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 200);

    pool.shutdown().await;
}

#[tokio::test]
async fn add_and_remove_track_worker_count() {
    let pool = Pool::new(PoolConfig::new(8).with_initial_workers(0)).unwrap();
    assert_eq!(pool.worker_count(), 0);

    let first = pool.add_worker();
    assert_eq!(pool.worker_count(), 1);
    let second = pool.add_worker();
    assert_eq!(pool.worker_count(), 2);

    pool.remove_worker(first);
    wait_until(|| pool.worker_count() == 1).await;

    // Unknown and already-removed identities are no-ops.
    pool.remove_worker(9999);
    pool.remove_worker(first);
    assert_eq!(pool.worker_count(), 1);
    assert_ne!(first, second);

    pool.shutdown().await;
}

#[tokio::test]
async fn identities_start_at_zero_and_are_never_reused() {
    // Unbuffered queue, no initial workers.
    let pool = Pool::new(PoolConfig::new(0).with_initial_workers(0)).unwrap();

    let first = pool.add_worker();
    let second = pool.add_worker();
    assert_eq!(first, 0);
    assert_eq!(second, 1);

    pool.remove_worker(first);
    wait_until(|| pool.worker_count() == 1).await;

    // A replacement gets a fresh identity, not the retired one.
    let third = pool.add_worker();
    assert_eq!(third, 2);

    pool.shutdown().await;
}

#[tokio::test]
async fn idle_pool_processes_backlog_once_a_worker_arrives() {
    let counter = Arc::new(AtomicU64::new(0));
    let pool = Pool::new(
        PoolConfig::new(8)
            .with_initial_workers(0)
            .with_handler(counting_handler(&counter)),
    )
    .unwrap();

    for i in 0..3 {
        pool.submit(format!("job-{i}")).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(pool.queue_depth(), 3);

    pool.add_worker();
    let observed = Arc::clone(&counter);
    wait_until(move || observed.load(Ordering::SeqCst) == 3).await;

    pool.shutdown().await;
}

#[tokio::test]
async fn cancelled_submit_drops_the_job_silently() {
    let counter = Arc::new(AtomicU64::new(0));
    let pool = Pool::new(
        PoolConfig::new(1)
            .with_initial_workers(0)
            .with_handler(counting_handler(&counter)),
    )
    .unwrap();

    // Fill the queue so the next submit has to wait.
    pool.submit("occupies-capacity").await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    pool.submit_with_cancel(cancel, "never-enqueued").await;

    assert_eq!(pool.queue_depth(), 1);
    assert_eq!(pool.stats().jobs_dropped, 1);

    pool.shutdown().await;
}

#[tokio::test]
async fn stats_reflect_completed_and_dropped_jobs() {
    let counter = Arc::new(AtomicU64::new(0));
    let pool = Pool::new(
        PoolConfig::new(16)
            .with_initial_workers(2)
            .with_handler(counting_handler(&counter)),
    )
    .unwrap();

    for i in 0..10 {
        pool.submit(format!("job-{i}")).await;
    }
    wait_until(|| pool.stats().jobs_completed == 10).await;

    let stats = pool.stats();
    assert_eq!(stats.workers, 2);
    assert_eq!(stats.queue_depth, 0);
    assert_eq!(stats.jobs_dropped, 0);

    pool.shutdown().await;
}
