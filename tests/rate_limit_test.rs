//! Integration test for pool-level rate limiting.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use dynpool::{handler_fn, Pool, PoolConfig};

/// Scheduling jitter tolerance: real timers can fire marginally early
/// relative to the instant we record.
const TOLERANCE: Duration = Duration::from_millis(10);

#[tokio::test]
async fn completions_are_spaced_by_the_configured_rate() {
    let completions: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&completions);
    let pool = Pool::new(
        PoolConfig::new(16)
            .with_initial_workers(1)
            .with_handler(handler_fn(move |_ctx, _job| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(Instant::now());
                    Ok(())
                }
            }))
            // 20 rps: one invocation every 50 ms.
            .with_rate_limit(20),
    )
    .unwrap();

    for i in 0..4 {
        pool.submit(format!("job-{i}")).await;
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while completions.lock().len() < 4 {
        assert!(Instant::now() < deadline, "jobs did not complete in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let times = completions.lock();
    let interval = Duration::from_millis(50);
    for pair in times.windows(2) {
        assert!(
            pair[1] - pair[0] >= interval.saturating_sub(TOLERANCE),
            "consecutive completions arrived faster than the configured rate"
        );
    }

    drop(times);
    pool.shutdown().await;
}
