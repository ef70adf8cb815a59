//! Queue-pressure autoscaling control loop.
//!
//! Samples queue depth and worker count on a fixed interval and grows or
//! shrinks the registry within the configured bounds. Growth is capped at
//! doubling per tick; shrinking halves the surplus. The read-decide-act
//! sequence for worker count runs under the registry lock, so scaling
//! never races with operator add/remove or shutdown teardown.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::AutoScaleConfig;
use crate::queue::JobQueue;
use crate::registry::WorkerRegistry;
use crate::worker::{spawn_worker, WorkerContext};

/// Outcome of one sampling tick.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ScaleAction {
    Up(usize),
    Down(usize),
    Hold,
}

/// Pure scaling decision for an observed queue depth and worker count.
///
/// Up and Down are mutually exclusive: growth requires a nonempty queue
/// above the threshold, shrinking requires an empty one.
pub(crate) fn decide(config: &AutoScaleConfig, depth: usize, workers: usize) -> ScaleAction {
    if depth > config.up_threshold && workers < config.max {
        // At most doubling per tick, never past max.
        let growth = workers.min(config.max - workers);
        if growth > 0 {
            return ScaleAction::Up(growth);
        }
    } else if depth == 0 && workers > config.min {
        // Halve the count, clamped so it never drops below min.
        let surplus = (workers / 2).min(workers - config.min);
        if surplus > 0 {
            return ScaleAction::Down(surplus);
        }
    }
    ScaleAction::Hold
}

/// Run the control loop until the pool's shutdown token fires.
pub(crate) async fn run_autoscaler(
    config: AutoScaleConfig,
    queue: Arc<JobQueue>,
    registry: Arc<WorkerRegistry>,
    worker_ctx: WorkerContext,
    tracker: TaskTracker,
    shutdown: CancellationToken,
) {
    let start = tokio::time::Instant::now() + config.observe_every;
    let mut ticker = tokio::time::interval_at(start, config.observe_every);
    debug!(?config, "autoscaler started");
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let depth = queue.len();
        let mut reg = registry.lock();
        // Shutdown cancels the token before it drains the registry, so a
        // non-cancelled token here means any worker added under this lock
        // is still covered by the coming teardown.
        if shutdown.is_cancelled() {
            break;
        }
        let workers = reg.len();
        match decide(&config, depth, workers) {
            ScaleAction::Up(count) => {
                reg.register_with(count, |id| {
                    spawn_worker(id, worker_ctx.clone(), &tracker)
                });
                info!(depth, from = workers, to = workers + count, "scaled up");
            }
            ScaleAction::Down(count) => {
                let removed = reg.remove_arbitrary(count);
                drop(reg);
                for (_, handle) in &removed {
                    handle.stop();
                }
                info!(from = workers, to = workers - removed.len(), "scaled down");
            }
            ScaleAction::Hold => {}
        }
    }
    debug!("autoscaler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(min: usize, max: usize, up_threshold: usize) -> AutoScaleConfig {
        AutoScaleConfig {
            min,
            max,
            up_threshold,
            observe_every: Duration::from_millis(100),
        }
    }

    #[test]
    fn holds_between_thresholds() {
        let cfg = config(1, 8, 5);
        assert_eq!(decide(&cfg, 3, 4), ScaleAction::Hold);
        assert_eq!(decide(&cfg, 5, 4), ScaleAction::Hold, "threshold is exclusive");
    }

    #[test]
    fn doubles_under_pressure() {
        let cfg = config(1, 8, 5);
        assert_eq!(decide(&cfg, 6, 2), ScaleAction::Up(2));
        assert_eq!(decide(&cfg, 100, 3), ScaleAction::Up(3));
    }

    #[test]
    fn growth_is_clamped_at_max() {
        let cfg = config(1, 8, 5);
        assert_eq!(decide(&cfg, 6, 6), ScaleAction::Up(2));
        assert_eq!(decide(&cfg, 6, 8), ScaleAction::Hold);
    }

    #[test]
    fn halves_when_idle() {
        let cfg = config(1, 8, 5);
        assert_eq!(decide(&cfg, 0, 8), ScaleAction::Down(4));
        assert_eq!(decide(&cfg, 0, 5), ScaleAction::Down(2));
    }

    #[test]
    fn shrink_is_clamped_at_min() {
        let cfg = config(3, 8, 5);
        assert_eq!(decide(&cfg, 0, 4), ScaleAction::Down(1));
        assert_eq!(decide(&cfg, 0, 3), ScaleAction::Hold);
    }

    #[test]
    fn nonempty_queue_never_shrinks() {
        let cfg = config(1, 8, 5);
        assert_eq!(decide(&cfg, 1, 8), ScaleAction::Hold);
    }

    #[test]
    fn zero_workers_cannot_double() {
        // Degenerate but legal: a pool scaled to zero stays at zero until
        // an operator adds a worker.
        let cfg = config(0, 8, 5);
        assert_eq!(decide(&cfg, 100, 0), ScaleAction::Hold);
    }
}
