//! dynpool demo entry point.
//!
//! Wires a pool together with the standard middleware chain and an
//! autoscaler, feeds it a burst of sample jobs, then shuts down
//! cooperatively. Run with `RUST_LOG=dynpool=debug` for per-job events.

use std::process::ExitCode;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use dynpool::telemetry::{init_logging, LogConfig, LogFormat};
use dynpool::{handler_fn, logging, recovery, retry, AutoScaleConfig, Pool, PoolConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let log_config = LogConfig {
        format: LogFormat::Pretty,
        level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        output_path: None,
    };
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    // Simulated work: 100 ms per job, stopping early on shutdown.
    let handler = handler_fn(|ctx: CancellationToken, job| async move {
        tokio::select! {
            () = ctx.cancelled() => {}
            () = tokio::time::sleep(Duration::from_millis(100)) => {
                info!(%job, "processed");
            }
        }
        Ok(())
    });

    let config = PoolConfig::new(100)
        .with_initial_workers(2)
        .with_handler(handler)
        .with_middleware(logging())
        .with_middleware(retry(2))
        .with_middleware(recovery())
        .with_autoscale(AutoScaleConfig {
            min: 2,
            max: 16,
            up_threshold: 5,
            observe_every: Duration::from_secs(1),
        })
        .with_rate_limit(50);

    let pool = match Pool::new(config) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Invalid pool configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let submitter = pool.clone();
    tokio::spawn(async move {
        for i in 0..30 {
            submitter.submit(format!("job-{i}")).await;
        }
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    let stats = pool.stats();
    info!(
        workers = stats.workers,
        completed = stats.jobs_completed,
        dropped = stats.jobs_dropped,
        "demo finishing"
    );

    pool.shutdown().await;
    ExitCode::SUCCESS
}
