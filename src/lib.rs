//! dynpool — a dynamically resizable asynchronous worker pool.
//!
//! A bounded job queue consumed by a variable number of concurrent
//! workers, with a composable middleware chain around the job handler,
//! automatic capacity scaling from observed queue pressure, and
//! cooperative shutdown that drains every worker deterministically.
//!
//! # Design
//!
//! - **Fire-and-forget submission**: a job that cannot be enqueued before
//!   cancellation or shutdown is silently dropped; callers needing
//!   delivery confirmation build it into their handler.
//! - **Disposable workers**: a worker runs until its individual stop
//!   signal or the queue reports closed-and-drained, then exits for good.
//!   Identities are never reused.
//! - **One lock**: the worker registry is the only mutable shared state;
//!   add, remove, autoscale, and shutdown all serialize through it.
//!
//! # Example
//!
//! ```no_run
//! use dynpool::{handler_fn, Pool, PoolConfig};
//!
//! # async fn example() -> Result<(), dynpool::ConfigError> {
//! let pool = Pool::new(
//!     PoolConfig::new(64)
//!         .with_initial_workers(4)
//!         .with_handler(handler_fn(|_ctx, job| async move {
//!             println!("processing {job}");
//!             Ok(())
//!         })),
//! )?;
//!
//! pool.submit("hello").await;
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod middleware;
pub mod pool;
pub mod telemetry;

mod autoscale;
mod queue;
mod registry;
mod worker;

pub use config::{AutoScaleConfig, ConfigError, PoolConfig};
pub use middleware::{
    handler_fn, logging, rate_limit, recovery, retry, Handler, JobError, Middleware,
};
pub use pool::{Pool, PoolStats};
pub use queue::Job;
pub use registry::WorkerId;
