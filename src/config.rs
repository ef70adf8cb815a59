//! Pool configuration with documented defaults.
//!
//! All knobs live in one explicit struct built with chainable `with_*`
//! methods. Invalid combinations are rejected eagerly by
//! [`PoolConfig::validate`] (run by `Pool::new`) with a descriptive
//! [`ConfigError`] instead of producing silently degenerate pools.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::middleware::{handler_fn, Handler, Middleware};

/// Errors raised by eager configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("autoscale bounds invalid: min ({min}) exceeds max ({max})")]
    AutoscaleBounds { min: usize, max: usize },

    #[error("autoscale observe interval must be nonzero")]
    ZeroObserveInterval,

    #[error("rate limit must be a positive requests-per-second value")]
    ZeroRateLimit,
}

/// Bounds and sampling interval for the autoscaling control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoScaleConfig {
    /// Lower worker bound; scale-down never goes below this.
    pub min: usize,
    /// Upper worker bound; scale-up never goes above this.
    pub max: usize,
    /// Queue depth that triggers growth when exceeded.
    pub up_threshold: usize,
    /// Sampling interval of the control loop.
    pub observe_every: Duration,
}

impl Default for AutoScaleConfig {
    fn default() -> Self {
        Self {
            min: 1,
            max: 8,
            up_threshold: 10,
            observe_every: Duration::from_secs(1),
        }
    }
}

/// Configuration for a worker pool.
///
/// | Field | Default |
/// |---|---|
/// | `queue_capacity` | 64 (0 = rendezvous hand-off) |
/// | `initial_workers` | 1 |
/// | `handler` | logs the job at debug level, returns `Ok` |
/// | `middlewares` | empty |
/// | `autoscale` | disabled |
/// | `rate_limit_rps` | disabled |
pub struct PoolConfig {
    /// Bounded queue capacity. Zero means every push waits for a consumer.
    pub queue_capacity: usize,
    /// Workers started by the constructor. Zero is legal: the pool stays
    /// idle until `add_worker` is called.
    pub initial_workers: usize,
    /// The user handler the middleware chain wraps.
    pub handler: Handler,
    /// Handler decorators, first = outermost.
    pub middlewares: Vec<Middleware>,
    /// Autoscaling control loop; `None` disables it.
    pub autoscale: Option<AutoScaleConfig>,
    /// Aggregate attempt throughput cap; `None` means unlimited.
    pub rate_limit_rps: Option<u32>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            initial_workers: 1,
            handler: handler_fn(|_ctx, job| async move {
                debug!(%job, "job received");
                Ok(())
            }),
            middlewares: Vec::new(),
            autoscale: None,
            rate_limit_rps: None,
        }
    }
}

impl PoolConfig {
    pub fn new(queue_capacity: usize) -> Self {
        Self { queue_capacity, ..Default::default() }
    }

    /// Preset for CPU-bound handlers: one initial worker per CPU.
    pub fn cpu_bound(queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            initial_workers: num_cpus::get().max(1),
            ..Default::default()
        }
    }

    pub fn with_initial_workers(mut self, count: usize) -> Self {
        self.initial_workers = count;
        self
    }

    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handler = handler;
        self
    }

    /// Append a middleware; registration order is composition order
    /// (first registered = outermost).
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn with_autoscale(mut self, autoscale: AutoScaleConfig) -> Self {
        self.autoscale = Some(autoscale);
        self
    }

    pub fn with_rate_limit(mut self, rps: u32) -> Self {
        self.rate_limit_rps = Some(rps);
        self
    }

    /// Reject invalid combinations before any task is spawned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(autoscale) = &self.autoscale {
            if autoscale.min > autoscale.max {
                return Err(ConfigError::AutoscaleBounds {
                    min: autoscale.min,
                    max: autoscale.max,
                });
            }
            if autoscale.observe_every.is_zero() {
                return Err(ConfigError::ZeroObserveInterval);
            }
        }
        if self.rate_limit_rps == Some(0) {
            return Err(ConfigError::ZeroRateLimit);
        }
        Ok(())
    }
}
