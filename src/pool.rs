//! The pool orchestrator: owns the queue, the worker registry, the
//! composed handler, the autoscaler, and the shutdown protocol.
//!
//! `Pool` is a cheaply cloneable handle; all clones share one pool.
//! Submission is fire-and-forget: a job that cannot be enqueued before
//! the caller's token or the pool's shutdown fires is silently dropped.
//! Callers that need delivery confirmation must build it into the job.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::autoscale::run_autoscaler;
use crate::config::{ConfigError, PoolConfig};
use crate::middleware::{compose, Handler};
use crate::queue::{Job, JobQueue};
use crate::registry::{WorkerId, WorkerRegistry};
use crate::worker::{spawn_worker, WorkerContext};

/// Point-in-time counters for observability. Every field may be stale by
/// the time the caller reads it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub queue_depth: usize,
    pub jobs_completed: u64,
    pub jobs_dropped: u64,
}

struct PoolInner {
    queue: Arc<JobQueue>,
    registry: Arc<WorkerRegistry>,
    handler: Handler,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    completed: Arc<AtomicU64>,
    dropped: AtomicU64,
    shutdown_started: AtomicBool,
}

/// A dynamically resizable worker pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Build a pool from `config`: validate it, compose the middleware
    /// chain once, start the initial workers and, when configured, the
    /// autoscaler loop.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: PoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let handler = compose(&config.middlewares, config.rate_limit_rps, config.handler.clone());
        let inner = Arc::new(PoolInner {
            queue: Arc::new(JobQueue::new(config.queue_capacity)),
            registry: Arc::new(WorkerRegistry::new()),
            handler,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            completed: Arc::new(AtomicU64::new(0)),
            dropped: AtomicU64::new(0),
            shutdown_started: AtomicBool::new(false),
        });
        let pool = Self { inner };

        if config.initial_workers > 0 {
            let ctx = pool.worker_context();
            pool.inner.registry.lock().register_with(config.initial_workers, |id| {
                spawn_worker(id, ctx.clone(), &pool.inner.tracker)
            });
        }

        if let Some(autoscale) = config.autoscale {
            let inner = &pool.inner;
            tokio::spawn(inner.tracker.track_future(run_autoscaler(
                autoscale,
                Arc::clone(&inner.queue),
                Arc::clone(&inner.registry),
                pool.worker_context(),
                inner.tracker.clone(),
                inner.shutdown.clone(),
            )));
        }

        info!(
            queue_capacity = config.queue_capacity,
            initial_workers = config.initial_workers,
            autoscale = config.autoscale.is_some(),
            "pool started"
        );
        Ok(pool)
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            queue: Arc::clone(&self.inner.queue),
            handler: Arc::clone(&self.inner.handler),
            registry: Arc::clone(&self.inner.registry),
            shutdown: self.inner.shutdown.clone(),
            completed: Arc::clone(&self.inner.completed),
        }
    }

    /// Enqueue a job, waiting only for queue space or pool shutdown.
    /// Dropped jobs are not reported back to the caller.
    pub async fn submit(&self, job: impl Into<Job>) {
        self.enqueue(None, job.into()).await;
    }

    /// Like [`submit`](Self::submit), but also gives up as soon as the
    /// caller's token fires.
    pub async fn submit_with_cancel(&self, cancel: CancellationToken, job: impl Into<Job>) {
        self.enqueue(Some(cancel), job.into()).await;
    }

    async fn enqueue(&self, cancel: Option<CancellationToken>, job: Job) {
        if self.inner.queue.is_closed() {
            self.drop_job(&job, "queue closed");
            return;
        }
        let cancelled = async {
            match &cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = cancelled => self.drop_job(&job, "submit cancelled"),
            () = self.inner.shutdown.cancelled() => self.drop_job(&job, "pool shutting down"),
            result = self.inner.queue.push(job.clone()) => {
                if result.is_err() {
                    self.drop_job(&job, "queue closed");
                }
            }
        }
    }

    fn drop_job(&self, job: &Job, reason: &str) {
        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        debug!(%job, reason, "job dropped");
    }

    /// Start one worker and return its identity. Safe to call
    /// concurrently with any other pool operation.
    ///
    /// After shutdown has begun the identity is still allocated (and
    /// burned) but no worker starts; identities are never reused.
    pub fn add_worker(&self) -> WorkerId {
        let mut reg = self.inner.registry.lock();
        if self.inner.shutdown_started.load(Ordering::Acquire) {
            return reg.allocate_id();
        }
        let ctx = self.worker_context();
        let ids = reg.register_with(1, |id| spawn_worker(id, ctx.clone(), &self.inner.tracker));
        ids[0]
    }

    /// Ask the worker with identity `id` to stop after its current job.
    /// Idempotent: unknown or already-removed identities are a no-op.
    pub fn remove_worker(&self, id: WorkerId) {
        if let Some(handle) = self.inner.registry.remove(id) {
            handle.stop();
            debug!(worker = id, "worker removal requested");
        }
    }

    /// Advisory snapshot of the registry size.
    pub fn worker_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Advisory snapshot of the number of queued jobs.
    pub fn queue_depth(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.worker_count(),
            queue_depth: self.queue_depth(),
            jobs_completed: self.inner.completed.load(Ordering::Relaxed),
            jobs_dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }

    /// Tear the pool down: signal shutdown, close the queue, stop every
    /// registered worker, and wait until all pool tasks have exited.
    ///
    /// Idempotent: concurrent and repeated calls all wait for the one
    /// teardown to complete. Queued jobs that no worker picked up before
    /// its stop signal are lost.
    pub async fn shutdown(&self) {
        if !self.inner.shutdown_started.swap(true, Ordering::AcqRel) {
            info!("pool shutting down");
            self.inner.shutdown.cancel();
            self.inner.queue.close();
            for (_, handle) in self.inner.registry.drain() {
                handle.stop();
            }
            self.inner.tracker.close();
        }
        self.inner.tracker.wait().await;
        debug!("pool shutdown complete");
    }
}
