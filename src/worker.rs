//! The worker task: pull jobs from the shared queue and run the composed
//! handler until told to stop.
//!
//! Workers are disposable. The only transition is RUNNING to STOPPED, on
//! whichever comes first: the individual stop signal, or the shared queue
//! reporting closed-and-drained. A stopped worker never resumes; replacing
//! one means starting a fresh worker with a fresh identity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::middleware::Handler;
use crate::queue::JobQueue;
use crate::registry::{WorkerId, WorkerRegistry};

/// Control handle kept in the registry for a running worker.
pub(crate) struct WorkerHandle {
    stop: CancellationToken,
}

impl WorkerHandle {
    /// Ask the worker to stop after finishing its current job.
    /// Cooperative, not preemptive.
    pub(crate) fn stop(&self) {
        self.stop.cancel();
    }
}

/// Everything a worker borrows from its pool. Workers share the queue and
/// the composed handler; neither is owned by any single worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) handler: Handler,
    pub(crate) registry: Arc<WorkerRegistry>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) completed: Arc<AtomicU64>,
}

/// Start a worker task on `tracker` and return its control handle.
pub(crate) fn spawn_worker(id: WorkerId, ctx: WorkerContext, tracker: &TaskTracker) -> WorkerHandle {
    let stop = CancellationToken::new();
    tokio::spawn(tracker.track_future(run(id, ctx, stop.clone())));
    WorkerHandle { stop }
}

async fn run(id: WorkerId, ctx: WorkerContext, stop: CancellationToken) {
    // Removes the registry entry on every exit path, including a panic
    // unwinding out of an unrecovered handler.
    let mut guard = Deregister { id, registry: Arc::clone(&ctx.registry), clean: false };
    debug!(worker = id, "worker started");
    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => break,
            job = ctx.queue.pop() => {
                let Some(job) = job else { break };
                if let Err(error) = (ctx.handler)(ctx.shutdown.clone(), job.clone()).await {
                    warn!(worker = id, %job, %error, "job failed");
                }
                ctx.completed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    guard.clean = true;
    debug!(worker = id, "worker stopped");
}

struct Deregister {
    id: WorkerId,
    registry: Arc<WorkerRegistry>,
    clean: bool,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        if self.registry.remove(self.id).is_some() && !self.clean {
            warn!(worker = self.id, "worker terminated by handler panic");
        }
    }
}
