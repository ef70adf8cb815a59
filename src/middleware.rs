//! Composable middleware around the pool's job handler.
//!
//! A middleware takes the next handler and returns a wrapping handler.
//! Chains are composed once per pool at construction; the first registered
//! middleware is the outermost wrapper and observes the call first and
//! last. A configured rate limit is always appended innermost so that
//! every attempt, including each retry attempt, is individually gated.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::queue::Job;

/// Failure surfaced by a job handler.
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// The logic invoked per job, after middleware composition.
///
/// The token is the pool's shutdown signal (or, under [`retry`], a
/// per-attempt child of it); handlers that run long are expected to
/// observe it.
pub type Handler =
    Arc<dyn Fn(CancellationToken, Job) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync>;

/// A handler-wrapping decorator.
pub type Middleware = Box<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Lift an async closure into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(CancellationToken, Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    Arc::new(move |ctx, job| f(ctx, job).boxed())
}

/// Compose `middlewares` (first = outermost) around `base`, with an
/// optional innermost rate gate.
pub(crate) fn compose(
    middlewares: &[Middleware],
    rate_limit_rps: Option<u32>,
    base: Handler,
) -> Handler {
    let mut handler = base;
    if let Some(rps) = rate_limit_rps {
        handler = rate_limit(rps)(handler);
    }
    for middleware in middlewares.iter().rev() {
        handler = middleware(handler);
    }
    handler
}

/// Records a start event and a completion event with elapsed duration.
/// Control flow passes through untouched; failures are not suppressed.
pub fn logging() -> Middleware {
    Box::new(|next: Handler| {
        Arc::new(move |ctx, job: Job| {
            let next = Arc::clone(&next);
            async move {
                debug!(%job, "job started");
                let start = tokio::time::Instant::now();
                let result = next(ctx, job.clone()).await;
                let elapsed = start.elapsed();
                match &result {
                    Ok(()) => debug!(%job, ?elapsed, "job done"),
                    Err(error) => debug!(%job, ?elapsed, %error, "job failed"),
                }
                result
            }
            .boxed()
        })
    })
}

/// Converts panics and `Err` returns from the wrapped handler into a
/// logged event plus a normal `Ok` return; the job counts as handled.
///
/// Place recovery inside [`retry`] to shield each attempt individually;
/// composition order is the caller's responsibility and is not corrected
/// here.
pub fn recovery() -> Middleware {
    Box::new(|next: Handler| {
        Arc::new(move |ctx, job: Job| {
            let next = Arc::clone(&next);
            async move {
                match AssertUnwindSafe(next(ctx, job.clone())).catch_unwind().await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(error)) => {
                        warn!(%job, %error, "job failed; continuing");
                        Ok(())
                    }
                    Err(panic) => {
                        error!(%job, panic = panic_message(&panic), "panic recovered");
                        Ok(())
                    }
                }
            }
            .boxed()
        })
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Initial per-attempt deadline; doubles after every failed attempt.
const INITIAL_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(50);

/// Re-invokes the wrapped handler in isolated attempts, each spawned as
/// its own task with its own cancellation token and a doubling per-attempt
/// deadline. An attempt fails by timing out, panicking, or returning
/// `Err`; `max_retries` extra attempts follow the first.
///
/// A timed-out attempt is cancelled through its token. A handler that does
/// not observe the token may still finish in the background with side
/// effects; the retry chain has already moved on by then.
pub fn retry(max_retries: u32) -> Middleware {
    Box::new(move |next: Handler| {
        Arc::new(move |ctx: CancellationToken, job: Job| {
            let next = Arc::clone(&next);
            async move {
                let mut deadline = INITIAL_ATTEMPT_TIMEOUT;
                let mut last_error: Option<JobError> = None;
                for attempt in 0..=max_retries {
                    let attempt_token = ctx.child_token();
                    let mut task: JoinHandle<Result<(), JobError>> =
                        tokio::spawn(next(attempt_token.clone(), job.clone()));
                    match tokio::time::timeout(deadline, &mut task).await {
                        Ok(Ok(Ok(()))) => return Ok(()),
                        Ok(Ok(Err(error))) => {
                            debug!(%job, attempt, %error, "attempt failed");
                            last_error = Some(error);
                        }
                        Ok(Err(join_error)) => {
                            debug!(%job, attempt, %join_error, "attempt aborted");
                            last_error = Some(Box::new(join_error));
                        }
                        Err(_) => {
                            attempt_token.cancel();
                            debug!(%job, attempt, ?deadline, "attempt timed out");
                            last_error =
                                Some(format!("attempt timed out after {deadline:?}").into());
                        }
                    }
                    deadline *= 2;
                }
                Err(last_error.unwrap_or_else(|| "retry budget exhausted".into()))
            }
            .boxed()
        })
    })
}

/// Token-bucket gate on handler invocations: bucket capacity one, starting
/// empty, refilled with one token every `1/rps`. A refill is dropped while
/// the bucket is full. Each invocation waits for a token, so aggregate
/// attempt throughput — not per-job throughput — is bounded.
///
/// `rps` must be nonzero; `PoolConfig::validate` rejects zero before a
/// chain is ever composed.
pub fn rate_limit(rps: u32) -> Middleware {
    Box::new(move |next: Handler| {
        let gate = Arc::new(RateGate::new(rps));
        Arc::new(move |ctx, job| {
            let next = Arc::clone(&next);
            let gate = Arc::clone(&gate);
            async move {
                gate.acquire().await;
                next(ctx, job).await
            }
            .boxed()
        })
    })
}

/// One bucket per composed chain. The refill task is the sole producer of
/// permits and dies with the chain.
struct RateGate {
    tokens: Arc<Semaphore>,
    refill: JoinHandle<()>,
}

impl RateGate {
    fn new(rps: u32) -> Self {
        assert!(rps > 0, "rate limit must be positive");
        let tokens = Arc::new(Semaphore::new(0));
        let bucket = Arc::clone(&tokens);
        let interval = Duration::from_secs(1) / rps;
        let refill = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                if bucket.available_permits() == 0 {
                    bucket.add_permits(1);
                }
            }
        });
        Self { tokens, refill }
    }

    async fn acquire(&self) {
        // The semaphore is never closed, so acquisition cannot fail.
        if let Ok(permit) = self.tokens.acquire().await {
            permit.forget();
        }
    }
}

impl Drop for RateGate {
    fn drop(&mut self) {
        self.refill.abort();
    }
}

#[cfg(test)]
#[path = "middleware_tests.rs"]
mod tests;
