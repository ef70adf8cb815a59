//! Bounded FIFO job queue: the single hand-off point between submitters
//! and workers.
//!
//! Multi-producer, multi-consumer. A closed queue still yields buffered
//! jobs until empty (closed-and-drained), then signals end of work with
//! `None`. Capacity zero behaves as a rendezvous: a push completes only
//! while a consumer is parked waiting.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Opaque unit of work submitted to the pool.
///
/// The payload is shared and immutable, so cloning a job (for example to
/// re-invoke it from the retry middleware) is cheap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    payload: Arc<str>,
}

impl Job {
    pub fn new(payload: impl Into<Arc<str>>) -> Self {
        Self { payload: payload.into() }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl From<&str> for Job {
    fn from(payload: &str) -> Self {
        Self::new(payload)
    }
}

impl From<String> for Job {
    fn from(payload: String) -> Self {
        Self::new(payload)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload)
    }
}

/// Returned by [`JobQueue::push`] once the queue has been closed.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct QueueClosed;

struct QueueState {
    items: VecDeque<Job>,
    /// Consumers currently parked in `pop`. A parked consumer counts as
    /// free capacity so a zero-capacity queue hands jobs off directly.
    pop_waiters: usize,
}

/// Bounded FIFO queue shared by all submitters and workers of a pool.
pub(crate) struct JobQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    closed: AtomicBool,
    /// Wakes consumers when a job arrives or the queue closes.
    jobs_available: Notify,
    /// Wakes producers when space frees up or a consumer parks.
    space_available: Notify,
}

impl JobQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState { items: VecDeque::with_capacity(capacity), pop_waiters: 0 }),
            capacity,
            closed: AtomicBool::new(false),
            jobs_available: Notify::new(),
            space_available: Notify::new(),
        }
    }

    /// Enqueue a job, waiting while the queue is full. Fails only after
    /// [`close`](Self::close); the job is then discarded by the caller.
    pub(crate) async fn push(&self, job: Job) -> Result<(), QueueClosed> {
        loop {
            let notified = self.space_available.notified();
            tokio::pin!(notified);
            // Register before checking so a wakeup between the check and
            // the await is not lost.
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if self.closed.load(Ordering::Acquire) {
                    return Err(QueueClosed);
                }
                if state.items.len() < self.capacity + state.pop_waiters {
                    state.items.push_back(job);
                    drop(state);
                    self.jobs_available.notify_one();
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Dequeue the next job in FIFO order, waiting while the queue is
    /// empty. Returns `None` once the queue is closed and drained.
    ///
    /// Cancel-safe: dropping the returned future at its await point never
    /// loses a job.
    pub(crate) async fn pop(&self) -> Option<Job> {
        let mut waiter = PopWaiter { queue: self, parked: false };
        loop {
            let notified = self.jobs_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if let Some(job) = state.items.pop_front() {
                    waiter.unpark(&mut state);
                    drop(state);
                    self.space_available.notify_one();
                    return Some(job);
                }
                if self.closed.load(Ordering::Acquire) {
                    waiter.unpark(&mut state);
                    return None;
                }
                if !waiter.parked {
                    state.pop_waiters += 1;
                    waiter.parked = true;
                    drop(state);
                    // A parked consumer is what lets a zero-capacity push
                    // proceed, so blocked producers must re-check.
                    self.space_available.notify_one();
                }
            }
            notified.await;
        }
    }

    /// Close the queue. At most once takes effect; repeated calls are
    /// no-ops. All parked producers and consumers are woken.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.jobs_available.notify_waiters();
        self.space_available.notify_waiters();
    }

    /// Point-in-time depth snapshot; may be stale on return.
    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Keeps the parked-consumer count truthful even when a `pop` future is
/// dropped mid-wait (a worker hitting its stop signal inside `select!`).
struct PopWaiter<'a> {
    queue: &'a JobQueue,
    parked: bool,
}

impl PopWaiter<'_> {
    fn unpark(&mut self, state: &mut QueueState) {
        if self.parked {
            state.pop_waiters -= 1;
            self.parked = false;
        }
    }
}

impl Drop for PopWaiter<'_> {
    fn drop(&mut self) {
        if self.parked {
            self.queue.state.lock().pop_waiters -= 1;
        }
    }
}
