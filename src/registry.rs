//! Mutex-guarded worker registry.
//!
//! The registry and the identity counter are the only mutable shared state
//! in the pool. Every mutation — add, remove, autoscale, shutdown teardown
//! — serializes through the single lock here; multi-step scaling decisions
//! hold the guard across the whole read-decide-act sequence.

use std::collections::HashMap;

use parking_lot::{Mutex, MutexGuard};

use crate::worker::WorkerHandle;

/// Worker identity: monotonically increasing, unique for the pool's
/// lifetime, never reused even after removal.
pub type WorkerId = u64;

#[derive(Default)]
struct RegistryInner {
    next_id: WorkerId,
    workers: HashMap<WorkerId, WorkerHandle>,
}

/// The authoritative mapping from worker identity to its control handle.
#[derive(Default)]
pub(crate) struct WorkerRegistry {
    inner: Mutex<RegistryInner>,
}

impl WorkerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquire the registry lock for a multi-step mutation.
    pub(crate) fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard { inner: self.inner.lock() }
    }

    /// Remove a specific worker, returning its handle if it was registered.
    pub(crate) fn remove(&self, id: WorkerId) -> Option<WorkerHandle> {
        self.inner.lock().workers.remove(&id)
    }

    /// Remove every worker at once. Used by shutdown's bulk teardown.
    pub(crate) fn drain(&self) -> Vec<(WorkerId, WorkerHandle)> {
        self.inner.lock().workers.drain().collect()
    }

    /// Snapshot of the registry size; may be stale immediately after.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().workers.len()
    }
}

/// Exclusive access to the registry for the duration of one critical
/// section.
pub(crate) struct RegistryGuard<'a> {
    inner: MutexGuard<'a, RegistryInner>,
}

impl RegistryGuard<'_> {
    pub(crate) fn len(&self) -> usize {
        self.inner.workers.len()
    }

    /// Burn the next identity without starting a worker. Keeps identities
    /// unique across a shutdown race.
    pub(crate) fn allocate_id(&mut self) -> WorkerId {
        let id = self.inner.next_id;
        self.inner.next_id += 1;
        id
    }

    /// Allocate `count` fresh identities and register the handle `spawn`
    /// produces for each, all inside the current critical section.
    pub(crate) fn register_with(
        &mut self,
        count: usize,
        mut spawn: impl FnMut(WorkerId) -> WorkerHandle,
    ) -> Vec<WorkerId> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.allocate_id();
            let handle = spawn(id);
            self.inner.workers.insert(id, handle);
            ids.push(id);
        }
        ids
    }

    /// Remove up to `count` workers, chosen in whatever order the map
    /// yields them.
    pub(crate) fn remove_arbitrary(&mut self, count: usize) -> Vec<(WorkerId, WorkerHandle)> {
        let victims: Vec<WorkerId> = self.inner.workers.keys().copied().take(count).collect();
        victims
            .into_iter()
            .filter_map(|id| self.inner.workers.remove(&id).map(|handle| (id, handle)))
            .collect()
    }
}
