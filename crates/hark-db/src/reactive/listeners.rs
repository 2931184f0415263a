//! ListenerRegistry<E>: the typed pub/sub primitive behind `Database`.
//!
//! Listeners are stored as `Arc<dyn Fn(&E) -> Result<()>>` so snapshots are
//! cheap. Snapshot-on-emit semantics mean:
//!   - A listener removed *during* emission is still called in that round.
//!   - A listener added *during* emission is NOT called until the next emit.
//!
//! The first listener to return `Err` stops the round and the error goes back
//! to the emitter. Panics propagate to the caller.
//!
//! All methods take `&self` (interior mutability via `parking_lot::Mutex`),
//! and the lock is never held while a callback runs, so listeners may call
//! `add`/`remove` or emit again without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Handle returned by [`ListenerRegistry::add`], accepted by
/// [`ListenerRegistry::remove`]. Ids are never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Closure type for listeners.
pub type ListenerFn<E> = dyn Fn(&E) -> Result<()> + Send + Sync;

/// Typed synchronous listener registry.
pub struct ListenerRegistry<E> {
    listeners: Mutex<Vec<(ListenerId, Arc<ListenerFn<E>>)>>,
    next_id: AtomicU64,
}

impl<E> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `callback`; it will be called after every listener already
    /// registered.
    pub fn add(&self, callback: impl Fn(&E) -> Result<()> + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove the listener identified by `id`. Returns whether it was present.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Call every listener registered at the moment of the call, in
    /// registration order, stopping at the first error.
    pub fn emit(&self, event: &E) -> Result<()> {
        let snapshot: Vec<(ListenerId, Arc<ListenerFn<E>>)> = {
            let guard = self.listeners.lock();
            guard.iter().map(|(id, cb)| (*id, Arc::clone(cb))).collect()
        };
        for (id, cb) in snapshot {
            if let Err(e) = cb(event) {
                tracing::debug!(listener = %id, error = %e, "listener failed; dispatch stopped");
                return Err(e);
            }
        }
        Ok(())
    }
}

impl<E> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
