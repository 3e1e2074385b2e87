//! Keyed mutual-exclusion registries shared across worker isolation
//! boundaries.
//!
//! Actor code running in isolated workers coordinates access to shared
//! external resources through a [`LockStore`] injected at spawn time. The
//! registry guarantees exactly one lock object per distinct id for the
//! lifetime of the worker group; lock objects are explicitly shared by design
//! and must only guard external resources, never stand in for the
//! coordinator's own handle ownership.

pub mod memory;
pub mod pooled;

use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

pub use memory::InProcessLocks;
pub use pooled::PooledLocks;

/// A lock object handed out by a store; clones share the same lock.
pub type SharedLock = Arc<Mutex<()>>;

/// An owned, already-held guard on a [`SharedLock`].
pub type LockGuard = ArcMutexGuard<RawMutex, ()>;

/// Process-wide registry of keyed locks.
pub trait LockStore: Send + Sync {
    /// Fetch the lock for `id`, creating it lazily on first use. Subsequent
    /// calls with the same id return the same lock object.
    fn get(&self, id: &str) -> SharedLock;

    /// Fetch and immediately hold the lock for `id`.
    fn acquire(&self, id: &str) -> LockGuard {
        self.get(id).lock_arc()
    }

    /// Release background resources held by the store. Idempotent.
    fn shutdown(&self) {}
}
