//! In-process lock registry for the inline backend.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{LockStore, SharedLock};

/// Lazily populated lock registry; all lookups share one table.
#[derive(Default)]
pub struct InProcessLocks {
    table: Mutex<HashMap<String, SharedLock>>,
}

impl InProcessLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockStore for InProcessLocks {
    fn get(&self, id: &str) -> SharedLock {
        let mut table = self.table.lock();
        table
            .entry(id.to_owned())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn same_id_returns_same_lock() {
        let store = InProcessLocks::new();
        let a = store.get("bucket");
        let b = store.get("bucket");
        let c = store.get("other");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn acquire_returns_held_guard() {
        let store = InProcessLocks::new();
        let guard = store.acquire("bucket");
        assert!(store.get("bucket").try_lock().is_none());
        drop(guard);
        assert!(store.get("bucket").try_lock().is_some());
    }
}
