//! Lock registry backed by a background-refilled bounded pool.
//!
//! Worker-backed schedulers hand out locks on the hot path of actor code, so
//! this store never allocates there: a dedicated refiller thread perpetually
//! pushes fresh lock objects into a bounded channel, and `get` draws from
//! that supply. The refiller runs until the explicit shutdown signal closes
//! the channel; it never relies on a resource-exhaustion failure to stop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use tracing::debug;

use super::{LockStore, SharedLock};

/// Lock registry whose lock objects come from a pre-filled bounded pool.
pub struct PooledLocks {
    table: Mutex<HashMap<String, SharedLock>>,
    supply: Mutex<Option<Receiver<SharedLock>>>,
    stop: Arc<AtomicBool>,
    refiller: Mutex<Option<JoinHandle<()>>>,
}

impl PooledLocks {
    /// Start a store with a pool of `depth` ready lock objects.
    pub fn new(depth: usize) -> std::io::Result<Self> {
        let (supply_tx, supply_rx) = bounded(depth);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let refiller = thread::Builder::new()
            .name("capq-lock-refill".into())
            .spawn(move || {
                while !stop_flag.load(Ordering::Acquire) {
                    // send blocks while the pool is full and fails once the
                    // receiving side is dropped at shutdown
                    if supply_tx.send(SharedLock::default()).is_err() {
                        break;
                    }
                }
                debug!("lock pool refiller stopped");
            })?;

        Ok(Self {
            table: Mutex::new(HashMap::new()),
            supply: Mutex::new(Some(supply_rx)),
            stop,
            refiller: Mutex::new(Some(refiller)),
        })
    }

    fn draw(&self) -> SharedLock {
        let supply = self.supply.lock();
        match supply.as_ref().and_then(|rx| rx.recv().ok()) {
            Some(lock) => lock,
            // after shutdown the pool is closed; fall back to direct allocation
            None => SharedLock::default(),
        }
    }
}

impl LockStore for PooledLocks {
    fn get(&self, id: &str) -> SharedLock {
        if let Some(existing) = self.table.lock().get(id) {
            return existing.clone();
        }
        let fresh = self.draw();
        let mut table = self.table.lock();
        table.entry(id.to_owned()).or_insert(fresh).clone()
    }

    fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        // dropping the receiver closes the channel and unblocks the refiller
        *self.supply.lock() = None;
        if let Some(handle) = self.refiller.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PooledLocks {
    fn drop(&mut self) {
        self.shutdown();
    }
}
