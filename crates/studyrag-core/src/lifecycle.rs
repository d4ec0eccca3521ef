//! One-time initialization guarded by double-checked locking.
//!
//! The fast path is a single atomic load. The slow path takes an async mutex
//! and re-checks the flag before running the loader, so N concurrent first
//! callers run the loader exactly once and all observe the loaded value.
//! A failed load leaves the cell empty; the next caller retries.
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;

use tokio::sync::Mutex;

pub struct InitCell<T> {
    ready: AtomicBool,
    lock: Mutex<()>,
    value: OnceLock<T>,
    loads: AtomicUsize,
}

impl<T> Default for InitCell<T> {
    fn default() -> Self { Self::new() }
}

impl<T> InitCell<T> {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            lock: Mutex::new(()),
            value: OnceLock::new(),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// The loaded value, if initialization has completed.
    pub fn get(&self) -> Option<&T> {
        if self.is_ready() { self.value.get() } else { None }
    }

    /// Number of times the loader has been started (successful or not).
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub async fn get_or_try_init<F, Fut, E>(&self, load: F) -> Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(v) = self.get() {
            return Ok(v);
        }
        let _guard = self.lock.lock().await;
        // Re-check: another caller may have finished while we waited.
        if let Some(v) = self.get() {
            return Ok(v);
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        let loaded = load().await?;
        let v = self.value.get_or_init(|| loaded);
        self.ready.store(true, Ordering::Release);
        Ok(v)
    }
}
