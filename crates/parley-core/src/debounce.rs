//! Coalescing scheduler for fire-and-forget work.
//!
//! Each `schedule` call cancels the previously scheduled closure, so a
//! burst of rapid changes collapses into a single execution after the
//! quiet period. Used to debounce persistent-cache saves.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

pub struct Debouncer {
    delay: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            handle: Mutex::new(None),
        }
    }

    /// Schedule `work` to run after the quiet period, replacing any
    /// previously scheduled closure. Must be called from within a tokio
    /// runtime.
    pub fn schedule<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = self.delay;
        let mut slot = self.handle.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work();
        }));
    }

    /// Drop any pending work without running it.
    pub fn cancel(&self) {
        if let Some(previous) = self.handle.lock().take() {
            previous.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
