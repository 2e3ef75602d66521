//! Completion signals shared between the IO thread and waiting callers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// One-shot broadcast: once completed it stays completed, and every waiter,
/// past or future, observes it.
#[derive(Debug, Default)]
pub struct Completion {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn complete(&self) {
        let mut done = self.done.lock();
        if !*done {
            *done = true;
            self.cond.notify_all();
        }
    }

    pub fn is_complete(&self) -> bool {
        *self.done.lock()
    }

    /// Waits until completed or `timeout` elapses. Returns whether it
    /// completed.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.done.lock();
        while !*done {
            if self.cond.wait_until(&mut done, deadline).timed_out() {
                return *done;
            }
        }
        true
    }
}

/// Counts settles. Callers snapshot the generation and wait for it to move.
#[derive(Debug, Default)]
pub struct SettleSignal {
    generation: Mutex<u64>,
    cond: Condvar,
}

impl SettleSignal {
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    pub fn settle(&self) -> u64 {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.cond.notify_all();
        *generation
    }

    /// Waits for a settle after generation `seen`. Returns the new
    /// generation, or `None` on timeout.
    pub fn wait_past(&self, seen: u64, timeout: Duration) -> Option<u64> {
        let deadline = Instant::now() + timeout;
        let mut generation = self.generation.lock();
        while *generation <= seen {
            if self.cond.wait_until(&mut generation, deadline).timed_out() {
                break;
            }
        }
        (*generation > seen).then_some(*generation)
    }

    /// Wakes waiters without settling, so they can re-check a stop flag.
    pub fn poke(&self) {
        self.cond.notify_all();
    }
}
