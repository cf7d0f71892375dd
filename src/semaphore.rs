//! Host stand-in for the RTOS counting semaphore used for the binary-upload
//! completion signal and the RUNNER job signal. Both are defined with
//! capacity 1 in the spec (`K_SEM_DEFINE(sem, 0, 1)`), so this is really a
//! binary semaphore; `give` on an already-raised semaphore is a no-op
//! rather than a saturating increment, matching capacity-1 semantics.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial.min(1)),
            cond: Condvar::new(),
        }
    }

    /// Raises the semaphore, waking one waiter. Capacity-1: raising an
    /// already-raised semaphore has no additional effect.
    pub fn give(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count = 1;
        self.cond.notify_one();
    }

    /// Resets the semaphore to 0 regardless of its current value.
    pub fn reset(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count = 0;
    }

    /// Blocks indefinitely until the semaphore is raised, then consumes it.
    pub fn take(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        while *count == 0 {
            count = self.cond.wait(count).unwrap_or_else(|e| e.into_inner());
        }
        *count = 0;
    }

    /// Blocks until the semaphore is raised or `timeout` elapses.
    /// Returns `true` if it was taken, `false` on timeout.
    pub fn take_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        while *count == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self
                .cond
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            count = guard;
            if result.timed_out() && *count == 0 {
                return false;
            }
        }
        *count = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn take_timeout_times_out_when_never_given() {
        let sem = Semaphore::new(0);
        assert!(!sem.take_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn take_timeout_succeeds_once_given() {
        let sem = Arc::new(Semaphore::new(0));
        let sem2 = sem.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            sem2.give();
        });
        assert!(sem.take_timeout(Duration::from_secs(1)));
    }

    #[test]
    fn reset_clears_a_pending_signal() {
        let sem = Semaphore::new(0);
        sem.give();
        sem.reset();
        assert!(!sem.take_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn capacity_is_one() {
        let sem = Semaphore::new(0);
        sem.give();
        sem.give();
        assert!(sem.take_timeout(Duration::from_millis(10)));
        // second give was absorbed, not queued
        assert!(!sem.take_timeout(Duration::from_millis(10)));
    }
}
