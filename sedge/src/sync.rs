//! Binary wake semaphore shared by all writers waiting out a grace period.

use parking_lot::{Condvar, Mutex};

/// Binary semaphore: one permit, many contenders.
///
/// Readers release it from `read_unlock` when a writer asked to be woken;
/// writers drain stale permits before re-arming wake requests, so a release
/// that raced an earlier scan cannot satisfy a later wait spuriously.
pub(crate) struct Semaphore {
    permit: Mutex<bool>,
    cond: Condvar,
}

impl Semaphore {
    pub(crate) const fn new(available: bool) -> Self {
        Self {
            permit: Mutex::new(available),
            cond: Condvar::new(),
        }
    }

    /// Take the permit, blocking until one is available.
    pub(crate) fn acquire(&self) {
        let mut permit = self.permit.lock();
        while !*permit {
            self.cond.wait(&mut permit);
        }
        *permit = false;
    }

    /// Take the permit if available; never blocks.
    pub(crate) fn try_acquire(&self) -> bool {
        let mut permit = self.permit.lock();
        let had = *permit;
        *permit = false;
        had
    }

    /// Make the permit available. Releasing an available semaphore is a no-op.
    pub(crate) fn release(&self) {
        let mut permit = self.permit.lock();
        *permit = true;
        self.cond.notify_one();
    }
}
