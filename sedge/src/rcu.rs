//! Quiescent-state RCU: reader handles, critical-section guards, and the
//! writer-side grace period.
//!
//! The protocol is a single global period counter plus two words per reader:
//!
//! - `read_lock` copies the current period into the reader's slot and fences;
//!   `read_unlock` zeroes the slot, fences, and releases the shared wake
//!   semaphore if a writer asked for it.
//! - `synchronize_rcu` bumps the period, snapshots the registered readers,
//!   and scans: a reader still showing the old period is still inside a
//!   section that predates the bump and must be waited out.
//!
//! The seq-cst fence in `read_unlock` pairs with the one in the writer's
//! scan loop, so every reader is either caught by the scan or has already
//! seen its wake request and will release the semaphore on exit. Readers
//! never take a lock and never perform an atomic read-modify-write.

use crate::sync::Semaphore;
use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Global grace-period number. Starts at 1 and only grows; 0 is reserved in
/// reader slots to mean "not inside a critical section".
static GRACE_PERIOD: AtomicUsize = AtomicUsize::new(1);

/// Wake signal shared by all writers. Starts available; `synchronize_rcu`
/// drains stale permits before each scan.
static WAKE: Semaphore = Semaphore::new(true);

/// Registered readers. The lock is held for the whole of `synchronize_rcu`,
/// which serialises concurrent writers and blocks registration during a
/// grace period; both are required for the period-equality test in the scan
/// to be exact.
static READERS: Mutex<Vec<Arc<ReaderSlot>>> = Mutex::new(Vec::new());

/// Shared per-reader state, observable by writers after the handle is gone.
struct ReaderSlot {
    /// Period observed on entry; 0 while outside any critical section.
    period: AtomicUsize,
    /// Set by a writer that wants a wakeup when this reader exits.
    waiting: AtomicBool,
}

/// A per-thread reader handle.
///
/// Creating a handle registers it with the engine; dropping it deregisters.
/// The handle is `!Sync`: a critical section belongs to one thread. Most
/// callers keep one handle per worker thread, or rely on the process-wide
/// ambient handle via [`with_ambient`].
pub struct RcuThread {
    slot: Arc<ReaderSlot>,
    /// Critical-section nesting depth. Entering at depth > 0 aborts.
    depth: Cell<u32>,
}

impl RcuThread {
    /// Create and register a reader handle.
    pub fn new() -> Self {
        let slot = Arc::new(ReaderSlot {
            period: AtomicUsize::new(0),
            waiting: AtomicBool::new(false),
        });
        READERS.lock().push(slot.clone());
        Self {
            slot,
            depth: Cell::new(0),
        }
    }

    /// Enter a critical section without a guard. Prefer [`read_lock`].
    ///
    /// Must be balanced by exactly one [`unlock`]. Entering while already
    /// inside a critical section aborts the process: the nested section
    /// would later let `synchronize_rcu` deadlock against its own caller.
    ///
    /// [`read_lock`]: RcuThread::read_lock
    /// [`unlock`]: RcuThread::unlock
    #[inline]
    pub fn lock(&self) {
        if self.depth.replace(1) != 0 {
            std::process::abort();
        }
        // Write the observed period before any read in the section; ordered
        // by the fence below.
        self.slot
            .period
            .store(GRACE_PERIOD.load(Ordering::Relaxed), Ordering::Relaxed);
        fence(Ordering::SeqCst);
    }

    /// Leave a critical section entered with [`lock`](RcuThread::lock).
    ///
    /// Aborts if the handle is not inside a critical section.
    #[inline]
    pub fn unlock(&self) {
        if self.depth.replace(0) != 1 {
            std::process::abort();
        }
        self.slot.period.store(0, Ordering::Release);
        fence(Ordering::SeqCst);
        // Ordered by the fence above: the period is zeroed before the wake
        // request is read, pairing with the writer's fence between signal
        // and scan.
        if self.slot.waiting.load(Ordering::Relaxed) {
            self.slot.waiting.store(false, Ordering::Relaxed);
            WAKE.release();
        }
    }

    /// Enter a critical section, returning an RAII guard.
    ///
    /// Nested entry is a fatal programming error (process abort).
    #[inline]
    pub fn read_lock(&self) -> ReadGuard<'_> {
        self.lock();
        ReadGuard {
            thread: self,
            owned: true,
        }
    }

    /// Enter a critical section, reusing one that is already open.
    ///
    /// If the handle is inside a critical section the returned guard borrows
    /// it and leaves it open on drop; otherwise this behaves like
    /// [`read_lock`](RcuThread::read_lock). This is the entry point for call
    /// surfaces whose callers may or may not hold the read lock already.
    #[inline]
    pub fn enter(&self) -> ReadGuard<'_> {
        if self.depth.get() > 0 {
            ReadGuard {
                thread: self,
                owned: false,
            }
        } else {
            self.read_lock()
        }
    }
}

impl Default for RcuThread {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RcuThread {
    fn drop(&mut self) {
        // Deregistration waits out any grace period in progress, so a writer
        // that snapshotted this reader still owns valid (Arc-kept) state.
        let mut readers = READERS.lock();
        if let Some(pos) = readers.iter().position(|s| Arc::ptr_eq(s, &self.slot)) {
            readers.swap_remove(pos);
        }
    }
}

/// RAII critical section on an [`RcuThread`].
///
/// Pointers loaded from [`RcuCell`](crate::RcuCell)s while the guard is live
/// remain valid until it drops. Containers take `&ReadGuard` for reads and
/// `&mut ReadGuard` for operations that may need to [`suspend`] the section.
///
/// [`suspend`]: ReadGuard::suspend
pub struct ReadGuard<'a> {
    thread: &'a RcuThread,
    /// False when the guard borrows a section opened by the caller.
    owned: bool,
}

impl ReadGuard<'_> {
    /// Leave the critical section, run `f`, and re-enter.
    ///
    /// Every pointer loaded before the call is invalidated: a grace period
    /// may elapse inside `f`. This exists for writers that must block on
    /// another writer's grace period mid-operation (container growth) —
    /// blocking while inside the section would deadlock.
    pub fn suspend<R>(&mut self, f: impl FnOnce() -> R) -> R {
        self.thread.unlock();
        let r = f();
        self.thread.lock();
        r
    }
}

impl Drop for ReadGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        if self.owned {
            self.thread.unlock();
        }
    }
}

/// Wait for every critical section in progress at the call to end.
///
/// Concurrent callers are serialised on the registry lock; each gets its own
/// period bump and scan. Readers that enter after the bump observe the new
/// period and do not hold this caller's grace period open.
///
/// Must not be called from inside a critical section on the same thread —
/// the scan would wait for the caller's own section forever.
pub fn synchronize_rcu() {
    let readers = READERS.lock();
    if readers.is_empty() {
        return;
    }

    let gp = GRACE_PERIOD.load(Ordering::Relaxed);
    GRACE_PERIOD.store(gp + 1, Ordering::SeqCst);

    // Scan every registered reader on the first pass.
    let mut waiting: Vec<&Arc<ReaderSlot>> = readers.iter().collect();
    loop {
        // Drop any stale notification from a reader we already accounted for.
        WAKE.try_acquire();

        // Request a wakeup...
        for slot in &waiting {
            slot.waiting.store(true, Ordering::Relaxed);
        }

        fence(Ordering::SeqCst);

        // ...then check who is still going through the old period. A reader
        // whose slot shows `gp` entered before the bump and is still inside.
        // Anyone else either never was a problem or has exited; their wake
        // request is withdrawn (race-free: the fence above pairs with the
        // fence in `unlock`).
        waiting.retain(|slot| {
            if slot.period.load(Ordering::Relaxed) == gp {
                true
            } else {
                slot.waiting.store(false, Ordering::Relaxed);
                false
            }
        });

        // None? We're done.
        if waiting.is_empty() {
            return;
        }

        // Wait for some reader to finish, then start over.
        WAKE.acquire();
    }
}

thread_local! {
    /// Lazily-registered ambient handle for callers without one of their own.
    static AMBIENT: RcuThread = RcuThread::new();
}

/// Run `f` with the calling thread's ambient reader handle.
///
/// The handle is created and registered on first use and deregistered when
/// the thread exits. During thread teardown (when thread-local storage is
/// already gone) a transient handle is registered for the duration of the
/// call.
pub fn with_ambient<R>(f: impl FnOnce(&RcuThread) -> R) -> R {
    let mut f = Some(f);
    match AMBIENT.try_with(|rcu| (f.take().expect("ambient closure run once"))(rcu)) {
        Ok(r) => r,
        Err(_) => {
            let rcu = RcuThread::new();
            (f.take().expect("ambient closure run once"))(&rcu)
        }
    }
}
