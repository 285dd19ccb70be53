//! Growable backing array shared by the list, set, and map.
//!
//! Writers claim slots with a CAS on `count`; a writer that finds the array
//! full leaves its critical section, doubles the buffer under the resize
//! mutex, and retries. Readers index the buffer they loaded inside their
//! critical section; the old buffer outlives the swap by one grace period,
//! so a resize never invalidates a pointer a reader is still holding.
//!
//! Publication order is the load-bearing part: `resize` stores the new
//! buffer (release) *before* the new capacity (release), and readers load
//! capacity (acquire) *before* the buffer. A reader that observed capacity
//! `C` therefore always holds a buffer of at least `C` slots.

use parking_lot::Mutex;
use sedge::{synchronize_rcu, RcuCell, ReadGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Storage behaviour of a container built on [`ConcurrentArray`].
///
/// `alloc`/`destroy` are static; `copy` takes the owner so rehashing
/// containers can reprobe with their own hasher. Static dispatch only — this
/// trait sits on the hot path of every reservation.
///
/// # Safety
///
/// `alloc` must return a fully-initialised buffer of exactly `capacity`
/// slots, and `copy` must leave every moved-out source slot in a state
/// `destroy` can handle (empty).
pub unsafe trait Owner {
    /// Element type of the backing buffer.
    type Slot;

    /// Allocate and initialise a buffer of `capacity` slots.
    fn alloc(capacity: usize) -> *mut Self::Slot;

    /// Drop whatever the slots still own and free the buffer.
    ///
    /// # Safety
    ///
    /// `slots` must be a buffer of `capacity` slots from [`alloc`](Owner::alloc),
    /// not freed before, with no reader able to reach it.
    unsafe fn destroy(slots: *mut Self::Slot, capacity: usize);

    /// Move the live contents of `src` into `dest`.
    ///
    /// Runs under the resize mutex after a grace period, so no writer is
    /// mid-store in `src`. Moved-out source slots must be left empty.
    ///
    /// # Safety
    ///
    /// `dest` and `src` must be buffers of `dest_cap` and `src_cap` slots;
    /// `dest` freshly allocated, `src` quiescent as described above.
    unsafe fn copy(
        &self,
        dest: *mut Self::Slot,
        src: *mut Self::Slot,
        dest_cap: usize,
        src_cap: usize,
    );
}

/// Lock-free-to-read, single-resizer growable array of `O::Slot`.
pub struct ConcurrentArray<O: Owner> {
    resize_lock: Mutex<()>,
    capacity: AtomicUsize,
    count: AtomicUsize,
    slots: RcuCell<O::Slot>,
}

// SAFETY: the array hands out shared references to slots across threads;
// slots carry their own synchronisation (atomics / published-once cells).
unsafe impl<O: Owner> Send for ConcurrentArray<O> where O::Slot: Send + Sync {}
unsafe impl<O: Owner> Sync for ConcurrentArray<O> where O::Slot: Send + Sync {}

impl<O: Owner> ConcurrentArray<O> {
    /// Create an array with `capacity` initialised slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            resize_lock: Mutex::new(()),
            capacity: AtomicUsize::new(capacity),
            count: AtomicUsize::new(0),
            slots: RcuCell::new(O::alloc(capacity)),
        }
    }

    /// Number of reserved slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Whether no slot has been reserved yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Claim the next free index, growing the array as needed.
    ///
    /// Returns the claimed index. The caller must either publish an entry
    /// for it or call [`drop_reservation`](ConcurrentArray::drop_reservation).
    /// Growth leaves the critical section through `rcu` while the resize
    /// waits out its grace periods.
    pub fn reserve(&self, rcu: &mut ReadGuard<'_>, owner: &O, load_factor: f32) -> usize {
        let mut current = self.count.load(Ordering::Relaxed);
        loop {
            loop {
                // Load capacity before the count check; pairs with the
                // buffer-then-capacity publication in resize.
                let current_capacity = self.capacity.load(Ordering::Acquire);
                let max = (load_factor * current_capacity as f32) as usize;
                if current < max {
                    break;
                }
                rcu.suspend(|| {
                    self.resize(owner, current_capacity, current_capacity * 2);
                });
                current = self.count.load(Ordering::Relaxed);
            }

            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current,
                Err(now) => current = now,
            }
        }
    }

    /// Give back a reservation taken by [`reserve`](ConcurrentArray::reserve)
    /// that will not be published.
    #[inline]
    pub fn drop_reservation(&self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Replace the buffer with one of `new_capacity` slots.
    ///
    /// Returns false if the capacity is no longer `expected_capacity`
    /// (another writer already grew the array). Must not be called inside a
    /// critical section: it runs two grace periods — one to flush writers
    /// still storing into slots they claimed before the array filled, one
    /// to retire the old buffer after the swap.
    pub fn resize(&self, owner: &O, expected_capacity: usize, new_capacity: usize) -> bool {
        let _lock = self.resize_lock.lock();

        let old_capacity = self.capacity.load(Ordering::Relaxed);
        if old_capacity != expected_capacity {
            return false;
        }

        // Flush in-flight writers: anything claimed in the old buffer is
        // published before its claimant's section ends, and no new claim can
        // succeed while the array is full.
        synchronize_rcu();

        let old_slots = self.slots.load_owner();
        let new_slots = O::alloc(new_capacity);
        // SAFETY: new_slots fresh from alloc; old_slots quiescent after the
        // grace period above; capacities are exact.
        unsafe {
            owner.copy(new_slots, old_slots, new_capacity, old_capacity);
        }
        self.slots.store(new_slots);
        // Store the buffer before the new capacity.
        self.capacity.store(new_capacity, Ordering::Release);

        synchronize_rcu();

        // SAFETY: no reader section that could still hold old_slots remains.
        unsafe {
            O::destroy(old_slots, old_capacity);
        }
        true
    }

    /// Reference the slot at `i` in the current buffer.
    ///
    /// No capacity recheck: the caller must only index positions it has
    /// reason to believe exist (a published size, or a capacity it observed
    /// in this same critical section).
    #[inline]
    pub fn get<'g>(&self, i: usize, guard: &'g ReadGuard<'_>) -> &'g O::Slot {
        let slots = self.slots.load(guard);
        // SAFETY: the buffer is immutably published for at least the guard's
        // lifetime and has at least `i + 1` slots per the caller contract.
        unsafe { &*slots.as_raw().add(i) }
    }

    /// View the whole table as a slice of `capacity()` slots.
    ///
    /// Capacity is loaded before the buffer, so the slice never overruns.
    #[inline]
    pub fn slice<'g>(&self, guard: &'g ReadGuard<'_>) -> &'g [O::Slot] {
        let capacity = self.capacity.load(Ordering::Acquire);
        let slots = self.slots.load(guard);
        // SAFETY: a buffer at least `capacity` slots long is published for
        // the guard's lifetime (see module docs on publication order).
        unsafe { std::slice::from_raw_parts(slots.as_raw(), capacity) }
    }
}

impl<O: Owner> Drop for ConcurrentArray<O> {
    fn drop(&mut self) {
        // SAFETY: &mut self — no readers, no concurrent resize.
        unsafe {
            O::destroy(self.slots.load_owner(), self.capacity.load(Ordering::Relaxed));
        }
    }
}
