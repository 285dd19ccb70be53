//! Open-addressing concurrent hash set of `usize` keys.
//!
//! Linear probing from `hash(key) - 1`, capacity always a power of two.
//! A slot moves from the all-ones sentinel to a key exactly once and never
//! back, which is what makes lookups safe against concurrent inserts: the
//! probe sequence is deterministic for a given capacity and installed keys
//! are monotonic per slot.

use crate::array::{ConcurrentArray, Owner};
use foldhash::fast::FixedState;
use sedge::ReadGuard;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reserved key meaning "empty slot". Adding it is a programming error.
pub const EMPTY_KEY: usize = usize::MAX;

/// Concurrent grow-only hash set of `usize` keys.
pub struct ConcurrentHashSet {
    contents: ConcurrentArray<Self>,
    hash: FixedState,
}

unsafe impl Owner for ConcurrentHashSet {
    type Slot = AtomicUsize;

    fn alloc(capacity: usize) -> *mut AtomicUsize {
        let mut slots = Vec::with_capacity(capacity);
        slots.extend((0..capacity).map(|_| AtomicUsize::new(EMPTY_KEY)));
        Box::into_raw(slots.into_boxed_slice()) as *mut AtomicUsize
    }

    unsafe fn destroy(slots: *mut AtomicUsize, capacity: usize) {
        let slice = std::ptr::slice_from_raw_parts_mut(slots, capacity);
        // SAFETY: caller guarantees exclusive access to the buffer.
        unsafe {
            for slot in &*slice {
                release_key(slot.load(Ordering::Relaxed));
            }
            drop(Box::from_raw(slice));
        }
    }

    unsafe fn copy(
        &self,
        dest: *mut AtomicUsize,
        src: *mut AtomicUsize,
        dest_cap: usize,
        src_cap: usize,
    ) {
        // Rehash from scratch: probe positions depend on the capacity.
        // SAFETY: both buffers are quiescent under the resize mutex.
        unsafe {
            for i in 0..src_cap {
                let key = (*src.add(i)).load(Ordering::Relaxed);
                if key == EMPTY_KEY {
                    continue;
                }
                let mut j = self.start_index(key);
                loop {
                    j = (j + 1) & (dest_cap - 1);
                    if (*dest.add(j)).load(Ordering::Relaxed) == EMPTY_KEY {
                        break;
                    }
                }
                // The array's buffer publication orders these plain stores.
                (*dest.add(j)).store(key, Ordering::Relaxed);
            }
        }
    }
}

/// Drop hook for owned key types. Integer keys have nothing to release.
#[inline]
fn release_key(_key: usize) {}

impl ConcurrentHashSet {
    /// Create a set with the default initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(32)
    }

    /// Create a set with the given initial capacity (power of two).
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two());
        Self {
            contents: ConcurrentArray::new(capacity),
            hash: FixedState::default(),
        }
    }

    #[inline]
    fn start_index(&self, key: usize) -> usize {
        (self.hash.hash_one(key) as usize).wrapping_sub(1)
    }

    /// Insert `key`. Returns true if this call installed it, false if it was
    /// already present.
    ///
    /// `key` must not be [`EMPTY_KEY`].
    pub fn add(&self, rcu: &mut ReadGuard<'_>, key: usize) -> bool {
        assert_ne!(key, EMPTY_KEY, "the all-ones key is reserved for empty slots");
        self.contents.reserve(rcu, self, 0.75);
        let slots = self.contents.slice(rcu);
        let mask = slots.len() - 1;

        let mut i = self.start_index(key);
        loop {
            i = (i + 1) & mask;
            let current = slots[i].load(Ordering::Acquire);
            if current == key {
                self.contents.drop_reservation();
                return false;
            }
            if current != EMPTY_KEY {
                continue;
            }
            match slots[i].compare_exchange(EMPTY_KEY, key, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => return true,
                Err(now) => {
                    // Lost the slot. If the winner installed our key the add
                    // is a duplicate; any other key resumes the probe.
                    if now == key {
                        self.contents.drop_reservation();
                        return false;
                    }
                }
            }
        }
    }

    /// Whether `key` is in the set.
    ///
    /// True only if some `add(key)` has completed; concurrent inserts may or
    /// may not be visible, per-key linearisability holds either way.
    pub fn includes(&self, guard: &ReadGuard<'_>, key: usize) -> bool {
        let slots = self.contents.slice(guard);
        let mask = slots.len() - 1;

        let mut i = self.start_index(key);
        loop {
            i = (i + 1) & mask;
            let current = slots[i].load(Ordering::Relaxed);
            if current == key {
                return true;
            }
            if current == EMPTY_KEY {
                return false;
            }
        }
    }

    /// Lower bound on the number of distinct keys; exact once all writers
    /// have finished.
    #[inline]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Whether no key has been added.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current table capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.contents.capacity()
    }

    /// Iterate the keys present in the current table, in slot order.
    ///
    /// The iterator is a snapshot of the buffer and is valid for the
    /// caller's critical section only.
    pub fn iter<'g>(&'g self, guard: &'g ReadGuard<'_>) -> SetIter<'g> {
        SetIter {
            slots: self.contents.slice(guard).iter(),
        }
    }

    /// Base pointer and capacity of the current table.
    ///
    /// Valid for the duration of the caller's critical section only.
    pub fn as_raw_parts(&self, guard: &ReadGuard<'_>) -> (*const AtomicUsize, usize) {
        let slots = self.contents.slice(guard);
        (slots.as_ptr(), slots.len())
    }
}

impl Default for ConcurrentHashSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the keys of a [`ConcurrentHashSet`], skipping empty slots.
pub struct SetIter<'g> {
    slots: std::slice::Iter<'g, AtomicUsize>,
}

impl Iterator for SetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        for slot in self.slots.by_ref() {
            let key = slot.load(Ordering::Relaxed);
            if key != EMPTY_KEY {
                return Some(key);
            }
        }
        None
    }
}
