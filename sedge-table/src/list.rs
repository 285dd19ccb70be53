//! Append-only concurrent list.
//!
//! Indices are claimed through the backing array's reservation counter and
//! published through a second counter that only advances in index order:
//! a writer stores its value, then waits its turn to bump `published` past
//! its own index. `len()` therefore never covers a slot whose value store
//! has not happened-before the length read, and an index returned by `add`
//! is valid for every subsequent reader, for the list's lifetime.

use crate::array::{ConcurrentArray, Owner};
use crate::value::SlotValue;
use sedge::ReadGuard;
use std::cell::UnsafeCell;
use std::hint;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One list slot. Written once by the reserving writer, then immutable.
#[repr(transparent)]
pub struct ListEntry<T: SlotValue> {
    value: UnsafeCell<T::Repr>,
}

impl<T: SlotValue> ListEntry<T> {
    /// Raw read of the stored representation.
    ///
    /// # Safety
    ///
    /// The entry must be published (its index below the list's `len()`), or
    /// the caller must otherwise know the writer's store has completed.
    #[inline]
    pub unsafe fn value(&self) -> T::Repr {
        // SAFETY: published entries are never written again.
        unsafe { *self.value.get() }
    }
}

/// Append-only list with stable indices and in-order publication.
pub struct ConcurrentList<T: SlotValue> {
    contents: ConcurrentArray<Self>,
    /// Number of published entries; trails the reservation count while
    /// writers are mid-store.
    published: AtomicUsize,
}

// SAFETY: entries are written once before publication and read-only after;
// the publication counter carries the release/acquire edge.
unsafe impl<T: SlotValue + Send> Send for ConcurrentList<T> {}
unsafe impl<T: SlotValue + Send + Sync> Sync for ConcurrentList<T> {}

unsafe impl<T: SlotValue> Owner for ConcurrentList<T> {
    type Slot = ListEntry<T>;

    fn alloc(capacity: usize) -> *mut ListEntry<T> {
        let mut slots: Vec<ListEntry<T>> = Vec::with_capacity(capacity);
        slots.extend((0..capacity).map(|_| ListEntry {
            value: UnsafeCell::new(T::empty()),
        }));
        Box::into_raw(slots.into_boxed_slice()) as *mut ListEntry<T>
    }

    unsafe fn destroy(slots: *mut ListEntry<T>, capacity: usize) {
        let slice = std::ptr::slice_from_raw_parts_mut(slots, capacity);
        // SAFETY: caller guarantees exclusive access; every repr is either
        // a live value or empty, and drop_repr accepts both.
        unsafe {
            for entry in &*slice {
                T::drop_repr(*entry.value.get());
            }
            drop(Box::from_raw(slice));
        }
    }

    unsafe fn copy(
        &self,
        dest: *mut ListEntry<T>,
        src: *mut ListEntry<T>,
        _dest_cap: usize,
        src_cap: usize,
    ) {
        // SAFETY: both buffers are quiescent under the resize mutex; moving
        // the repr and emptying the source keeps single ownership.
        unsafe {
            for i in 0..src_cap {
                let from = (*src.add(i)).value.get();
                *(*dest.add(i)).value.get() = *from;
                *from = T::empty();
            }
        }
    }
}

impl<T: SlotValue> ConcurrentList<T> {
    /// Create a list with the default initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(32)
    }

    /// Create a list with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            contents: ConcurrentArray::new(capacity),
            published: AtomicUsize::new(0),
        }
    }

    /// Append `value`, returning its index.
    ///
    /// The index is stable for the list's lifetime. On return the entry is
    /// published: `len() > index` for every subsequent observer.
    pub fn add(&self, rcu: &mut ReadGuard<'_>, value: T) -> usize {
        let i = self.contents.reserve(rcu, self, 1.0);
        let entry = self.contents.get(i, rcu);
        // SAFETY: index i is reserved to us and unpublished; nobody else
        // touches the slot until `published` passes it.
        unsafe {
            *entry.value.get() = value.into_repr();
        }
        // Publish in claim order; predecessors finish their stores in
        // bounded time, they are past their own reserve.
        while self
            .published
            .compare_exchange_weak(i, i + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
        i
    }

    /// Read the entry at `i`.
    pub fn get(&self, i: usize, guard: &ReadGuard<'_>) -> T::Repr {
        debug_assert!(i < self.len());
        let entry = self.contents.get(i, guard);
        // SAFETY: i is below the published length, so the store happened
        // before the acquire in len() / the caller's index source.
        unsafe { entry.value() }
    }

    /// Number of published entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.published.load(Ordering::Acquire)
    }

    /// Whether nothing has been published yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current capacity of the backing buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.contents.capacity()
    }

    /// Iterate the published entries in insertion order.
    pub fn iter<'g>(&'g self, guard: &'g ReadGuard<'_>) -> impl Iterator<Item = T::Repr> + 'g {
        (0..self.len()).map(move |i| self.get(i, guard))
    }

    /// Base pointer and published length of the current buffer.
    ///
    /// Valid for the duration of the caller's critical section only.
    pub fn as_raw_parts(&self, guard: &ReadGuard<'_>) -> (*const ListEntry<T>, usize) {
        let len = self.len();
        let entry = self.contents.get(0, guard);
        (entry as *const ListEntry<T>, len)
    }
}

impl<T: SlotValue> Default for ConcurrentList<T> {
    fn default() -> Self {
        Self::new()
    }
}
