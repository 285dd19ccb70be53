//! Snapshot iterators over node-id collections.

use sedge::ReadGuard;
use sedge_table::{ConcurrentHashSet, ConcurrentList, EMPTY_KEY};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Iterator over node ids from a hash-set or list snapshot.
///
/// The iterator pins no memory of its own: it walks the buffer that was
/// current when it was created and must be drained inside the same
/// read-side critical section. Holding it across the end of the section is
/// undefined behaviour — this is the C surface's iterator object; Rust
/// callers wanting a lifetime-checked view should use
/// [`ConcurrentHashSet::iter`] instead.
///
/// Empty-slot sentinels are skipped; the C-facing
/// [`next_id`](NodeIter::next_id) reports exhaustion as -1.
pub struct NodeIter {
    cursor: *const AtomicUsize,
    remaining: usize,
}

impl NodeIter {
    /// An iterator over nothing.
    pub fn empty() -> Self {
        Self {
            cursor: ptr::null(),
            remaining: 0,
        }
    }

    /// Snapshot the slots of `set`.
    pub fn from_set(set: &ConcurrentHashSet, guard: &ReadGuard<'_>) -> Self {
        let (cursor, remaining) = set.as_raw_parts(guard);
        Self { cursor, remaining }
    }

    /// Snapshot the published entries of `list`.
    pub fn from_list(list: &ConcurrentList<usize>, guard: &ReadGuard<'_>) -> Self {
        let (entries, remaining) = list.as_raw_parts(guard);
        Self {
            // SAFETY-relevant layout: a published ListEntry<usize> is a
            // transparent usize cell, readable as a relaxed atomic word.
            cursor: entries.cast::<AtomicUsize>(),
            remaining,
        }
    }

    /// Next node id, or None when exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<usize> {
        while self.remaining > 0 {
            // SAFETY: cursor stays within the snapshot taken under the
            // caller's still-open critical section.
            let value = unsafe { (*self.cursor).load(Ordering::Relaxed) };
            self.cursor = unsafe { self.cursor.add(1) };
            self.remaining -= 1;
            if value != EMPTY_KEY {
                return Some(value);
            }
        }
        None
    }

    /// C-style advance: next node id, or -1 when exhausted.
    pub fn next_id(&mut self) -> isize {
        match self.next() {
            Some(id) => id as isize,
            None => -1,
        }
    }
}
