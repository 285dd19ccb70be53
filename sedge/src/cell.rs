//! RCU-protected pointer cell.
//!
//! A single logical owner publishes replacement pointers; any number of
//! readers load the current pointer inside a critical section. Freeing an
//! old pointee is always preceded by a grace period, so a reader can keep
//! dereferencing whatever it loaded until its guard drops.

use crate::rcu::{synchronize_rcu, ReadGuard};
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// An atomic pointer published with release ordering and read under a guard.
///
/// The cell itself does not own the pointee; the owner decides when to
/// replace and reclaim via [`swap_and_reclaim`](RcuCell::swap_and_reclaim)
/// or an explicit store + [`synchronize_rcu`] sequence.
pub struct RcuCell<T> {
    ptr: AtomicPtr<T>,
}

// SAFETY: the cell hands out raw pointers; whether the pointee may be shared
// across threads is the owner's contract.
unsafe impl<T: Send + Sync> Send for RcuCell<T> {}
unsafe impl<T: Send + Sync> Sync for RcuCell<T> {}

impl<T> RcuCell<T> {
    /// Create a cell holding `ptr`.
    #[inline]
    pub fn new(ptr: *mut T) -> Self {
        Self {
            ptr: AtomicPtr::new(ptr),
        }
    }

    /// Create a null cell.
    #[inline]
    pub fn null() -> Self {
        Self::new(ptr::null_mut())
    }

    /// Load the current pointer inside a critical section.
    ///
    /// The pointee's publication stores happen-before this load (the store
    /// side uses release). Consume ordering would suffice; Rust offers
    /// acquire, which is stronger.
    #[inline]
    pub fn load<'g>(&self, _guard: &'g ReadGuard<'_>) -> Shared<'g, T> {
        Shared {
            ptr: self.ptr.load(Ordering::Acquire),
            _marker: PhantomData,
        }
    }

    /// Load the current pointer as the owning writer.
    ///
    /// Relaxed: the owner is the only thread that stores, so it already
    /// knows the latest value it published.
    #[inline]
    pub fn load_owner(&self) -> *mut T {
        self.ptr.load(Ordering::Relaxed)
    }

    /// Publish a new pointer with release ordering.
    ///
    /// The previous pointee stays reachable by readers; the caller must run
    /// a grace period before freeing it.
    #[inline]
    pub fn store(&self, new: *mut T) {
        self.ptr.store(new, Ordering::Release);
    }

    /// Publish `new`, wait one grace period, then hand the old pointer to
    /// `reclaim`.
    ///
    /// Must not be called inside a critical section on the same thread (the
    /// grace period would wait on the caller's own section).
    pub fn swap_and_reclaim(&self, new: *mut T, reclaim: impl FnOnce(*mut T)) {
        let old = self.ptr.swap(new, Ordering::AcqRel);
        synchronize_rcu();
        reclaim(old);
    }
}

/// A pointer loaded from an [`RcuCell`], valid while the guard lives.
pub struct Shared<'g, T> {
    ptr: *mut T,
    _marker: PhantomData<&'g ReadGuard<'g>>,
}

impl<'g, T> Shared<'g, T> {
    /// The raw pointer.
    #[inline]
    pub fn as_raw(&self) -> *mut T {
        self.ptr
    }

    /// Whether the pointer is null.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Dereference without a null check.
    ///
    /// # Safety
    ///
    /// The pointer must be non-null and the pointee must have been published
    /// through the cell (so its initialisation happens-before the load).
    #[inline]
    pub unsafe fn deref(&self) -> &'g T {
        // SAFETY: caller guarantees non-null and publication.
        unsafe { &*self.ptr }
    }

    /// Convert to an optional reference.
    ///
    /// # Safety
    ///
    /// Same contract as [`deref`](Shared::deref), minus the null check.
    #[inline]
    pub unsafe fn as_ref(&self) -> Option<&'g T> {
        if self.is_null() {
            None
        } else {
            // SAFETY: checked non-null; caller guarantees publication.
            unsafe { Some(&*self.ptr) }
        }
    }
}

impl<T> Clone for Shared<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Shared<'_, T> {}

impl<T> core::fmt::Debug for Shared<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Shared({:p})", self.ptr)
    }
}
