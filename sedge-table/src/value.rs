//! Mapping between owned values and the `Copy` representation stored in a
//! container slot.
//!
//! Slots are read concurrently while the buffer they live in may be retired,
//! so whatever sits in a slot must be a plain copyable word: either the value
//! itself (`usize`) or a pointer to a heap payload whose address survives
//! buffer swaps (`Box<T>`).

/// An owned value that can be stored inline in a container slot.
pub trait SlotValue: Sized {
    /// The word actually stored in the slot.
    type Repr: Copy;

    /// Representation of an untouched slot.
    fn empty() -> Self::Repr;

    /// Representation of a default-constructed payload, for
    /// get-or-insert-default operations.
    fn fresh() -> Self::Repr;

    /// Consume the owned value into its slot representation.
    fn into_repr(self) -> Self::Repr;

    /// Release whatever `repr` owns. Must accept [`empty`](SlotValue::empty).
    ///
    /// # Safety
    ///
    /// `repr` must have come from `into_repr`/`fresh`/`empty` of this impl
    /// and must not be used (or dropped again) afterwards.
    unsafe fn drop_repr(repr: Self::Repr);
}

impl SlotValue for usize {
    type Repr = usize;

    #[inline]
    fn empty() -> usize {
        0
    }

    #[inline]
    fn fresh() -> usize {
        0
    }

    #[inline]
    fn into_repr(self) -> usize {
        self
    }

    #[inline]
    unsafe fn drop_repr(_repr: usize) {}
}

impl<T: Default> SlotValue for Box<T> {
    type Repr = *mut T;

    #[inline]
    fn empty() -> *mut T {
        std::ptr::null_mut()
    }

    #[inline]
    fn fresh() -> *mut T {
        Box::into_raw(Box::new(T::default()))
    }

    #[inline]
    fn into_repr(self) -> *mut T {
        Box::into_raw(self)
    }

    #[inline]
    unsafe fn drop_repr(repr: *mut T) {
        if !repr.is_null() {
            // SAFETY: non-null reprs come from Box::into_raw and are dropped
            // at most once per the trait contract.
            unsafe { drop(Box::from_raw(repr)) };
        }
    }
}
