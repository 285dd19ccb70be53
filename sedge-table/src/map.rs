//! Open-addressing concurrent map keyed by owned strings.
//!
//! Each slot's key pointer has three states: null (empty), a reserved
//! all-ones tag (claimed, value not yet written), or a real pointer to an
//! immutable heap string. Inserters claim a slot by CASing the key from
//! null to the tag, write the value with plain stores, then publish the
//! real key with release. Readers load keys with acquire, so a published
//! key guarantees the value it gates.

use crate::array::{ConcurrentArray, Owner};
use crate::value::SlotValue;
use foldhash::fast::FixedState;
use sedge::ReadGuard;
use std::cell::UnsafeCell;
use std::hash::BuildHasher;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Claimed-but-unpublished key tag. Never dereferenced.
#[inline]
fn pending() -> *mut String {
    usize::MAX as *mut String
}

/// Exponential backoff for the claim-resolution spin.
struct Backoff {
    step: u32,
}

impl Backoff {
    #[inline]
    fn new() -> Self {
        Self { step: 0 }
    }

    #[inline]
    fn spin(&mut self) {
        for _ in 0..(1 << self.step.min(6)) {
            std::hint::spin_loop();
        }
        if self.step <= 6 {
            self.step += 1;
        }
    }
}

/// One map slot: key pointer plus the value it publishes.
pub struct MapEntry<V: SlotValue> {
    key: AtomicPtr<String>,
    value: UnsafeCell<V::Repr>,
}

impl<V: SlotValue> MapEntry<V> {
    /// The published value of this entry.
    ///
    /// # Safety
    ///
    /// The caller must have observed a real (non-null, non-pending) key in
    /// this entry with acquire ordering.
    #[inline]
    pub unsafe fn value(&self) -> V::Repr {
        // SAFETY: the key's release store ordered the value write before it.
        unsafe { *self.value.get() }
    }
}

/// Concurrent grow-only map from strings to [`SlotValue`] payloads.
pub struct ConcurrentStringMap<V: SlotValue> {
    contents: ConcurrentArray<Self>,
    hash: FixedState,
}

// SAFETY: entry values are written only by the slot's claimant before the
// key publishes, and read only after an acquire load of a published key.
unsafe impl<V: SlotValue + Send> Send for ConcurrentStringMap<V> {}
unsafe impl<V: SlotValue + Send + Sync> Sync for ConcurrentStringMap<V> {}

unsafe impl<V: SlotValue> Owner for ConcurrentStringMap<V> {
    type Slot = MapEntry<V>;

    fn alloc(capacity: usize) -> *mut MapEntry<V> {
        let mut slots: Vec<MapEntry<V>> = Vec::with_capacity(capacity);
        slots.extend((0..capacity).map(|_| MapEntry {
            key: AtomicPtr::new(ptr::null_mut()),
            value: UnsafeCell::new(V::empty()),
        }));
        Box::into_raw(slots.into_boxed_slice()) as *mut MapEntry<V>
    }

    unsafe fn destroy(slots: *mut MapEntry<V>, capacity: usize) {
        let slice = std::ptr::slice_from_raw_parts_mut(slots, capacity);
        // SAFETY: caller guarantees exclusive access; occupied entries own
        // their key string and value payload.
        unsafe {
            for entry in &*slice {
                let key = entry.key.load(Ordering::Relaxed);
                if !key.is_null() && key != pending() {
                    drop(Box::from_raw(key));
                }
                V::drop_repr(*entry.value.get());
            }
            drop(Box::from_raw(slice));
        }
    }

    unsafe fn copy(
        &self,
        dest: *mut MapEntry<V>,
        src: *mut MapEntry<V>,
        dest_cap: usize,
        src_cap: usize,
    ) {
        // SAFETY: both buffers are quiescent under the resize mutex; the
        // pre-copy grace period rules out claimed-but-unpublished entries.
        unsafe {
            for i in 0..src_cap {
                let from = &*src.add(i);
                let key = from.key.load(Ordering::Relaxed);
                if key.is_null() {
                    continue;
                }
                debug_assert!(key != pending(), "claim survived the resize grace period");

                let mut j = (self.hash.hash_one((*key).as_str()) as usize).wrapping_sub(1);
                loop {
                    j = (j + 1) & (dest_cap - 1);
                    if (*dest.add(j)).key.load(Ordering::Relaxed).is_null() {
                        break;
                    }
                }
                let to = &*dest.add(j);
                *to.value.get() = *from.value.get();
                // The array's buffer publication orders these plain stores.
                to.key.store(key, Ordering::Relaxed);
                from.key.store(ptr::null_mut(), Ordering::Relaxed);
                *from.value.get() = V::empty();
            }
        }
    }
}

impl<V: SlotValue> ConcurrentStringMap<V> {
    /// Create a map with the default initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(32)
    }

    /// Create a map with the given initial capacity (power of two).
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two());
        Self {
            contents: ConcurrentArray::new(capacity),
            hash: FixedState::default(),
        }
    }

    #[inline]
    fn start_index(&self, key: &str) -> usize {
        (self.hash.hash_one(key) as usize).wrapping_sub(1)
    }

    /// Claim or find the entry for `key`.
    ///
    /// Returns the entry and whether this caller is the inserter. An
    /// inserting caller owns a pending claim and must publish it; a finding
    /// caller's reservation has already been given back.
    fn acquire<'g>(&'g self, rcu: &'g mut ReadGuard<'_>, key: &str) -> (&'g MapEntry<V>, bool) {
        self.contents.reserve(rcu, self, 0.75);
        let slots = self.contents.slice(rcu);
        let mask = slots.len() - 1;

        let mut i = self.start_index(key);
        loop {
            i = (i + 1) & mask;
            'slot: loop {
                let mut this_key = slots[i].key.load(Ordering::Acquire);

                // A claim in progress will resolve to a real key; wait it
                // out, then recheck.
                let mut backoff = Backoff::new();
                while this_key == pending() {
                    backoff.spin();
                    this_key = slots[i].key.load(Ordering::Acquire);
                }

                if this_key.is_null() {
                    match slots[i].key.compare_exchange(
                        ptr::null_mut(),
                        pending(),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => return (&slots[i], true),
                        // Lost the claim; restart from this index.
                        Err(_) => continue 'slot,
                    }
                }

                // SAFETY: real keys are immutable strings owned by the entry.
                if unsafe { (*this_key).as_str() == key } {
                    self.contents.drop_reservation();
                    return (&slots[i], false);
                }

                // Mismatched real key: keep probing.
                break 'slot;
            }
        }
    }

    /// Publish `repr` under a freshly-allocated copy of `key`.
    ///
    /// Value first, then key with release — the publication order readers
    /// rely on.
    fn publish(&self, entry: &MapEntry<V>, key: &str, repr: V::Repr) {
        // SAFETY: we hold the slot's pending claim; nobody else writes it
        // and nobody reads the value until the key publishes.
        unsafe {
            *entry.value.get() = repr;
        }
        entry
            .key
            .store(Box::into_raw(Box::new(key.to_owned())), Ordering::Release);
    }

    /// Look up `key`, inserting a default-constructed value if absent.
    pub fn get_or_insert_default(&self, rcu: &mut ReadGuard<'_>, key: &str) -> V::Repr {
        let (entry, inserter) = self.acquire(rcu, key);
        if inserter {
            let repr = V::fresh();
            self.publish(entry, key, repr);
            repr
        } else {
            // SAFETY: acquire observed this entry's published key.
            unsafe { entry.value() }
        }
    }

    /// Look up `key`, inserting `value` if absent.
    ///
    /// If the key is already present the existing value is returned and
    /// `value` is dropped.
    pub fn insert_if_absent(&self, rcu: &mut ReadGuard<'_>, key: &str, value: V) -> V::Repr {
        let (entry, inserter) = self.acquire(rcu, key);
        if inserter {
            let repr = value.into_repr();
            self.publish(entry, key, repr);
            repr
        } else {
            // SAFETY: acquire observed this entry's published key.
            unsafe { entry.value() }
        }
    }

    fn lookup(&self, guard: &ReadGuard<'_>, key: &str) -> Option<V::Repr> {
        let slots = self.contents.slice(guard);
        let mask = slots.len() - 1;

        let mut i = self.start_index(key);
        loop {
            i = (i + 1) & mask;
            let this_key = slots[i].key.load(Ordering::Acquire);
            if this_key.is_null() {
                return None;
            }
            // A claimed slot is not published; it cannot be our key, and our
            // key may still live further along the probe chain.
            if this_key == pending() {
                continue;
            }
            // SAFETY: real keys are immutable strings owned by the entry.
            if unsafe { (*this_key).as_str() == key } {
                // SAFETY: published key observed with acquire just above.
                return Some(unsafe { slots[i].value() });
            }
        }
    }

    /// Look up `key`, which must be present.
    pub fn get(&self, guard: &ReadGuard<'_>, key: &str) -> V::Repr {
        match self.lookup(guard, key) {
            Some(repr) => repr,
            None => panic!("key {key:?} not present"),
        }
    }

    /// Look up `key`, returning `absent` if it has not been published.
    pub fn get_or(&self, guard: &ReadGuard<'_>, key: &str, absent: V::Repr) -> V::Repr {
        self.lookup(guard, key).unwrap_or(absent)
    }

    /// Lower bound on the number of distinct keys; exact once all writers
    /// have finished.
    #[inline]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Whether nothing has been inserted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current table capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.contents.capacity()
    }

    /// Iterate published `(key, value)` pairs in slot order.
    ///
    /// Claimed-but-unpublished slots are skipped. The borrowed keys are
    /// valid for the caller's critical section.
    pub fn entries<'g>(
        &'g self,
        guard: &'g ReadGuard<'_>,
    ) -> impl Iterator<Item = (&'g str, V::Repr)> + 'g {
        self.contents.slice(guard).iter().filter_map(|entry| {
            let key = entry.key.load(Ordering::Acquire);
            if key.is_null() || key == pending() {
                return None;
            }
            // SAFETY: published key observed with acquire; the string and
            // the value it gates are immutable for the buffer's lifetime.
            unsafe { Some(((*key).as_str(), entry.value())) }
        })
    }

    /// Iterate the published keys in slot order.
    pub fn keys<'g>(&'g self, guard: &'g ReadGuard<'_>) -> impl Iterator<Item = &'g str> + 'g {
        self.entries(guard).map(|(key, _)| key)
    }
}

impl<V: SlotValue> Default for ConcurrentStringMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
