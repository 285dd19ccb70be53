//! Read-biased concurrent containers built on a shared RCU-protected,
//! geometrically-resizing backing array.
//!
//! Three containers share one growth machine:
//!
//! - [`ConcurrentList`]: append-only list with stable indices
//! - [`ConcurrentHashSet`]: open-addressing set of `usize` keys
//! - [`ConcurrentStringMap`]: open-addressing map keyed by owned strings
//!
//! All of them are grow-only within one logical dataset — there is no
//! per-entry deletion. Writers reserve slots with a CAS on a shared count;
//! when a container fills past its load factor, one writer doubles the
//! backing buffer under a mutex while readers keep using the old buffer
//! until a grace period retires it. Readers never block.
//!
//! Every operation takes a [`ReadGuard`](sedge::ReadGuard): reads borrow it,
//! mutations take it `&mut` because growth must briefly leave the critical
//! section to wait out the resize grace period.

#![warn(missing_docs)]

mod array;
mod list;
mod map;
mod set;
mod value;

pub use array::{ConcurrentArray, Owner};
pub use list::{ConcurrentList, ListEntry};
pub use map::{ConcurrentStringMap, MapEntry};
pub use set::{ConcurrentHashSet, SetIter, EMPTY_KEY};
pub use value::SlotValue;
