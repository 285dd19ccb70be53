//! Sedge: user-space quiescent-state RCU for read-biased data structures.
//!
//! Readers enter a critical section on a per-thread handle and pay no atomic
//! read-modify-write on either entry or exit. Writers that retire memory call
//! [`synchronize_rcu`], which blocks until every critical section that was in
//! progress at the call has ended, after which the retired memory cannot be
//! reached by anyone.
//!
//! # Example
//!
//! ```rust
//! use sedge::{RcuCell, RcuThread, synchronize_rcu};
//!
//! let rcu = RcuThread::new();
//! let cell = RcuCell::new(Box::into_raw(Box::new(41)));
//!
//! {
//!     let guard = rcu.read_lock();
//!     let shared = cell.load(&guard);
//!     // Valid until the guard drops, even if a writer swaps concurrently.
//!     assert_eq!(unsafe { *shared.deref() }, 41);
//! }
//!
//! // Writer side: swap and free the old value after a grace period.
//! cell.swap_and_reclaim(Box::into_raw(Box::new(42)), |old| unsafe {
//!     drop(Box::from_raw(old));
//! });
//! # let guard = rcu.read_lock();
//! # assert_eq!(unsafe { *cell.load(&guard).deref() }, 42);
//! # drop(guard);
//! # cell.swap_and_reclaim(core::ptr::null_mut(), |old| unsafe { drop(Box::from_raw(old)) });
//! ```
//!
//! # Non-goals
//!
//! There is no reclamation thread and no timeout: a reader that never leaves
//! its critical section blocks writers forever, and that is a bug in the
//! caller, not a condition this crate recovers from.

#![warn(missing_docs)]

mod cell;
mod rcu;
mod sync;

pub use cell::{RcuCell, Shared};
pub use rcu::{synchronize_rcu, with_ambient, RcuThread, ReadGuard};
