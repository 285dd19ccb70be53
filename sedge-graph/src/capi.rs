//! C-callable surface for the analysis pipeline.
//!
//! Every function is thread-safe. Functions taking an `rcu` handle accept
//! null, which means "use the calling thread's ambient handle"; if the
//! handle is already inside an explicit read-side section (via
//! [`rcu_read_lock`]) the call joins that section instead of opening its
//! own, so iterators can be drained under one lock:
//!
//! ```c
//! rcu_read_lock(NULL);
//! Iter *it = graph_get_callers(NULL, g, id);
//! for (ptrdiff_t id; (id = iter_next(it)) >= 0; )
//!     visit(id);
//! iter_delete(it);
//! rcu_read_unlock(NULL);
//! ```
//!
//! Strings returned by the getters are heap copies owned by the caller and
//! must be released with [`graph_string_free`] /
//! [`graph_string_array_free`] (they are Rust allocations; do not pass them
//! to `free`).

use crate::graph::Graph;
use crate::iter::NodeIter;
use sedge::{synchronize_rcu, with_ambient, RcuThread, ReadGuard};
use std::ffi::{c_char, CStr, CString};

/// Run `f` inside a read-side section on the given or ambient handle.
///
/// # Safety
///
/// `rcu`, when non-null, must point to a live `RcuThread` owned by the
/// calling thread.
unsafe fn with_reader<R>(rcu: *const RcuThread, f: impl FnOnce(&mut ReadGuard<'_>) -> R) -> R {
    if rcu.is_null() {
        with_ambient(|ambient| {
            let mut guard = ambient.enter();
            f(&mut guard)
        })
    } else {
        // SAFETY: caller contract.
        let handle = unsafe { &*rcu };
        let mut guard = handle.enter();
        f(&mut guard)
    }
}

/// # Safety
///
/// `s` must be a valid NUL-terminated string.
unsafe fn lossy(s: *const c_char) -> String {
    // SAFETY: caller contract.
    unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned()
}

fn owned_c_string(s: &str) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

fn owned_c_string_array(strings: Vec<String>, n: *mut usize) -> *mut *mut c_char {
    let raw: Vec<*mut c_char> = strings.iter().map(|s| owned_c_string(s)).collect();
    unsafe {
        *n = raw.len();
    }
    Box::into_raw(raw.into_boxed_slice()) as *mut *mut c_char
}

// ── reader handles ──────────────────────────────────────────────────

/// Create and register a reader handle for the calling thread.
///
/// The handle must only ever be used from one thread at a time.
#[no_mangle]
pub extern "C" fn rcu_thread_new() -> *mut RcuThread {
    Box::into_raw(Box::new(RcuThread::new()))
}

/// Deregister and free a handle from [`rcu_thread_new`].
///
/// # Safety
///
/// `rcu` must come from [`rcu_thread_new`] and not be used afterwards; the
/// handle must not be inside a read-side section.
#[no_mangle]
pub unsafe extern "C" fn rcu_thread_delete(rcu: *mut RcuThread) {
    if !rcu.is_null() {
        // SAFETY: caller contract.
        unsafe { drop(Box::from_raw(rcu)) };
    }
}

/// Enter a read-side critical section. Null uses the ambient handle.
/// Nested entry on one handle aborts the process.
///
/// # Safety
///
/// `rcu`, when non-null, must point to a live handle owned by this thread.
#[no_mangle]
pub unsafe extern "C" fn rcu_read_lock(rcu: *const RcuThread) {
    if rcu.is_null() {
        with_ambient(|ambient| ambient.lock());
    } else {
        // SAFETY: caller contract.
        unsafe { &*rcu }.lock();
    }
}

/// Leave the read-side critical section entered by [`rcu_read_lock`].
///
/// # Safety
///
/// Must balance a prior [`rcu_read_lock`] on the same handle and thread.
#[no_mangle]
pub unsafe extern "C" fn rcu_read_unlock(rcu: *const RcuThread) {
    if rcu.is_null() {
        with_ambient(|ambient| ambient.unlock());
    } else {
        // SAFETY: caller contract.
        unsafe { &*rcu }.unlock();
    }
}

/// Wait for all read-side critical sections in progress to end.
/// Must not be called from inside one.
#[no_mangle]
pub extern "C" fn rcu_synchronize() {
    synchronize_rcu();
}

// ── graph lifecycle ─────────────────────────────────────────────────

/// Create an empty graph.
#[no_mangle]
pub extern "C" fn graph_new() -> *mut Graph {
    Box::into_raw(Box::new(Graph::new()))
}

/// Free a graph and everything in it.
///
/// # Safety
///
/// `g` must come from [`graph_new`], with no concurrent users left and no
/// read-side section still holding pointers into it.
#[no_mangle]
pub unsafe extern "C" fn graph_delete(g: *mut Graph) {
    if !g.is_null() {
        // SAFETY: caller contract.
        unsafe { drop(Box::from_raw(g)) };
    }
}

// ── node mutation ───────────────────────────────────────────────────

/// Find or create the node named `name`; new nodes start external.
///
/// # Safety
///
/// `g` valid, `name` a valid NUL-terminated string, `rcu` per
/// [`with_reader`]'s contract.
#[no_mangle]
pub unsafe extern "C" fn graph_add_external_node(
    rcu: *const RcuThread,
    g: *const Graph,
    name: *const c_char,
) -> usize {
    // SAFETY: caller contract.
    let name = unsafe { lossy(name) };
    unsafe { with_reader(rcu, |guard| (*g).add_external_node(guard, &name)) }
}

/// Mark node `i` as defined.
///
/// # Safety
///
/// `g` valid, `i` a node id of this graph.
#[no_mangle]
pub unsafe extern "C" fn graph_set_defined(rcu: *const RcuThread, g: *const Graph, i: usize) {
    // SAFETY: caller contract.
    unsafe { with_reader(rcu, |guard| (*g).set_defined(guard, i)) }
}

/// Record a human-readable name for node `i`.
///
/// # Safety
///
/// `g` valid, `i` a node id, `username` a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn graph_set_username(
    rcu: *const RcuThread,
    g: *const Graph,
    i: usize,
    username: *const c_char,
) {
    // SAFETY: caller contract.
    let username = unsafe { lossy(username) };
    unsafe { with_reader(rcu, |guard| (*g).set_username(guard, i, &username)) }
}

/// Record where node `i` is defined. First writer wins.
///
/// # Safety
///
/// `g` valid, `i` a node id, `file` a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn graph_set_location(
    rcu: *const RcuThread,
    g: *const Graph,
    i: usize,
    file: *const c_char,
    line: isize,
) {
    // SAFETY: caller contract.
    let file = unsafe { lossy(file) };
    unsafe { with_reader(rcu, |guard| (*g).set_location(guard, i, &file, line)) }
}

/// Add an edge from `caller` to `callee`.
///
/// # Safety
///
/// `g` valid, both ids belonging to this graph.
#[no_mangle]
pub unsafe extern "C" fn graph_add_edge(
    rcu: *const RcuThread,
    g: *const Graph,
    caller: usize,
    callee: usize,
    is_call: bool,
) {
    // SAFETY: caller contract.
    unsafe { with_reader(rcu, |guard| (*g).add_edge(guard, caller, callee, is_call)) }
}

// ── queries ─────────────────────────────────────────────────────────

/// Number of nodes in the graph.
///
/// # Safety
///
/// `g` valid.
#[no_mangle]
pub unsafe extern "C" fn graph_node_count(_rcu: *const RcuThread, g: *const Graph) -> usize {
    // SAFETY: caller contract.
    unsafe { (*g).node_count() }
}

/// Canonical name of node `i`; caller owns the returned string.
///
/// # Safety
///
/// `g` valid, `i` a node id.
#[no_mangle]
pub unsafe extern "C" fn graph_name_by_index(
    rcu: *const RcuThread,
    g: *const Graph,
    i: usize,
) -> *mut c_char {
    // SAFETY: caller contract.
    unsafe { with_reader(rcu, |guard| owned_c_string((*g).node(guard, i).name())) }
}

/// Username of node `i`, or an empty string if none; caller owns the copy.
///
/// # Safety
///
/// `g` valid, `i` a node id.
#[no_mangle]
pub unsafe extern "C" fn graph_username_by_index(
    rcu: *const RcuThread,
    g: *const Graph,
    i: usize,
) -> *mut c_char {
    // SAFETY: caller contract.
    unsafe {
        with_reader(rcu, |guard| {
            owned_c_string((*g).node(guard, i).username().unwrap_or(""))
        })
    }
}

/// File of node `i` (empty if unlocated) and its line through `line`;
/// caller owns the returned string.
///
/// # Safety
///
/// `g` valid, `i` a node id, `line` a valid out-pointer.
#[no_mangle]
pub unsafe extern "C" fn graph_location_by_index(
    rcu: *const RcuThread,
    g: *const Graph,
    i: usize,
    line: *mut isize,
) -> *mut c_char {
    // SAFETY: caller contract.
    unsafe {
        with_reader(rcu, |guard| match (*g).node(guard, i).location() {
            Some((file, l)) => {
                *line = l;
                owned_c_string(file)
            }
            None => {
                *line = -1;
                owned_c_string("")
            }
        })
    }
}

/// Resolve a name or username to a node id, or -1.
///
/// # Safety
///
/// `g` valid, `name` a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn graph_get_node(
    rcu: *const RcuThread,
    g: *const Graph,
    name: *const c_char,
) -> isize {
    // SAFETY: caller contract.
    let name = unsafe { lossy(name) };
    unsafe {
        with_reader(rcu, |guard| match (*g).get_node(guard, &name) {
            Some(id) => id as isize,
            None => -1,
        })
    }
}

/// Whether node `i` is still external (declaration only).
///
/// # Safety
///
/// `g` valid, `i` a node id.
#[no_mangle]
pub unsafe extern "C" fn graph_is_node_external(
    rcu: *const RcuThread,
    g: *const Graph,
    i: usize,
) -> bool {
    // SAFETY: caller contract.
    unsafe { with_reader(rcu, |guard| (*g).node(guard, i).is_external()) }
}

/// Whether there is an edge from `src` to `dest`; `ref_ok` admits
/// reference edges to defined nodes.
///
/// # Safety
///
/// `g` valid, both ids belonging to this graph.
#[no_mangle]
pub unsafe extern "C" fn graph_has_edge(
    rcu: *const RcuThread,
    g: *const Graph,
    src: usize,
    dest: usize,
    ref_ok: bool,
) -> bool {
    // SAFETY: caller contract.
    unsafe { with_reader(rcu, |guard| (*g).has_edge(guard, src, dest, ref_ok)) }
}

/// Whether `src` calls `dest`.
///
/// # Safety
///
/// `g` valid, both ids belonging to this graph.
#[no_mangle]
pub unsafe extern "C" fn graph_has_call_edge(
    rcu: *const RcuThread,
    g: *const Graph,
    src: usize,
    dest: usize,
) -> bool {
    // SAFETY: caller contract.
    unsafe { with_reader(rcu, |guard| (*g).has_call_edge(guard, src, dest)) }
}

// ── iterators ───────────────────────────────────────────────────────

/// Iterate the callers of node `i`.
///
/// The caller must be inside a read-side critical section for the whole
/// drain and must release the iterator with [`iter_delete`].
///
/// # Safety
///
/// `g` valid, `i` a node id.
#[no_mangle]
pub unsafe extern "C" fn graph_get_callers(
    rcu: *const RcuThread,
    g: *const Graph,
    i: usize,
) -> *mut NodeIter {
    // SAFETY: caller contract.
    unsafe {
        with_reader(rcu, |guard| {
            Box::into_raw(Box::new((*g).callers_of(guard, i)))
        })
    }
}

/// Iterate the callees of node `i`. Same contract as [`graph_get_callers`].
///
/// # Safety
///
/// `g` valid, `i` a node id.
#[no_mangle]
pub unsafe extern "C" fn graph_get_callees(
    rcu: *const RcuThread,
    g: *const Graph,
    i: usize,
) -> *mut NodeIter {
    // SAFETY: caller contract.
    unsafe {
        with_reader(rcu, |guard| {
            Box::into_raw(Box::new((*g).callees_of(guard, i)))
        })
    }
}

/// Iterate the references of node `i`. Same contract as
/// [`graph_get_callers`].
///
/// # Safety
///
/// `g` valid, `i` a node id.
#[no_mangle]
pub unsafe extern "C" fn graph_get_refs(
    rcu: *const RcuThread,
    g: *const Graph,
    i: usize,
) -> *mut NodeIter {
    // SAFETY: caller contract.
    unsafe { with_reader(rcu, |guard| Box::into_raw(Box::new((*g).refs_of(guard, i)))) }
}

/// Iterate the nodes located in `file`. Same contract as
/// [`graph_get_callers`].
///
/// # Safety
///
/// `g` valid, `file` a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn graph_all_nodes_for_file(
    rcu: *const RcuThread,
    g: *const Graph,
    file: *const c_char,
) -> *mut NodeIter {
    // SAFETY: caller contract.
    let file = unsafe { lossy(file) };
    unsafe {
        with_reader(rcu, |guard| {
            Box::into_raw(Box::new((*g).nodes_for_file(guard, &file)))
        })
    }
}

/// Iterate the nodes labelled `label`. Same contract as
/// [`graph_get_callers`].
///
/// # Safety
///
/// `g` valid, `label` a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn graph_all_nodes_for_label(
    rcu: *const RcuThread,
    g: *const Graph,
    label: *const c_char,
) -> *mut NodeIter {
    // SAFETY: caller contract.
    let label = unsafe { lossy(label) };
    unsafe {
        with_reader(rcu, |guard| {
            Box::into_raw(Box::new((*g).nodes_for_label(guard, &label)))
        })
    }
}

/// Advance an iterator; returns the next node id or -1 when exhausted.
///
/// # Safety
///
/// `it` from one of the iterator constructors, drained inside the same
/// read-side critical section it was created in.
#[no_mangle]
pub unsafe extern "C" fn iter_next(it: *mut NodeIter) -> isize {
    // SAFETY: caller contract.
    unsafe { (*it).next_id() }
}

/// Release an iterator.
///
/// # Safety
///
/// `it` from one of the iterator constructors, not used afterwards.
#[no_mangle]
pub unsafe extern "C" fn iter_delete(it: *mut NodeIter) {
    if !it.is_null() {
        // SAFETY: caller contract.
        unsafe { drop(Box::from_raw(it)) };
    }
}

// ── labels ──────────────────────────────────────────────────────────

/// Attach `label` to node `i`.
///
/// # Safety
///
/// `g` valid, `i` a node id, `label` a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn graph_add_label(
    rcu: *const RcuThread,
    g: *const Graph,
    i: usize,
    label: *const c_char,
) {
    // SAFETY: caller contract.
    let label = unsafe { lossy(label) };
    unsafe { with_reader(rcu, |guard| (*g).add_label(guard, i, &label)) }
}

/// Whether node `i` carries `label`.
///
/// # Safety
///
/// `g` valid, `i` a node id, `label` a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn graph_has_label(
    rcu: *const RcuThread,
    g: *const Graph,
    i: usize,
    label: *const c_char,
) -> bool {
    // SAFETY: caller contract.
    let label = unsafe { lossy(label) };
    unsafe { with_reader(rcu, |guard| (*g).has_label(guard, i, &label)) }
}

/// Drop every label. Must not be called inside a read-side section.
///
/// # Safety
///
/// `g` valid; no reader may retain pointers into the old label map.
#[no_mangle]
pub unsafe extern "C" fn graph_reset_labels(g: *const Graph) {
    // SAFETY: caller contract.
    unsafe { (*g).reset_labels() }
}

// ── bulk string listings ────────────────────────────────────────────

/// Every file with located nodes, as a caller-owned array of strings.
///
/// # Safety
///
/// `g` valid, `n` a valid out-pointer. Release with
/// [`graph_string_array_free`].
#[no_mangle]
pub unsafe extern "C" fn graph_all_files(
    rcu: *const RcuThread,
    g: *const Graph,
    n: *mut usize,
) -> *mut *mut c_char {
    // SAFETY: caller contract.
    unsafe { with_reader(rcu, |guard| owned_c_string_array((*g).all_files(guard), n)) }
}

/// Every label in use, as a caller-owned array of strings.
///
/// # Safety
///
/// `g` valid, `n` a valid out-pointer. Release with
/// [`graph_string_array_free`].
#[no_mangle]
pub unsafe extern "C" fn graph_all_labels(
    rcu: *const RcuThread,
    g: *const Graph,
    n: *mut usize,
) -> *mut *mut c_char {
    // SAFETY: caller contract.
    unsafe { with_reader(rcu, |guard| owned_c_string_array((*g).all_labels(guard), n)) }
}

/// Release a string returned by the getters.
///
/// # Safety
///
/// `s` from this library's getters, not used afterwards.
#[no_mangle]
pub unsafe extern "C" fn graph_string_free(s: *mut c_char) {
    if !s.is_null() {
        // SAFETY: caller contract — the pointer came from CString::into_raw.
        unsafe { drop(CString::from_raw(s)) };
    }
}

/// Release an array from [`graph_all_files`] / [`graph_all_labels`].
///
/// # Safety
///
/// `arr`/`n` exactly as returned, not used afterwards.
#[no_mangle]
pub unsafe extern "C" fn graph_string_array_free(arr: *mut *mut c_char, n: usize) {
    if arr.is_null() {
        return;
    }
    // SAFETY: caller contract — the array is a boxed slice of CString raws.
    unsafe {
        let slice = std::ptr::slice_from_raw_parts_mut(arr, n);
        for &s in &*slice {
            graph_string_free(s);
        }
        drop(Box::from_raw(slice));
    }
}
