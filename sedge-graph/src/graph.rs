//! Graph model: nodes, edges, indexes, labels.

use crate::iter::NodeIter;
use parking_lot::Mutex;
use sedge::{RcuCell, ReadGuard};
use sedge_table::{ConcurrentHashSet, ConcurrentList, ConcurrentStringMap};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicPtr, Ordering};

/// Index of a node in the graph's node list. Stable for the graph's
/// lifetime.
pub type NodeId = usize;

/// Absent marker inside the usize-valued name indexes.
const NOT_FOUND: usize = usize::MAX;

/// One function in the call graph.
///
/// The name is fixed at creation. Username and location are published
/// atomically and never freed before the graph is — accessors hand out
/// references bound to the graph's lifetime, not the read section's.
pub struct Node {
    name: Box<str>,
    username: AtomicPtr<String>,
    file: AtomicPtr<String>,
    /// Meaningful once `file` is published; -1 before.
    line: AtomicIsize,
    /// True until the definition is seen; declarations stay external.
    external: AtomicBool,
    callers: ConcurrentHashSet,
    calls: ConcurrentHashSet,
    refs: ConcurrentHashSet,
}

impl Node {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            username: AtomicPtr::new(ptr::null_mut()),
            file: AtomicPtr::new(ptr::null_mut()),
            line: AtomicIsize::new(-1),
            external: AtomicBool::new(true),
            callers: ConcurrentHashSet::new(),
            calls: ConcurrentHashSet::new(),
            refs: ConcurrentHashSet::new(),
        }
    }

    /// Canonical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable alternate name, if one was recorded.
    pub fn username(&self) -> Option<&str> {
        let p = self.username.load(Ordering::Acquire);
        // SAFETY: published usernames stay allocated until the graph drops
        // (replaced ones are stashed, not freed).
        unsafe { p.as_ref().map(|s| s.as_str()) }
    }

    /// File and line of the definition, if located.
    pub fn location(&self) -> Option<(&str, isize)> {
        let p = self.file.load(Ordering::Acquire);
        // SAFETY: a published file string is immutable and graph-owned.
        unsafe { p.as_ref() }.map(|s| (s.as_str(), self.line.load(Ordering::Relaxed)))
    }

    /// Whether the node is still only a declaration.
    pub fn is_external(&self) -> bool {
        self.external.load(Ordering::Acquire)
    }

    /// Nodes that call or reference this one.
    pub fn callers(&self) -> &ConcurrentHashSet {
        &self.callers
    }

    /// Nodes this one calls.
    pub fn calls(&self) -> &ConcurrentHashSet {
        &self.calls
    }

    /// Nodes this one references without calling.
    pub fn refs(&self) -> &ConcurrentHashSet {
        &self.refs
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new("")
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let username = self.username.load(Ordering::Relaxed);
        if !username.is_null() {
            // SAFETY: &mut self — no readers left.
            unsafe { drop(Box::from_raw(username)) };
        }
        let file = self.file.load(Ordering::Relaxed);
        if !file.is_null() {
            // SAFETY: as above.
            unsafe { drop(Box::from_raw(file)) };
        }
    }
}

type LabelMap = ConcurrentStringMap<Box<ConcurrentHashSet>>;

/// A shared, growable function-call graph.
///
/// All operations are thread-safe. Mutators take `&mut ReadGuard` because
/// container growth must briefly leave the critical section; queries borrow
/// the guard. [`reset_labels`](Graph::reset_labels) is the one operation
/// that must be called *outside* any read-side section.
pub struct Graph {
    nodes_by_index: ConcurrentList<Box<Node>>,
    nodes: ConcurrentStringMap<usize>,
    nodes_by_username: ConcurrentStringMap<usize>,
    nodes_by_file: ConcurrentStringMap<Box<ConcurrentList<usize>>>,
    node_labels: RcuCell<LabelMap>,
    /// Strings displaced by username rewrites; racing readers may still hold
    /// them, so they are reclaimed with the graph like orphan nodes.
    displaced: Mutex<Vec<Box<String>>>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        tracing::debug!("new call graph");
        Self {
            nodes_by_index: ConcurrentList::new(),
            nodes: ConcurrentStringMap::new(),
            nodes_by_username: ConcurrentStringMap::new(),
            nodes_by_file: ConcurrentStringMap::new(),
            node_labels: RcuCell::new(Box::into_raw(Box::new(LabelMap::new()))),
            displaced: Mutex::new(Vec::new()),
        }
    }

    /// Number of nodes, orphans included.
    pub fn node_count(&self) -> usize {
        self.nodes_by_index.len()
    }

    /// Borrow the node at `id`.
    ///
    /// The reference is bound to the graph, not the guard: node storage is
    /// never freed before the graph is.
    pub fn node<'a>(&'a self, guard: &ReadGuard<'_>, id: NodeId) -> &'a Node {
        assert!(id < self.nodes_by_index.len(), "node id out of range");
        let p = self.nodes_by_index.get(id, guard);
        // SAFETY: published list entries hold owned boxes that live until
        // the graph drops; `p` was read inside the guard's section.
        unsafe { &*p }
    }

    /// Find or create the node for `name`, initially external.
    ///
    /// Idempotent by name and username. Two racing creators may both append
    /// a node; the name-index loser's node stays in the list, reachable only
    /// by index, and is reclaimed with the graph.
    pub fn add_external_node(&self, rcu: &mut ReadGuard<'_>, name: &str) -> NodeId {
        let id = self.nodes_by_username.get_or(rcu, name, NOT_FOUND);
        if id != NOT_FOUND {
            return id;
        }
        let id = self.nodes.get_or(rcu, name, NOT_FOUND);
        if id != NOT_FOUND {
            return id;
        }

        // Install in the list before publishing the id in any index.
        let id = self.nodes_by_index.add(rcu, Box::new(Node::new(name)));
        let winner = self.nodes.insert_if_absent(rcu, name, id);
        if winner == id {
            tracing::trace!(name, id, "node created");
        }
        winner
    }

    /// Mark the node as defined (no longer external).
    pub fn set_defined(&self, guard: &ReadGuard<'_>, id: NodeId) {
        self.node(guard, id).external.store(false, Ordering::Release);
    }

    /// Record a human-readable name for the node.
    ///
    /// Ignored if the same username is already recorded. Before a location
    /// is set the username may be rewritten; afterwards a different value is
    /// a programming error.
    pub fn set_username(&self, rcu: &mut ReadGuard<'_>, id: NodeId, username: &str) {
        let node = self.node(rcu, id);
        let current = node.username.load(Ordering::Acquire);
        // SAFETY: published usernames are immutable, graph-owned strings.
        if !current.is_null() && unsafe { (*current).as_str() == username } {
            return;
        }

        if !node.file.load(Ordering::Acquire).is_null() {
            assert!(
                !current.is_null() && unsafe { (*current).as_str() == username },
                "conflicting username {username:?} for a located node"
            );
            return;
        }

        let fresh = Box::into_raw(Box::new(username.to_owned()));
        let old = node.username.swap(fresh, Ordering::AcqRel);
        if !old.is_null() {
            // SAFETY: we took sole ownership with the swap; readers may
            // still hold the pointer, so stash rather than free.
            self.displaced.lock().push(unsafe { Box::from_raw(old) });
        }
        self.nodes_by_username.insert_if_absent(rcu, username, id);
    }

    /// Record where the node is defined. First writer wins; later calls are
    /// silently discarded.
    pub fn set_location(&self, rcu: &mut ReadGuard<'_>, id: NodeId, file: &str, line: isize) {
        let node = self.node(rcu, id);
        if !node.file.load(Ordering::Acquire).is_null() {
            return;
        }

        // Line first: the file pointer's release publishes it.
        node.line.store(line, Ordering::Relaxed);
        let fresh = Box::into_raw(Box::new(file.to_owned()));
        if node
            .file
            .compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Another writer located the node in between.
            // SAFETY: `fresh` was never published.
            unsafe { drop(Box::from_raw(fresh)) };
            return;
        }

        let per_file = self.nodes_by_file.get_or_insert_default(rcu, file);
        // SAFETY: the payload list lives as long as its map, i.e. the graph.
        unsafe { &*per_file }.add(rcu, id);
    }

    /// Add an edge. `callers` always records the caller; `is_call` decides
    /// between the `calls` and `refs` sets. Self-edges and duplicates are
    /// fine.
    pub fn add_edge(&self, rcu: &mut ReadGuard<'_>, caller: NodeId, callee: NodeId, is_call: bool) {
        self.node(rcu, callee).callers.add(rcu, caller);
        let caller_node = self.node(rcu, caller);
        if is_call {
            caller_node.calls.add(rcu, callee);
        } else {
            caller_node.refs.add(rcu, callee);
        }
    }

    /// Resolve `name` against the username index, then the name index.
    pub fn get_node(&self, guard: &ReadGuard<'_>, name: &str) -> Option<NodeId> {
        let id = self.nodes_by_username.get_or(guard, name, NOT_FOUND);
        if id != NOT_FOUND {
            return Some(id);
        }
        let id = self.nodes.get_or(guard, name, NOT_FOUND);
        (id != NOT_FOUND).then_some(id)
    }

    /// Whether there is an edge from `src` to `dest`.
    ///
    /// True iff `dest ∈ calls(src)`, or `ref_ok` and `dest` is defined and
    /// `dest ∈ refs(src)`. The defined-ness guard keeps references to mere
    /// declarations from counting as edges.
    pub fn has_edge(&self, guard: &ReadGuard<'_>, src: NodeId, dest: NodeId, ref_ok: bool) -> bool {
        if self.node(guard, src).calls.includes(guard, dest) {
            return true;
        }
        if self.node(guard, dest).is_external() {
            return false;
        }
        ref_ok && self.node(guard, src).refs.includes(guard, dest)
    }

    /// Whether `src` calls `dest` (references do not count).
    pub fn has_call_edge(&self, guard: &ReadGuard<'_>, src: NodeId, dest: NodeId) -> bool {
        self.node(guard, src).calls.includes(guard, dest)
    }

    /// Attach `label` to the node, creating the label on demand.
    pub fn add_label(&self, rcu: &mut ReadGuard<'_>, id: NodeId, label: &str) {
        assert!(id < self.nodes_by_index.len(), "node id out of range");
        let labels = self.node_labels.load(rcu).as_raw();
        // SAFETY: the label map swapped out by reset_labels is only freed
        // after a grace period, so it outlives this critical section.
        let set = unsafe { (*labels).get_or_insert_default(rcu, label) };
        // SAFETY: label payloads live as long as their map.
        unsafe { &*set }.add(rcu, id);
    }

    /// Whether the node carries `label`.
    pub fn has_label(&self, guard: &ReadGuard<'_>, id: NodeId, label: &str) -> bool {
        // SAFETY: see add_label on the label map's lifetime.
        let labels = unsafe { self.node_labels.load(guard).deref() };
        let set = labels.get_or(guard, label, ptr::null_mut());
        // SAFETY: non-null payloads live as long as their map.
        !set.is_null() && unsafe { &*set }.includes(guard, id)
    }

    /// Drop every label.
    ///
    /// The only bulk-destructive operation: the label map is swapped for an
    /// empty one and the old map freed after a grace period. Must not be
    /// called inside a read-side critical section, and no pointer into the
    /// old label map may be held across this call.
    pub fn reset_labels(&self) {
        tracing::debug!("label map reset");
        let fresh = Box::into_raw(Box::new(LabelMap::new()));
        self.node_labels.swap_and_reclaim(fresh, |old| {
            // SAFETY: the grace period flushed every reader of the old map.
            unsafe { drop(Box::from_raw(old)) };
        });
    }

    /// Iterate the callers of `id`. Drain within the current section.
    pub fn callers_of(&self, guard: &ReadGuard<'_>, id: NodeId) -> NodeIter {
        NodeIter::from_set(self.node(guard, id).callers(), guard)
    }

    /// Iterate the callees of `id`. Drain within the current section.
    pub fn callees_of(&self, guard: &ReadGuard<'_>, id: NodeId) -> NodeIter {
        NodeIter::from_set(self.node(guard, id).calls(), guard)
    }

    /// Iterate the references of `id`. Drain within the current section.
    pub fn refs_of(&self, guard: &ReadGuard<'_>, id: NodeId) -> NodeIter {
        NodeIter::from_set(self.node(guard, id).refs(), guard)
    }

    /// Iterate the nodes located in `file`. Drain within the current section.
    pub fn nodes_for_file(&self, guard: &ReadGuard<'_>, file: &str) -> NodeIter {
        let list = self.nodes_by_file.get_or(guard, file, ptr::null_mut());
        if list.is_null() {
            return NodeIter::empty();
        }
        // SAFETY: per-file lists live as long as the graph.
        NodeIter::from_list(unsafe { &*list }, guard)
    }

    /// Iterate the nodes labelled `label`. Drain within the current section.
    pub fn nodes_for_label(&self, guard: &ReadGuard<'_>, label: &str) -> NodeIter {
        // SAFETY: see add_label on the label map's lifetime.
        let labels = unsafe { self.node_labels.load(guard).deref() };
        let set = labels.get_or(guard, label, ptr::null_mut());
        if set.is_null() {
            return NodeIter::empty();
        }
        // SAFETY: label payloads live as long as their map.
        NodeIter::from_set(unsafe { &*set }, guard)
    }

    /// Every file with at least one located node.
    pub fn all_files(&self, guard: &ReadGuard<'_>) -> Vec<String> {
        self.nodes_by_file.keys(guard).map(str::to_owned).collect()
    }

    /// Every label currently attached to some node.
    pub fn all_labels(&self, guard: &ReadGuard<'_>) -> Vec<String> {
        // SAFETY: see add_label on the label map's lifetime.
        let labels = unsafe { self.node_labels.load(guard).deref() };
        labels.keys(guard).map(str::to_owned).collect()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        let labels = self.node_labels.load_owner();
        if !labels.is_null() {
            // SAFETY: &mut self — no readers left.
            unsafe { drop(Box::from_raw(labels)) };
        }
    }
}
