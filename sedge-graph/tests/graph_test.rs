use sedge::RcuThread;
use sedge_graph::Graph;

#[test]
fn node_creation_is_idempotent() {
    let rcu = RcuThread::new();
    let g = Graph::new();

    let mut guard = rcu.read_lock();
    let a = g.add_external_node(&mut guard, "a");
    let b = g.add_external_node(&mut guard, "b");
    assert_ne!(a, b);
    assert_eq!(g.add_external_node(&mut guard, "a"), a);
    assert_eq!(g.add_external_node(&mut guard, "b"), b);
    assert_eq!(g.node_count(), 2);

    assert_eq!(g.get_node(&guard, "a"), Some(a));
    assert_eq!(g.get_node(&guard, "missing"), None);
    assert_eq!(g.node(&guard, a).name(), "a");
}

#[test]
fn username_resolves_to_same_node() {
    let rcu = RcuThread::new();
    let g = Graph::new();

    let mut guard = rcu.read_lock();
    let id = g.add_external_node(&mut guard, "mangled$name");
    g.set_username(&mut guard, id, "pretty_name");

    assert_eq!(g.get_node(&guard, "pretty_name"), Some(id));
    assert_eq!(g.node(&guard, id).username(), Some("pretty_name"));
    // A node lookup by username wins over the canonical index.
    assert_eq!(g.add_external_node(&mut guard, "pretty_name"), id);

    // Same value again is ignored.
    g.set_username(&mut guard, id, "pretty_name");
    assert_eq!(g.node_count(), 1);
}

#[test]
fn location_is_first_writer_wins() {
    let rcu = RcuThread::new();
    let g = Graph::new();

    let mut guard = rcu.read_lock();
    let id = g.add_external_node(&mut guard, "f");
    assert_eq!(g.node(&guard, id).location(), None);

    g.set_location(&mut guard, id, "a.c", 10);
    assert_eq!(g.node(&guard, id).location(), Some(("a.c", 10)));

    // Later writes are silently discarded.
    g.set_location(&mut guard, id, "b.c", 99);
    assert_eq!(g.node(&guard, id).location(), Some(("a.c", 10)));

    let mut in_a: Vec<usize> = Vec::new();
    let mut it = g.nodes_for_file(&guard, "a.c");
    while let Some(n) = it.next() {
        in_a.push(n);
    }
    assert_eq!(in_a, [id]);
    assert!(g.nodes_for_file(&guard, "b.c").next().is_none());

    let files = g.all_files(&guard);
    assert_eq!(files, ["a.c"]);
}

#[test]
fn edge_semantics_distinguish_calls_and_refs() {
    let rcu = RcuThread::new();
    let g = Graph::new();

    let mut guard = rcu.read_lock();
    let a = g.add_external_node(&mut guard, "A");
    let b = g.add_external_node(&mut guard, "B");
    g.set_defined(&mut guard, b);

    // A references B without calling it.
    g.add_edge(&mut guard, a, b, false);
    assert!(!g.has_edge(&guard, a, b, false));
    assert!(g.has_edge(&guard, a, b, true));
    assert!(!g.has_call_edge(&guard, a, b));

    // An external target never matches through refs.
    let c = g.add_external_node(&mut guard, "C");
    g.add_edge(&mut guard, a, c, false);
    assert!(g.node(&guard, c).is_external());
    assert!(!g.has_edge(&guard, a, c, true));

    // A real call shows up either way, external or not.
    g.add_edge(&mut guard, a, c, true);
    assert!(g.has_edge(&guard, a, c, false));
    assert!(g.has_call_edge(&guard, a, c));
}

#[test]
fn edges_land_in_all_three_sets() {
    let rcu = RcuThread::new();
    let g = Graph::new();

    let mut guard = rcu.read_lock();
    let a = g.add_external_node(&mut guard, "A");
    let b = g.add_external_node(&mut guard, "B");
    g.add_edge(&mut guard, a, b, true);
    // Self-edges and duplicates are allowed.
    g.add_edge(&mut guard, a, a, true);
    g.add_edge(&mut guard, a, b, true);

    let node_a = g.node(&guard, a);
    let node_b = g.node(&guard, b);
    assert!(node_a.calls().includes(&guard, b));
    assert!(node_b.callers().includes(&guard, a));
    assert!(node_a.calls().includes(&guard, a));
    assert_eq!(node_a.calls().len(), 2);

    let mut callers: Vec<usize> = Vec::new();
    let mut it = g.callers_of(&guard, b);
    while let Some(n) = it.next() {
        callers.push(n);
    }
    assert_eq!(callers, [a]);
}

#[test]
fn label_round_trip_and_reset() {
    let rcu = RcuThread::new();
    let g = Graph::new();

    let mut guard = rcu.read_lock();
    let a = g.add_external_node(&mut guard, "A");
    let b = g.add_external_node(&mut guard, "B");

    g.add_label(&mut guard, a, "entry");
    g.add_label(&mut guard, b, "entry");
    g.add_label(&mut guard, a, "leaf");

    assert!(g.has_label(&guard, a, "entry"));
    // Adding again keeps it set.
    g.add_label(&mut guard, a, "entry");
    assert!(g.has_label(&guard, a, "entry"));
    assert!(!g.has_label(&guard, b, "leaf"));

    let mut labelled: Vec<usize> = Vec::new();
    let mut it = g.nodes_for_label(&guard, "entry");
    while let Some(n) = it.next() {
        labelled.push(n);
    }
    labelled.sort_unstable();
    assert_eq!(labelled, [a, b]);

    let mut labels = g.all_labels(&guard);
    labels.sort_unstable();
    assert_eq!(labels, ["entry", "leaf"]);
    drop(guard);

    g.reset_labels();

    let guard = rcu.read_lock();
    assert!(g.all_labels(&guard).is_empty());
    assert!(!g.has_label(&guard, a, "entry"));
    assert!(g.nodes_for_label(&guard, "entry").next().is_none());
}

#[test]
fn every_returned_id_is_in_range() {
    let rcu = RcuThread::new();
    let g = Graph::new();

    let mut guard = rcu.read_lock();
    for i in 0..100 {
        let id = g.add_external_node(&mut guard, &format!("fn-{i}"));
        assert!(id < g.node_count());
    }
    for i in 0..100 {
        let id = g.get_node(&guard, &format!("fn-{i}")).unwrap();
        assert!(id < g.node_count());
        assert_eq!(g.node(&guard, id).name(), format!("fn-{i}"));
    }
}
