use sedge::RcuThread;
use sedge_table::{ConcurrentHashSet, ConcurrentStringMap};

#[test]
fn reinsert_returns_first_value() {
    let rcu = RcuThread::new();
    let map: ConcurrentStringMap<usize> = ConcurrentStringMap::new();

    let mut guard = rcu.read_lock();
    assert_eq!(map.insert_if_absent(&mut guard, "abc", 111), 111);
    assert_eq!(map.insert_if_absent(&mut guard, "abc", 222), 111);
    assert_eq!(map.len(), 1);
}

#[test]
fn grows_past_four_at_load_factor() {
    let rcu = RcuThread::new();
    let map: ConcurrentStringMap<usize> = ConcurrentStringMap::with_capacity(4);

    let mut guard = rcu.read_lock();
    for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
        map.insert_if_absent(&mut guard, key, i);
    }
    assert_eq!(map.capacity(), 8);
    assert_eq!(map.len(), 4);
    for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
        assert_eq!(map.get(&guard, key), i);
    }
}

#[test]
fn get_or_insert_default_is_idempotent() {
    let rcu = RcuThread::new();
    let map: ConcurrentStringMap<Box<ConcurrentHashSet>> = ConcurrentStringMap::new();

    let mut guard = rcu.read_lock();
    let first = map.get_or_insert_default(&mut guard, "bucket");
    let second = map.get_or_insert_default(&mut guard, "bucket");
    // Same payload allocation, not a fresh default per call.
    assert_eq!(first, second);

    unsafe { &*first }.add(&mut guard, 42);
    assert!(unsafe { &*second }.includes(&guard, 42));
    assert_eq!(map.len(), 1);
}

#[test]
fn get_or_returns_absent_marker() {
    let rcu = RcuThread::new();
    let map: ConcurrentStringMap<usize> = ConcurrentStringMap::new();

    let mut guard = rcu.read_lock();
    assert_eq!(map.get_or(&guard, "missing", usize::MAX), usize::MAX);
    map.insert_if_absent(&mut guard, "present", 5);
    assert_eq!(map.get_or(&guard, "present", usize::MAX), 5);
}

#[test]
#[should_panic]
fn asserting_get_on_absent_key() {
    let rcu = RcuThread::new();
    let map: ConcurrentStringMap<usize> = ConcurrentStringMap::new();
    let guard = rcu.read_lock();
    map.get(&guard, "nope");
}

#[test]
fn keys_enumerate_published_entries() {
    let rcu = RcuThread::new();
    let map: ConcurrentStringMap<usize> = ConcurrentStringMap::new();

    let mut guard = rcu.read_lock();
    for key in ["x", "y", "z"] {
        map.get_or_insert_default(&mut guard, key);
    }
    let mut keys: Vec<&str> = map.keys(&guard).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["x", "y", "z"]);
}

#[test]
fn rehash_preserves_entries() {
    let rcu = RcuThread::new();
    let map: ConcurrentStringMap<usize> = ConcurrentStringMap::with_capacity(4);

    let mut guard = rcu.read_lock();
    let keys: Vec<String> = (0..100).map(|i| format!("key-{i}")).collect();
    for (i, key) in keys.iter().enumerate() {
        map.insert_if_absent(&mut guard, key, i);
    }
    assert!(map.capacity() >= 128);
    assert_eq!(map.len(), 100);
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(map.get(&guard, key), i);
    }
    assert_eq!(map.entries(&guard).count(), 100);
}
