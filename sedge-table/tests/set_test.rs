use sedge::RcuThread;
use sedge_table::ConcurrentHashSet;

#[test]
fn rejects_duplicate() {
    let rcu = RcuThread::new();
    let set = ConcurrentHashSet::new();

    let mut guard = rcu.read_lock();
    assert!(set.add(&mut guard, 123));
    assert!(!set.add(&mut guard, 123));
    assert_eq!(set.len(), 1);
}

#[test]
fn includes_tracks_adds() {
    let rcu = RcuThread::new();
    let set = ConcurrentHashSet::new();

    let mut guard = rcu.read_lock();
    assert!(!set.includes(&guard, 7));
    assert!(set.add(&mut guard, 7));
    assert!(set.includes(&guard, 7));
    assert!(!set.includes(&guard, 8));
}

#[test]
fn growth_preserves_membership() {
    let rcu = RcuThread::new();
    let set = ConcurrentHashSet::with_capacity(4);

    let mut guard = rcu.read_lock();
    for key in 0..200 {
        assert!(set.add(&mut guard, key * 3));
    }
    drop(guard);

    // After resizes: same observable keys, none duplicated, none lost.
    let guard = rcu.read_lock();
    assert!(set.capacity() > 4);
    assert_eq!(set.len(), 200);
    for key in 0..200 {
        assert!(set.includes(&guard, key * 3));
        assert!(!set.includes(&guard, key * 3 + 1));
    }
    let mut seen: Vec<usize> = set.iter(&guard).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..200).map(|k| k * 3).collect::<Vec<_>>());
}

#[test]
fn zero_key_is_storable() {
    // 0 is a valid key; only the all-ones sentinel is reserved.
    let rcu = RcuThread::new();
    let set = ConcurrentHashSet::new();

    let mut guard = rcu.read_lock();
    assert!(set.add(&mut guard, 0));
    assert!(set.includes(&guard, 0));
    assert!(!set.add(&mut guard, 0));
}

#[test]
#[should_panic]
fn sentinel_key_is_fatal() {
    let rcu = RcuThread::new();
    let set = ConcurrentHashSet::new();
    let mut guard = rcu.read_lock();
    set.add(&mut guard, usize::MAX);
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_distinct_adds_return_true_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    let set = Arc::new(ConcurrentHashSet::new());
    let installs = Arc::new(AtomicUsize::new(0));

    // Every thread tries the same 2000 keys; each key must be installed by
    // exactly one of them.
    let mut handles = vec![];
    for _ in 0..8 {
        let set = set.clone();
        let installs = installs.clone();
        handles.push(thread::spawn(move || {
            let rcu = RcuThread::new();
            let mut guard = rcu.read_lock();
            for key in 0..2000 {
                if set.add(&mut guard, key) {
                    installs.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(installs.load(Ordering::Relaxed), 2000);
    assert_eq!(set.len(), 2000);

    let rcu = RcuThread::new();
    let guard = rcu.read_lock();
    for key in 0..2000 {
        assert!(set.includes(&guard, key));
    }
}
