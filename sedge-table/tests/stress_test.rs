//! Multi-writer stress: shared containers under 8 threads, verified after join.

use rand::seq::SliceRandom;
use rand::thread_rng;
use sedge::RcuThread;
use sedge_table::{ConcurrentHashSet, ConcurrentStringMap};
use std::sync::Arc;
use std::thread;

#[test]
#[cfg_attr(miri, ignore)]
fn eight_writers_fill_string_map() {
    const WRITERS: usize = 8;
    const KEYS_PER_WRITER: usize = 10_000;

    let map: Arc<ConcurrentStringMap<usize>> = Arc::new(ConcurrentStringMap::new());

    let mut handles = vec![];
    for t in 0..WRITERS {
        let map = map.clone();
        handles.push(thread::spawn(move || {
            let rcu = RcuThread::new();
            let mut guard = rcu.read_lock();
            let mut keys: Vec<usize> = (0..KEYS_PER_WRITER).collect();
            keys.shuffle(&mut thread_rng());
            for i in keys {
                let n = t * KEYS_PER_WRITER + i;
                map.insert_if_absent(&mut guard, &format!("key-{n}"), n);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(map.len(), WRITERS * KEYS_PER_WRITER);

    let rcu = RcuThread::new();
    let guard = rcu.read_lock();
    for n in 0..WRITERS * KEYS_PER_WRITER {
        assert_eq!(map.get(&guard, &format!("key-{n}")), n);
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn contended_get_or_insert_agrees_on_payload() {
    const WRITERS: usize = 8;

    let map: Arc<ConcurrentStringMap<Box<ConcurrentHashSet>>> =
        Arc::new(ConcurrentStringMap::new());

    // All writers race to create the same few buckets, then record their
    // thread id in whichever payload won.
    let mut handles = vec![];
    for t in 0..WRITERS {
        let map = map.clone();
        handles.push(thread::spawn(move || {
            let rcu = RcuThread::new();
            let mut guard = rcu.read_lock();
            for bucket in 0..16 {
                let set = map.get_or_insert_default(&mut guard, &format!("bucket-{bucket}"));
                unsafe { &*set }.add(&mut guard, t);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(map.len(), 16);

    let rcu = RcuThread::new();
    let guard = rcu.read_lock();
    for bucket in 0..16 {
        let set = map.get_or(&guard, &format!("bucket-{bucket}"), std::ptr::null_mut());
        assert!(!set.is_null());
        let set = unsafe { &*set };
        // Every writer's mark landed in the single surviving payload.
        assert_eq!(set.len(), WRITERS);
        for t in 0..WRITERS {
            assert!(set.includes(&guard, t));
        }
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn readers_race_growth() {
    const KEYS: usize = 20_000;

    let set = Arc::new(ConcurrentHashSet::with_capacity(32));

    let writer = {
        let set = set.clone();
        thread::spawn(move || {
            let rcu = RcuThread::new();
            let mut guard = rcu.read_lock();
            for key in 0..KEYS {
                assert!(set.add(&mut guard, key));
            }
        })
    };

    // Readers probe while the table is repeatedly rebuilt under them. A key
    // observed once must stay observable.
    let mut readers = vec![];
    for _ in 0..4 {
        let set = set.clone();
        readers.push(thread::spawn(move || {
            let rcu = RcuThread::new();
            let mut high_water = 0usize;
            for _ in 0..200 {
                let guard = rcu.read_lock();
                while high_water < KEYS && set.includes(&guard, high_water) {
                    high_water += 1;
                }
                for key in 0..high_water {
                    assert!(set.includes(&guard, key), "lost key {key}");
                }
                drop(guard);
            }
        }));
    }

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }

    assert_eq!(set.len(), KEYS);
}
