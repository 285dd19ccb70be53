//! Throughput benchmarks for the container family.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sedge::RcuThread;
use sedge_table::{ConcurrentHashSet, ConcurrentList, ConcurrentStringMap};
use std::sync::Arc;
use std::thread;

fn bench_list_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_add");

    group.bench_function("single_thread", |b| {
        let rcu = RcuThread::new();
        b.iter_batched(
            ConcurrentList::<usize>::new,
            |list| {
                let mut guard = rcu.read_lock();
                for i in 0..1000 {
                    black_box(list.add(&mut guard, i));
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("set");

    group.bench_function("add_distinct", |b| {
        let rcu = RcuThread::new();
        b.iter_batched(
            ConcurrentHashSet::new,
            |set| {
                let mut guard = rcu.read_lock();
                for i in 0..1000 {
                    black_box(set.add(&mut guard, i));
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("includes_hit", |b| {
        let rcu = RcuThread::new();
        let set = ConcurrentHashSet::new();
        {
            let mut guard = rcu.read_lock();
            for i in 0..1000 {
                set.add(&mut guard, i);
            }
        }
        let guard = rcu.read_lock();
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % 1000;
            black_box(set.includes(&guard, i));
        });
    });

    group.finish();
}

fn bench_map_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_insert");

    for threads in [1, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(10_000));
        group.bench_with_input(
            BenchmarkId::new("concurrent", threads),
            threads,
            |b, &num_threads| {
                b.iter(|| {
                    let map: Arc<ConcurrentStringMap<usize>> =
                        Arc::new(ConcurrentStringMap::new());
                    let per_thread = 10_000 / num_threads;
                    let handles: Vec<_> = (0..num_threads)
                        .map(|t| {
                            let map = map.clone();
                            thread::spawn(move || {
                                let rcu = RcuThread::new();
                                let mut guard = rcu.read_lock();
                                for i in 0..per_thread {
                                    let n = t * per_thread + i;
                                    map.insert_if_absent(&mut guard, &format!("key-{n}"), n);
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                    black_box(map.len())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_list_add, bench_set, bench_map_concurrent);
criterion_main!(benches);
