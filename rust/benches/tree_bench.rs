use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use crabtree::BPlusTree;

const N: i32 = 10_000;
const ORDER: usize = 32;

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    group.bench_function("crabtree", |b| {
        b.iter(|| {
            let tree = BPlusTree::new(ORDER).unwrap();
            for k in 0..N {
                tree.insert(black_box(k), k * 2).unwrap();
            }
            tree
        })
    });
    group.bench_function("std_btreemap", |b| {
        b.iter(|| {
            let mut map = BTreeMap::new();
            for k in 0..N {
                map.insert(black_box(k), k * 2);
            }
            map
        })
    });
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let tree = BPlusTree::new(ORDER).unwrap();
    let mut map = BTreeMap::new();
    for k in 0..N {
        tree.insert(k, k * 2).unwrap();
        map.insert(k, k * 2);
    }

    let mut group = c.benchmark_group("get");
    group.bench_function("crabtree", |b| {
        b.iter(|| {
            for k in (0..N).step_by(7) {
                black_box(tree.get(&k));
            }
        })
    });
    group.bench_function("std_btreemap", |b| {
        b.iter(|| {
            for k in (0..N).step_by(7) {
                black_box(map.get(&k));
            }
        })
    });
    group.finish();
}

fn bench_range(c: &mut Criterion) {
    let tree = BPlusTree::new(ORDER).unwrap();
    for k in 0..N {
        tree.insert(k, k * 2).unwrap();
    }

    c.bench_function("range_1000", |b| {
        b.iter(|| black_box(tree.find_range(&2000, &2999, 2000)))
    });
}

fn bench_parallel_reads(c: &mut Criterion) {
    let tree = Arc::new(BPlusTree::new(ORDER).unwrap());
    for k in 0..N {
        tree.insert(k, k * 2).unwrap();
    }

    c.bench_function("parallel_get_4_threads", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let tree = Arc::clone(&tree);
                    thread::spawn(move || {
                        for k in ((t * 97)..N).step_by(13) {
                            black_box(tree.get(&k));
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        })
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_get,
    bench_range,
    bench_parallel_reads
);
criterion_main!(benches);
