//! Multi-threaded workloads: disjoint-range mixes, readers against writers,
//! and range scans riding through structural changes.

use std::sync::Arc;
use std::thread;

use crabtree::{BPlusTree, DocList};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn value_for(key: i32) -> i64 {
    i64::from(key) * 7
}

#[test]
fn four_threads_on_disjoint_key_ranges() {
    init_logging();
    let tree = Arc::new(BPlusTree::new(8).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let lo = t * 1000;
                let hi = lo + 1000;
                // Three full churn rounds, then a final fill with holes:
                // well over ten thousand operations per thread.
                for _ in 0..3 {
                    for k in lo..hi {
                        tree.insert(k, value_for(k)).unwrap();
                    }
                    for k in lo..hi {
                        assert_eq!(tree.get(&k), Some(value_for(k)));
                    }
                    for k in lo..hi {
                        tree.remove(&k).unwrap();
                    }
                }
                for k in lo..hi {
                    tree.insert(k, value_for(k)).unwrap();
                }
                for k in (lo..hi).filter(|k| k % 3 == 0) {
                    tree.remove(&k).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Every key each thread left behind resolves to its value; nothing
    // outside the four ranges exists.
    for k in 0..4000 {
        let expected = (k % 3 != 0).then(|| value_for(k));
        assert_eq!(tree.get(&k), expected, "key {}", k);
    }
    assert_eq!(tree.len(), (0..4000).filter(|k| k % 3 != 0).count());
    let keys = tree.keys();
    assert!(keys.first().copied().unwrap() >= 0);
    assert!(keys.last().copied().unwrap() < 4000);
    tree.check_invariants_detailed().unwrap();
}

#[test]
fn readers_run_against_a_writer() {
    init_logging();
    let tree = Arc::new(BPlusTree::new(6).unwrap());
    const COUNT: i32 = 5000;

    let writer = {
        let tree = Arc::clone(&tree);
        thread::spawn(move || {
            for k in 0..COUNT {
                tree.insert(k, value_for(k)).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|r| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for pass in 0..200 {
                    let probe = (pass * 37 + r * 11) % COUNT;
                    // A hit must carry the right value; a miss is fine while
                    // the writer is still behind this key.
                    if let Some(v) = tree.get(&probe) {
                        assert_eq!(v, value_for(probe));
                    }
                    let window = tree.find_range(&probe, &(probe + 100), 256);
                    for pair in window.windows(2) {
                        assert!(pair[0] < pair[1], "scan emitted out of order");
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(tree.len(), COUNT as usize);
    for k in 0..COUNT {
        assert_eq!(tree.get(&k), Some(value_for(k)));
    }
    tree.check_invariants_detailed().unwrap();
}

#[test]
fn scans_ride_through_concurrent_deletes() {
    init_logging();
    let tree = Arc::new(BPlusTree::new(4).unwrap());
    const COUNT: i32 = 4000;
    for k in 0..COUNT {
        tree.insert(k, value_for(k)).unwrap();
    }

    let deleters: Vec<_> = (0..2)
        .map(|half| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let lo = half * (COUNT / 2);
                let hi = lo + COUNT / 2;
                for k in (lo..hi).filter(|k| k % 2 == 0) {
                    tree.remove(&k).unwrap();
                }
            })
        })
        .collect();

    let scanners: Vec<_> = (0..2)
        .map(|s| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for pass in 0..60 {
                    let lo = (pass * 61 + s * 13) % COUNT;
                    let values = tree.find_range(&lo, &(lo + 500), 1024);
                    // Each leaf is a snapshot; the emitted sequence is
                    // still strictly ascending.
                    for pair in values.windows(2) {
                        assert!(pair[0] < pair[1], "scan emitted out of order");
                    }
                }
            })
        })
        .collect();

    for handle in deleters.into_iter().chain(scanners) {
        handle.join().unwrap();
    }

    for k in 0..COUNT {
        let expected = (k % 2 == 1).then(|| value_for(k));
        assert_eq!(tree.get(&k), expected, "key {}", k);
    }
    tree.check_invariants_detailed().unwrap();
}

#[test]
fn contended_overlapping_keys_stay_linearizable_per_key() {
    init_logging();
    let tree = Arc::new(BPlusTree::<i32, i64>::new(5).unwrap());

    // All threads fight over the same small key space; individual
    // operations may lose races, but every outcome must be coherent.
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for round in 0..2000 {
                    let k = (round * (t + 1)) % 97;
                    if (round + t) % 2 == 0 {
                        match tree.insert(k, value_for(k)) {
                            Ok(()) => {}
                            Err(crabtree::TreeError::DuplicateKey) => {}
                            Err(e) => panic!("unexpected insert error: {}", e),
                        }
                    } else {
                        match tree.remove(&k) {
                            Ok(v) => assert_eq!(v, value_for(k)),
                            Err(crabtree::TreeError::KeyNotFound) => {}
                            Err(e) => panic!("unexpected remove error: {}", e),
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Whatever survived is internally consistent.
    tree.check_invariants_detailed().unwrap();
    for k in tree.keys() {
        assert_eq!(tree.get(&k), Some(value_for(k)));
    }
}

#[test]
fn doclist_shared_across_threads() {
    init_logging();
    let list = Arc::new(DocList::new());

    let pushers: Vec<_> = (0..4)
        .map(|t| {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                for n in 0..500 {
                    list.push_back((t, n)).unwrap();
                }
            })
        })
        .collect();
    for handle in pushers {
        handle.join().unwrap();
    }
    assert_eq!(list.len(), 2000);

    let removers: Vec<_> = (0..4)
        .map(|t| {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                let mut removed = 0;
                while list.delete_first(|doc: &(i32, i32)| doc.0 == t).is_some() {
                    removed += 1;
                }
                removed
            })
        })
        .collect();
    let total: i32 = removers.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 2000);
    assert!(list.is_empty());
}
