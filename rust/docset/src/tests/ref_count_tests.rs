use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::ref_count::{RefCount, Shared};

/// Counts how many times it was dropped.
struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn counted() -> (Shared<DropCounter>, Arc<AtomicUsize>) {
    let drops = Arc::new(AtomicUsize::new(0));
    (Shared::new(DropCounter(drops.clone())), drops)
}

#[test]
fn test_ref_count_starts_at_one() {
    let count = RefCount::new();
    assert_eq!(count.get(), 1);
    assert!(count.is_alive());
    assert_eq!(count.incref(), 2);
    assert_eq!(count.decref(), 1);
    assert_eq!(count.decref(), 0);
    assert!(!count.is_alive());
}

#[test]
fn test_try_ops_after_release() {
    let count = RefCount::new();
    assert_eq!(count.try_decref(), Some(0));
    assert!(!count.try_incref());
    assert_eq!(count.try_decref(), None);
    assert_eq!(count.get(), 0);
}

#[test]
#[should_panic(expected = "released object")]
fn test_incref_after_release_panics() {
    let count = RefCount::new();
    count.decref();
    count.incref();
}

#[test]
#[should_panic(expected = "too many decrefs")]
fn test_excess_decref_panics() {
    let count = RefCount::new();
    count.decref();
    count.decref();
}

#[test]
fn test_interleaved_increfs_and_decrefs() {
    fastrand::seed(81263541);
    for _ in 0..50 {
        let (shared, drops) = counted();
        let k = fastrand::usize(1..40);
        let mut handles = Vec::new();
        let (mut increfs, mut decrefs) = (0, 0);
        while increfs < k || decrefs < k {
            let can_decref = decrefs < increfs;
            if increfs < k && (!can_decref || fastrand::bool()) {
                handles.push(shared.clone());
                increfs += 1;
            } else {
                let i = fastrand::usize(..handles.len());
                drop(handles.swap_remove(i));
                decrefs += 1;
            }
            assert_eq!(Shared::ref_count(&shared) as usize, 1 + increfs - decrefs);
            assert_eq!(drops.load(Ordering::SeqCst), 0);
        }
        assert_eq!(Shared::ref_count(&shared), 1);
        drop(shared);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn test_try_unwrap() {
    let (shared, drops) = counted();
    let other = shared.clone();
    let shared = Shared::try_unwrap(shared).err().unwrap();
    assert_eq!(Shared::ref_count(&shared), 2);
    drop(other);

    let value = Shared::try_unwrap(shared).ok().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(value);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_weak_upgrade() {
    let (shared, drops) = counted();
    let weak = Shared::downgrade(&shared);
    assert!(weak.is_alive());
    let upgraded = weak.upgrade().unwrap();
    assert!(Shared::ptr_eq(&shared, &upgraded));
    assert_eq!(Shared::ref_count(&shared), 2);
    drop(upgraded);
    drop(shared);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(!weak.is_alive());
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_weak_upgrade_after_try_unwrap() {
    let (shared, drops) = counted();
    let weak = Shared::downgrade(&shared);
    let value = Shared::try_unwrap(shared).ok().unwrap();
    assert!(weak.upgrade().is_none());
    drop(value);
    drop(weak);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_clone_and_drop() {
    let (shared, drops) = counted();
    std::thread::scope(|s| {
        for _ in 0..8 {
            let local = shared.clone();
            s.spawn(move || {
                for _ in 0..10_000 {
                    let copy = local.clone();
                    drop(copy);
                }
            });
        }
    });
    assert_eq!(Shared::ref_count(&shared), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(shared);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_release_races_with_weak_upgrades() {
    for _ in 0..20 {
        let (shared, drops) = counted();
        let weak = Shared::downgrade(&shared);
        let upgrades = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        if let Some(handle) = weak.upgrade() {
                            upgrades.fetch_add(1, Ordering::Relaxed);
                            drop(handle);
                        }
                    }
                });
            }
            s.spawn(move || drop(shared));
        });
        assert!(!weak.is_alive());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
