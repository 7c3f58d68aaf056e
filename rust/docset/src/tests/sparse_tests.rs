use std::collections::BTreeSet;

use docset_common::ErrorKind;
use docset_page_alloc::Arena;

use crate::{
    sorted_ints::{self, Galloper},
    sparse::SparseDocSet,
};

fn random_sorted(len: usize, universe: u32) -> Vec<u32> {
    let set = (0..len)
        .map(|_| fastrand::u32(..universe))
        .collect::<BTreeSet<_>>();
    set.into_iter().collect()
}

fn naive_intersection(a: &[u32], b: &[u32]) -> Vec<u32> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::new();
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

fn as_set(ids: &[u32]) -> BTreeSet<u32> {
    ids.iter().copied().collect()
}

#[test]
fn test_scenario_small_sets() {
    let arena = Arena::default();
    let a = SparseDocSet::from_sorted(&arena, &[1, 5, 9, 100]).unwrap();
    let b = SparseDocSet::from_sorted(&arena, &[5, 9, 50]).unwrap();
    assert_eq!(a.intersection_size(&b), 2);
    assert!(a.intersects(&b));
    assert_eq!(a.and_not(&b).unwrap().ids(), &[1, 100]);
    assert_eq!(a.intersection(&b).unwrap().ids(), &[5, 9]);
    assert_eq!(a.union(&b).unwrap().ids(), &[1, 5, 9, 50, 100]);
    assert_eq!(a.xor(&b).unwrap().ids(), &[1, 50, 100]);
}

#[test]
fn test_accessors() {
    let arena = Arena::default();
    let a = SparseDocSet::from_sorted(&arena, &[2, 4, 8, 16]).unwrap();
    assert_eq!(a.len(), 4);
    assert_eq!(a.first(), Some(2));
    assert_eq!(a.last(), Some(16));
    assert!(a.exists(8));
    assert!(!a.exists(9));
    assert_eq!(a.find_index(8), 2);
    assert_eq!(a.find_index(9), 3);
    assert_eq!(a.find_index(100), 4);
    assert_eq!(a.mem_size(), 4 * 4 + 16);

    let empty = SparseDocSet::empty(&arena).unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.first(), None);
    assert!(!empty.intersects(&a));
    assert_eq!(a.and_not(&empty).unwrap().ids(), a.ids());
}

#[test]
fn test_from_sorted_rejects_unordered_input() {
    let arena = Arena::default();
    for ids in [&[3, 1][..], &[1, 1, 2][..]] {
        let err = SparseDocSet::from_sorted(&arena, ids).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
    }
}

#[test]
fn test_from_buffer() {
    let arena = Arena::default();
    let mut buffer = arena.alloc(8, 4, true).unwrap();
    buffer.as_mut_slice::<u32>()[..3].copy_from_slice(&[7, 8, 9]);
    let set = SparseDocSet::from_buffer(buffer, 3).unwrap();
    assert_eq!(set.ids(), &[7, 8, 9]);

    let buffer = arena.alloc(2, 4, true).unwrap();
    let err = SparseDocSet::from_buffer(buffer, 3).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
}

#[test]
fn test_kernels_match_naive_merge() {
    fastrand::seed(20240611);
    let arena = Arena::default();
    for round in 0..300 {
        // Alternate balanced and skewed operand sizes.
        let (la, lb) = match round % 3 {
            0 => (fastrand::usize(0..200), fastrand::usize(0..200)),
            1 => (fastrand::usize(0..20), fastrand::usize(200..2000)),
            _ => (fastrand::usize(200..2000), fastrand::usize(0..20)),
        };
        let universe = fastrand::u32(1..5000);
        let a = random_sorted(la, universe);
        let b = random_sorted(lb, universe);
        let sa = SparseDocSet::from_sorted(&arena, &a).unwrap();
        let sb = SparseDocSet::from_sorted(&arena, &b).unwrap();

        let expected = naive_intersection(&a, &b);
        let intersection = sa.intersection(&sb).unwrap();
        assert_eq!(intersection.ids(), &expected[..]);
        assert!(sorted_ints::is_strictly_ascending(intersection.ids()));
        assert_eq!(sa.intersection_size(&sb), expected.len());
        assert_eq!(sb.intersection_size(&sa), expected.len());
        assert_eq!(sa.intersects(&sb), !expected.is_empty());

        let and_not = sa.and_not(&sb).unwrap();
        let expected_and_not = a.iter().copied().filter(|id| !b.contains(id)).collect::<Vec<_>>();
        assert_eq!(and_not.ids(), &expected_and_not[..]);

        // and_not(a, b) and intersection(a, b) partition a.
        let union = and_not.union(&intersection).unwrap();
        assert_eq!(union.ids(), &a[..]);
        assert!(!and_not.intersects(&intersection));

        let expected_union = as_set(&a).union(&as_set(&b)).copied().collect::<Vec<_>>();
        assert_eq!(sa.union(&sb).unwrap().ids(), &expected_union[..]);
        let expected_xor = as_set(&a)
            .symmetric_difference(&as_set(&b))
            .copied()
            .collect::<Vec<_>>();
        assert_eq!(sa.xor(&sb).unwrap().ids(), &expected_xor[..]);
    }
}

#[test]
fn test_and_not_skewed_keeps_tail() {
    let arena = Arena::default();
    let a = (0..1000).collect::<Vec<u32>>();
    let b = [10, 20, 30];
    let sa = SparseDocSet::from_sorted(&arena, &a).unwrap();
    let sb = SparseDocSet::from_sorted(&arena, &b).unwrap();
    let result = sa.and_not(&sb).unwrap();
    assert_eq!(result.len(), 997);
    assert_eq!(result.last(), Some(999));
    assert!(!result.exists(20));
    assert!(result.exists(21));

    // Hits at the very end of the long side.
    let sb = SparseDocSet::from_sorted(&arena, &[998, 999]).unwrap();
    let result = sa.and_not(&sb).unwrap();
    assert_eq!(result.len(), 998);
    assert_eq!(result.last(), Some(997));
}

#[test]
fn test_galloper_matches_binary_search() {
    fastrand::seed(99);
    for _ in 0..100 {
        let large = random_sorted(fastrand::usize(1..3000), 100_000);
        let mut targets = random_sorted(fastrand::usize(1..100), 100_000);
        // Include guaranteed hits.
        targets.extend(large.iter().step_by(97).copied());
        targets.sort_unstable();
        targets.dedup();

        let mut galloper = Galloper::new(&large, targets.len());
        for &target in &targets {
            let expected = large.binary_search(&target);
            assert_eq!(galloper.seek(target), expected, "target {target}");
        }
    }
}

#[test]
fn test_galloper_cursor_never_moves_back() {
    let large = (0..1000).map(|i| i * 2).collect::<Vec<u32>>();
    let mut galloper = Galloper::new(&large, 4);
    assert_eq!(galloper.seek(100), Ok(50));
    assert_eq!(galloper.position(), 51);
    assert_eq!(galloper.seek(101), Err(51));
    assert_eq!(galloper.position(), 51);
    assert_eq!(galloper.seek(5000), Err(1000));
}

#[test]
fn test_skew_threshold() {
    assert!(!sorted_ints::is_skewed(10, 80));
    assert!(sorted_ints::is_skewed(10, 81));
    assert!(!sorted_ints::is_skewed(0, 0));
}

#[test]
fn test_sort_dedup() {
    let mut ids = vec![5, 3, 5, 1, 3, 9, 1];
    let len = sorted_ints::sort_dedup(&mut ids);
    assert_eq!(&ids[..len], &[1, 3, 5, 9]);

    let mut single = vec![4];
    assert_eq!(sorted_ints::sort_dedup(&mut single), 1);
    assert_eq!(sorted_ints::sort_dedup(&mut []), 0);
}

#[test]
fn test_find_range() {
    let ids = [1, 5, 10, 15, 20];
    assert_eq!(sorted_ints::find_range(&ids, 5, 16), 1..4);
    assert_eq!(sorted_ints::find_range(&ids, 21, 30), 5..5);
    assert_eq!(sorted_ints::find_range(&ids, 0, u32::MAX as u64 + 1), 0..5);
}

#[test]
fn test_to_dense() {
    let arena = Arena::default();
    let set = SparseDocSet::from_sorted(&arena, &[0, 63, 64, 200]).unwrap();
    let bits = set.to_dense(201).unwrap();
    assert_eq!(bits.iter().collect::<Vec<_>>(), vec![0, 63, 64, 200]);
    assert!(set.to_dense(200).is_ok());
    assert!(set.to_dense(150).is_err());
}

#[test]
fn test_results_do_not_leak() {
    let arena = Arena::default();
    {
        let a = SparseDocSet::from_sorted(&arena, &(0..5000).collect::<Vec<_>>()).unwrap();
        let b = SparseDocSet::from_sorted(&arena, &(2500..7500).collect::<Vec<_>>()).unwrap();
        let _ = a.intersection(&b).unwrap();
        let _ = a.union(&b).unwrap();
        let _ = a.and_not(&b).unwrap();
        let _ = a.xor(&b).unwrap();
    }
    assert_eq!(arena.stats().live_buffers(), 0);
}
