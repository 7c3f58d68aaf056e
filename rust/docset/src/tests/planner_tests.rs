use std::sync::{Arc, Mutex};

use docset_common::{ErrorKind, Result};
use docset_page_alloc::{Arena, ArenaConfig};

use crate::{
    cache::{FilterCache, InMemoryFilterCache},
    collector::Collector,
    config::SearcherConfig,
    dense::DenseDocSet,
    doc_set::DocSet,
    filter::{ComplementIterator, ConjunctionIterator, SegmentFilter},
    post_filter::{PostFilter, PostFilterCollector},
    predicate::{DocIdsPredicate, FilterQuery, MatchAllDocs, Predicate, PredicateKey},
    searcher::DocSetSearcher,
    segment::{DocIdIterator, LiveDocs, NO_MORE_DOCS, SegmentContext, SortedIdsIterator},
};

/// Documents whose global id is a multiple of `modulus`; usable as a
/// post-filter that records every document it inspects.
#[derive(Debug)]
struct ModuloFilter {
    name: &'static str,
    modulus: u32,
    seen: Arc<Mutex<Vec<&'static str>>>,
}

struct OwnedIdsIterator {
    docs: Vec<u32>,
    next: usize,
}

impl DocIdIterator for OwnedIdsIterator {
    fn next_doc(&mut self) -> u32 {
        let doc = self.docs.get(self.next).copied().unwrap_or(NO_MORE_DOCS);
        self.next += 1;
        doc
    }

    fn advance(&mut self, target: u32) -> u32 {
        while self.docs.get(self.next).is_some_and(|&doc| doc < target) {
            self.next += 1;
        }
        self.next_doc()
    }

    fn cost(&self) -> u64 {
        self.docs.len() as u64
    }
}

impl Predicate for ModuloFilter {
    fn key(&self) -> PredicateKey {
        PredicateKey::new(self.name)
    }

    fn segment_iter<'a>(
        &'a self,
        segment: &SegmentContext,
    ) -> Option<Box<dyn DocIdIterator + 'a>> {
        let docs = (0..segment.max_doc)
            .filter(|&doc| (segment.base + doc).is_multiple_of(self.modulus))
            .filter(|&doc| segment.is_live(doc))
            .collect::<Vec<_>>();
        if docs.is_empty() {
            return None;
        }
        Some(Box::new(OwnedIdsIterator { docs, next: 0 }))
    }

    fn as_post_filter(&self) -> Option<&dyn PostFilter> {
        Some(self)
    }
}

impl PostFilter for ModuloFilter {
    fn collector(&self) -> Box<dyn PostFilterCollector> {
        Box::new(ModuloCollector {
            name: self.name,
            modulus: self.modulus,
            base: 0,
            seen: self.seen.clone(),
        })
    }
}

struct ModuloCollector {
    name: &'static str,
    modulus: u32,
    base: u32,
    seen: Arc<Mutex<Vec<&'static str>>>,
}

impl PostFilterCollector for ModuloCollector {
    fn set_next_segment(&mut self, segment: &SegmentContext) -> Result<()> {
        self.base = segment.base;
        Ok(())
    }

    fn collect(&mut self, doc: u32, next: &mut dyn Collector) -> Result<()> {
        self.seen.lock().unwrap().push(self.name);
        if (self.base + doc).is_multiple_of(self.modulus) {
            next.collect(doc)
        } else {
            Ok(())
        }
    }
}

fn ids_query(key: &str, ids: impl IntoIterator<Item = u32>) -> FilterQuery {
    FilterQuery::new(Arc::new(DocIdsPredicate::new(key, ids)))
}

fn members(set: &DocSet) -> Vec<u32> {
    set.iter().collect()
}

fn cached_searcher(cache: &Arc<InMemoryFilterCache>) -> DocSetSearcher {
    DocSetSearcher::builder()
        .add_segment(50)
        .add_segment(51)
        .filter_cache(cache.clone())
        .build()
        .unwrap()
}

fn uncached_searcher() -> DocSetSearcher {
    DocSetSearcher::builder()
        .add_segment(50)
        .add_segment(51)
        .build()
        .unwrap()
}

fn scenario_expected() -> Vec<u32> {
    (1..=49).chain(61..=100).collect()
}

#[test]
fn test_positive_minus_negative_with_cache() {
    let cache = Arc::new(InMemoryFilterCache::new());
    let searcher = cached_searcher(&cache);
    let queries = [ids_query("p1", 1..=100), ids_query("q", 50..=60).negate()];

    let plan = searcher.get_processed_filter(None, &queries).unwrap();
    let answer = plan.answer().unwrap();
    assert_eq!(members(answer), scenario_expected());
    assert!(matches!(plan.filter(), Some(SegmentFilter::Top(_))));
    assert!(plan.post_filter().is_none());
    assert_eq!(cache.len(), 2);
    drop(plan);

    // Only the cache holds the intermediate sets now.
    let q = cache.get(&PredicateKey::new("q")).unwrap();
    assert_eq!(q.ref_count(), 2);
    assert_eq!(q.size(), 11);

    let result = searcher.get_doc_set_for_queries(&queries).unwrap();
    assert_eq!(members(&result), scenario_expected());
}

#[test]
fn test_positive_minus_negative_without_cache() {
    let searcher = uncached_searcher();
    let queries = [ids_query("p1", 1..=100), ids_query("q", 50..=60).negate()];

    let plan = searcher.get_processed_filter(None, &queries).unwrap();
    assert!(plan.answer().is_none());
    match plan.filter() {
        Some(SegmentFilter::Composite(composite)) => {
            assert!(composite.top().is_none());
            assert_eq!(composite.residual().len(), 2);
        }
        other => panic!("unexpected {other:?}"),
    }

    let result = searcher.get_doc_set_for_queries(&queries).unwrap();
    assert_eq!(members(&result), scenario_expected());
}

#[test]
fn test_cache_disabled_by_config() {
    let cache = Arc::new(InMemoryFilterCache::new());
    let searcher = DocSetSearcher::builder()
        .add_segment(101)
        .filter_cache(cache.clone())
        .config(SearcherConfig::default().with_filter_cache(false))
        .build()
        .unwrap();
    let queries = [ids_query("p1", 1..=100), ids_query("q", 50..=60).negate()];
    let result = searcher.get_doc_set_for_queries(&queries).unwrap();
    assert_eq!(members(&result), scenario_expected());
    assert!(cache.is_empty());
}

#[test]
fn test_cached_sets_are_reused() {
    let cache = Arc::new(InMemoryFilterCache::new());
    let searcher = cached_searcher(&cache);
    let predicate = DocIdsPredicate::new("p", [4, 8, 15, 16, 23, 42]);
    let first = searcher.get_positive_doc_set(&predicate).unwrap();
    let second = searcher.get_positive_doc_set(&predicate).unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(first.ref_count(), 3);

    let uncached = searcher.get_doc_set_nc(&predicate).unwrap();
    assert!(!uncached.ptr_eq(&first));
    assert_eq!(members(&uncached), members(&first));
}

#[test]
fn test_residual_layered_on_cached_seed() {
    let cache = Arc::new(InMemoryFilterCache::new());
    let searcher = cached_searcher(&cache);
    let queries = [
        ids_query("evens", (0..101).step_by(2)),
        ids_query("small", 0..30).with_cache(false).with_cost(5),
    ];
    let plan = searcher.get_processed_filter(None, &queries).unwrap();
    match plan.filter() {
        Some(SegmentFilter::Composite(composite)) => {
            assert_eq!(composite.top().unwrap().doc_set().size(), 51);
            assert_eq!(composite.residual().len(), 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(cache.len(), 1);

    let result = searcher.get_doc_set_for_queries(&queries).unwrap();
    assert_eq!(members(&result), (0..30).step_by(2).collect::<Vec<_>>());
}

#[test]
fn test_only_negatives_start_from_all_docs() {
    let cache = Arc::new(InMemoryFilterCache::new());
    let searcher = cached_searcher(&cache);
    let queries = [
        ids_query("q", 50..=60).negate(),
        ids_query("r", 0..10).negate(),
    ];
    let result = searcher.get_doc_set_for_queries(&queries).unwrap();
    assert_eq!(result.size(), 101 - 11 - 10);
    assert!(!result.exists(55));
    assert!(!result.exists(0));
    assert!(result.exists(100));
}

#[test]
fn test_no_queries() {
    let cache = Arc::new(InMemoryFilterCache::new());
    let searcher = cached_searcher(&cache);

    let plan = searcher.get_processed_filter(None, &[]).unwrap();
    assert_eq!(plan.answer().unwrap().size(), 101);

    let set_filter = DocSet::from_sorted(searcher.arena(), &[3, 5]).unwrap();
    let plan = searcher.get_processed_filter(Some(&set_filter), &[]).unwrap();
    assert!(plan.answer().unwrap().ptr_eq(&set_filter));
}

#[test]
fn test_set_filter_participates_as_positive() {
    let cache = Arc::new(InMemoryFilterCache::new());
    let searcher = cached_searcher(&cache);
    let set_filter = DocSet::from_sorted(searcher.arena(), &[2, 52, 55, 90]).unwrap();
    let queries = [ids_query("q", 50..=60).negate(), ids_query("p", 0..95)];
    let plan = searcher
        .get_processed_filter(Some(&set_filter), &queries)
        .unwrap();
    assert_eq!(members(plan.answer().unwrap()), vec![2, 90]);
    drop(plan);
    assert_eq!(set_filter.ref_count(), 1);
}

#[test]
fn test_post_filters_run_cheapest_first() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let expensive = ModuloFilter {
        name: "expensive",
        modulus: 2,
        seen: seen.clone(),
    };
    let cheap = ModuloFilter {
        name: "cheap",
        modulus: 3,
        seen: seen.clone(),
    };
    let searcher = DocSetSearcher::builder()
        .add_segment(10)
        .add_segment(20)
        .build()
        .unwrap();
    let queries = [
        FilterQuery::new(Arc::new(expensive))
            .with_cache(false)
            .with_cost(300),
        FilterQuery::new(Arc::new(cheap)).with_cache(false).with_cost(150),
    ];

    let plan = searcher.get_processed_filter(None, &queries).unwrap();
    assert!(plan.answer().is_none());
    assert!(plan.filter().is_none());
    assert_eq!(plan.post_filter().unwrap().len(), 2);
    drop(plan);

    let result = searcher.get_doc_set_for_queries(&queries).unwrap();
    assert_eq!(members(&result), vec![0, 6, 12, 18, 24]);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], "cheap");
    assert_eq!(seen.iter().filter(|&&name| name == "cheap").count(), 30);
    assert_eq!(seen.iter().filter(|&&name| name == "expensive").count(), 10);
}

#[test]
fn test_cheap_uncached_filter_stays_residual() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let filter = ModuloFilter {
        name: "fives",
        modulus: 5,
        seen: seen.clone(),
    };
    let searcher = uncached_searcher();
    let queries = [FilterQuery::new(Arc::new(filter))
        .with_cache(false)
        .with_cost(99)];
    let plan = searcher.get_processed_filter(None, &queries).unwrap();
    assert!(plan.post_filter().is_none());
    assert!(matches!(plan.filter(), Some(SegmentFilter::Composite(_))));

    let result = searcher.get_doc_set_for_queries(&queries).unwrap();
    assert_eq!(result.size(), 21);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_invalid_queries() {
    let searcher = uncached_searcher();
    let post = FilterQuery::new(Arc::new(ModuloFilter {
        name: "m",
        modulus: 2,
        seen: Default::default(),
    }))
    .with_cache(false)
    .with_cost(500)
    .negate();
    let err = searcher.get_processed_filter(None, &[post]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnsupportedFilter { .. }));

    let negative_cost = ids_query("p", [1]).with_cost(-1);
    let err = searcher
        .get_processed_filter(None, &[negative_cost])
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
}

#[test]
fn test_deleted_docs_are_excluded() {
    let arena = Arena::default();
    let live: Arc<dyn LiveDocs> =
        Arc::new(DenseDocSet::from_ids(&arena, 50, (0..50).filter(|&doc| doc != 7)).unwrap());
    let cache = Arc::new(InMemoryFilterCache::new());
    let searcher = DocSetSearcher::builder()
        .arena(arena)
        .add_segment_with_live_docs(50, live)
        .add_segment(50)
        .filter_cache(cache.clone())
        .build()
        .unwrap();

    let all = searcher.match_all().unwrap();
    assert_eq!(all.size(), 99);
    assert!(!all.exists(7));
    assert!(all.ptr_eq(&searcher.match_all().unwrap()));
    assert!(cache.get(&PredicateKey::new(MatchAllDocs::KEY)).is_some());

    let ids = searcher
        .get_doc_set(&ids_query("p", [5, 6, 7, 8, 70]))
        .unwrap();
    assert_eq!(members(&ids), vec![5, 6, 8, 70]);

    let not_ids = searcher
        .get_doc_set(&ids_query("p", [5, 6, 7, 8, 70]).negate())
        .unwrap();
    assert_eq!(not_ids.size(), 95);
    assert!(!not_ids.exists(7));
    assert!(!not_ids.exists(70));
}

#[test]
fn test_uncached_single_query() {
    let searcher = uncached_searcher();
    let negated = ids_query("q", 10..20).with_cache(false).negate();
    let set = searcher.get_doc_set(&negated).unwrap();
    assert_eq!(set.size(), 91);
    assert!(!set.exists(15));
}

#[test]
fn test_searcher_builder_validation() {
    let err = DocSetSearcher::builder()
        .add_segment(u32::MAX / 2)
        .add_segment(u32::MAX / 2 + 1)
        .build()
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));

    let err = DocSetSearcher::builder()
        .config(SearcherConfig::default().with_post_filter_cost_threshold(-1))
        .build()
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));

    let searcher = DocSetSearcher::builder()
        .add_segment(640)
        .add_segment(0)
        .add_segment(360)
        .build()
        .unwrap();
    assert_eq!(searcher.max_doc(), 1000);
    assert_eq!(searcher.small_set_size(), (1000 >> 6) + 5);
    let bases = searcher.segments().iter().map(|s| s.base).collect::<Vec<_>>();
    assert_eq!(bases, vec![0, 640, 640]);
}

#[test]
fn test_filter_cache_operations() {
    let arena = Arena::default();
    let cache = InMemoryFilterCache::new();
    let key = PredicateKey::new("k");
    cache.put(key.clone(), DocSet::from_sorted(&arena, &[1]).unwrap());
    assert_eq!(cache.len(), 1);

    let weak = cache.get_weak(&key).unwrap();
    assert!(weak.is_alive());
    let removed = cache.remove(&key).unwrap();
    assert!(cache.is_empty());
    assert!(weak.upgrade().unwrap().ptr_eq(&removed));
    drop(removed);
    assert!(!weak.is_alive());

    cache.put(key.clone(), DocSet::from_sorted(&arena, &[2]).unwrap());
    cache.clear();
    assert!(cache.get(&key).is_none());
    assert_eq!(arena.stats().live_buffers(), 0);
}

#[test]
fn test_conjunction_iterator() {
    let a = [1, 3, 5, 7, 9, 11, 13];
    let b = [3, 4, 5, 9, 13, 20];
    let c = [0, 3, 9, 10, 13];
    let iters: Vec<Box<dyn DocIdIterator + '_>> = vec![
        Box::new(SortedIdsIterator::new(&a, 0, a.len() as u64)),
        Box::new(SortedIdsIterator::new(&b, 0, b.len() as u64)),
        Box::new(SortedIdsIterator::new(&c, 0, c.len() as u64)),
    ];
    let mut conjunction = ConjunctionIterator::new(iters);
    assert_eq!(conjunction.cost(), 5);
    assert_eq!(conjunction.next_doc(), 3);
    assert_eq!(conjunction.advance(4), 9);
    assert_eq!(conjunction.next_doc(), 13);
    assert_eq!(conjunction.next_doc(), NO_MORE_DOCS);
}

#[test]
fn test_complement_iterator() {
    let segment = SegmentContext::new(0, 100, 10);
    let excluded = [101, 102, 105, 109];
    let inner: Box<dyn DocIdIterator + '_> = Box::new(SortedIdsIterator::new(&excluded, 100, 4));
    let mut complement = ComplementIterator::new(&segment, Some(inner));
    let mut docs = Vec::new();
    loop {
        let doc = complement.next_doc();
        if doc == NO_MORE_DOCS {
            break;
        }
        docs.push(doc);
    }
    assert_eq!(docs, vec![0, 3, 4, 6, 7, 8]);

    let mut everything = ComplementIterator::new(&segment, None);
    assert_eq!(everything.advance(4), 4);
    assert_eq!(everything.cost(), 10);
}

#[test]
fn test_match_all_predicate() {
    let segment = SegmentContext::new(0, 0, 3);
    let mut iter = MatchAllDocs.segment_iter(&segment).unwrap();
    assert_eq!(iter.next_doc(), 0);
    assert_eq!(iter.advance(2), 2);
    assert_eq!(iter.next_doc(), NO_MORE_DOCS);
    assert!(MatchAllDocs.segment_iter(&SegmentContext::new(1, 3, 0)).is_none());
    assert_eq!(MatchAllDocs.key().as_str(), "*:*");
}

#[test]
fn test_allocation_failure_propagates_through_queries() {
    let arena = Arena::new(
        ArenaConfig::default()
            .with_pooled_buffer_bytes(1 << 62)
            .with_mmap_threshold_bytes(usize::MAX),
    )
    .unwrap();
    let searcher = DocSetSearcher::builder()
        .arena(arena.clone())
        .add_segment(100)
        .build()
        .unwrap();

    let err = searcher.get_doc_set_for_queries(&[]).unwrap_err();
    assert!(err.is_allocation_failure());
    let queries = [ids_query("p", 1..10), ids_query("q", 5..6).negate()];
    let err = searcher.get_doc_set_for_queries(&queries).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::AllocationFailed { .. }));
    assert_eq!(arena.stats().live_buffers(), 0);
}
