//! Filter predicates and the query descriptors the planner consumes.

use std::sync::Arc;

use docset_common::{Error, Result};

use crate::{
    post_filter::PostFilter,
    segment::{AcceptDocsIterator, DocIdIterator, SegmentContext, SortedIdsIterator},
    sorted_ints,
};

/// Cache identity of a predicate. Equal keys must denote equal match sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredicateKey(Arc<str>);

impl PredicateKey {
    pub fn new(key: impl Into<Arc<str>>) -> PredicateKey {
        PredicateKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PredicateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something that selects documents segment by segment.
pub trait Predicate: Send + Sync + std::fmt::Debug {
    fn key(&self) -> PredicateKey;

    /// Matching live documents of `segment` as segment-local ids, or `None`
    /// when nothing in the segment matches.
    fn segment_iter<'a>(&'a self, segment: &SegmentContext)
    -> Option<Box<dyn DocIdIterator + 'a>>;

    /// Predicates that can run as a streaming collector return themselves.
    fn as_post_filter(&self) -> Option<&dyn PostFilter> {
        None
    }
}

/// Matches every live document.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchAllDocs;

impl MatchAllDocs {
    pub const KEY: &'static str = "*:*";
}

impl Predicate for MatchAllDocs {
    fn key(&self) -> PredicateKey {
        PredicateKey::new(Self::KEY)
    }

    fn segment_iter<'a>(
        &'a self,
        segment: &SegmentContext,
    ) -> Option<Box<dyn DocIdIterator + 'a>> {
        if segment.max_doc == 0 {
            return None;
        }
        Some(Box::new(segment.all_docs()))
    }
}

/// Matches an explicit list of global document ids.
#[derive(Debug, Clone)]
pub struct DocIdsPredicate {
    key: PredicateKey,
    ids: Vec<u32>,
}

impl DocIdsPredicate {
    /// `ids` may be unsorted and contain duplicates.
    pub fn new(key: impl Into<Arc<str>>, ids: impl IntoIterator<Item = u32>) -> DocIdsPredicate {
        let mut ids = ids.into_iter().collect::<Vec<_>>();
        let len = sorted_ints::sort_dedup(&mut ids);
        ids.truncate(len);
        DocIdsPredicate {
            key: PredicateKey::new(key),
            ids,
        }
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }
}

impl Predicate for DocIdsPredicate {
    fn key(&self) -> PredicateKey {
        self.key.clone()
    }

    fn segment_iter<'a>(
        &'a self,
        segment: &SegmentContext,
    ) -> Option<Box<dyn DocIdIterator + 'a>> {
        let range = sorted_ints::find_range(&self.ids, segment.base, segment.end());
        if range.is_empty() {
            return None;
        }
        let ids = &self.ids[range];
        let iter = SortedIdsIterator::new(ids, segment.base, ids.len() as u64);
        Some(match &segment.live_docs {
            Some(live) => Box::new(AcceptDocsIterator::new(Box::new(iter), live.clone())),
            None => Box::new(iter),
        })
    }
}

/// One filter clause as handed to the planner.
///
/// A clause is cacheable by default: its positive match set is materialized
/// (or fetched from the filter cache) and combined with the other sets.
/// Uncached clauses are evaluated during the scan instead, either as a
/// residual iterator or, when the predicate supports it and the cost reaches
/// the post-filter threshold, as a streaming post-filter.
#[derive(Debug, Clone)]
pub struct FilterQuery {
    predicate: Arc<dyn Predicate>,
    negated: bool,
    cache: bool,
    cost: i32,
}

impl FilterQuery {
    pub fn new(predicate: Arc<dyn Predicate>) -> FilterQuery {
        FilterQuery {
            predicate,
            negated: false,
            cache: true,
            cost: 0,
        }
    }

    /// Matches the complement of the predicate.
    pub fn negate(mut self) -> FilterQuery {
        self.negated = !self.negated;
        self
    }

    pub fn with_cache(mut self, cache: bool) -> FilterQuery {
        self.cache = cache;
        self
    }

    pub fn with_cost(mut self, cost: i32) -> FilterQuery {
        self.cost = cost;
        self
    }

    pub fn predicate(&self) -> &Arc<dyn Predicate> {
        &self.predicate
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn is_cached(&self) -> bool {
        self.cache
    }

    pub fn cost(&self) -> i32 {
        self.cost
    }

    /// The post-filter to run for this clause, if it qualifies as one.
    pub fn post_filter(&self, cost_threshold: i32) -> Option<&dyn PostFilter> {
        if self.cache || self.cost < cost_threshold {
            return None;
        }
        self.predicate.as_post_filter()
    }

    pub(crate) fn validate(&self, cost_threshold: i32) -> Result<()> {
        if self.cost < 0 {
            return Err(Error::invalid_arg(
                "cost",
                format!("negative cost {} for {}", self.cost, self.predicate.key()),
            ));
        }
        if self.negated && self.post_filter(cost_threshold).is_some() {
            return Err(Error::unsupported_filter(format!(
                "post-filter {} cannot be negated",
                self.predicate.key()
            )));
        }
        Ok(())
    }
}
