use docset_common::Result;

use crate::{
    doc_set::DocSet,
    filter::{CompositeFilter, ProcessedFilter, SegmentFilter},
    post_filter::PostFilterChain,
    predicate::FilterQuery,
    searcher::DocSetSearcher,
    top_filter::TopFilter,
};

/// Combines filter clauses into a [`ProcessedFilter`].
///
/// Cached clauses are resolved to their positive sets through the searcher's
/// filter cache. The smallest positive set seeds the answer; negative sets are
/// subtracted from it first, then the remaining positives are intersected in.
/// Uncached clauses become a residual conjunction evaluated during the scan,
/// and uncached clauses that qualify as post-filters are chained in ascending
/// cost order.
pub struct FilterPlanner<'s> {
    searcher: &'s DocSetSearcher,
}

impl<'s> FilterPlanner<'s> {
    pub fn new(searcher: &'s DocSetSearcher) -> FilterPlanner<'s> {
        FilterPlanner { searcher }
    }

    /// Plans `queries`, with `set_filter` as an extra positive set.
    pub fn plan(&self, set_filter: Option<&DocSet>, queries: &[FilterQuery]) -> Result<ProcessedFilter> {
        let threshold = self.searcher.config().post_filter_cost_threshold;
        for query in queries {
            query.validate(threshold)?;
        }
        let use_cache = self.searcher.uses_filter_cache();

        let mut positives = set_filter.into_iter().cloned().collect::<Vec<_>>();
        let mut negatives = Vec::new();
        let mut residual = Vec::new();
        let mut post = Vec::new();
        for query in queries {
            if !query.is_cached() {
                if query.post_filter(threshold).is_some() {
                    post.push(query);
                } else {
                    residual.push(query.clone());
                }
                continue;
            }
            if !use_cache {
                residual.push(query.clone());
                continue;
            }
            let set = self.searcher.get_positive_doc_set(query.predicate().as_ref())?;
            if query.is_negated() {
                negatives.push(set);
            } else {
                positives.push(set);
            }
        }
        log::trace!(
            "partitioned {} filters: {} positive, {} negative, {} residual, {} post",
            queries.len(),
            positives.len(),
            negatives.len(),
            residual.len(),
            post.len()
        );

        let smallest = positives
            .iter()
            .enumerate()
            .min_by_key(|(_, set)| set.size())
            .map(|(i, _)| i);
        let mut seed = match smallest {
            Some(i) => Some(positives.swap_remove(i)),
            None if !negatives.is_empty() => Some(self.searcher.match_all()?),
            None => None,
        };
        if let Some(answer) = seed.as_mut() {
            log::trace!("seeded with {} docs", answer.size());
            for negative in &negatives {
                *answer = answer.and_not(negative)?;
            }
            for positive in &positives {
                *answer = answer.intersection(positive)?;
            }
        }
        drop(negatives);
        drop(positives);

        let mut plan = ProcessedFilter::default();
        if !residual.is_empty() {
            log::trace!("residual conjunction over {} filters", residual.len());
            plan.filter = Some(SegmentFilter::Composite(CompositeFilter::new(
                seed.map(TopFilter::new),
                residual,
            )));
        } else if post.is_empty() {
            let answer = match seed {
                Some(answer) => answer,
                None => self.searcher.match_all()?,
            };
            log::trace!("materialized answer with {} docs", answer.size());
            plan.filter = Some(SegmentFilter::Top(answer.top_filter()));
            plan.answer = Some(answer);
            return Ok(plan);
        } else {
            plan.filter = seed.map(|seed| SegmentFilter::Top(TopFilter::new(seed)));
        }

        if !post.is_empty() {
            post.sort_by_key(|query| query.cost());
            let stages = post
                .iter()
                .filter_map(|query| query.post_filter(threshold))
                .map(|post_filter| post_filter.collector())
                .collect();
            plan.post_filter = Some(PostFilterChain::new(stages));
            log::trace!("post-filter chain of {} stages", post.len());
        }
        Ok(plan)
    }
}
