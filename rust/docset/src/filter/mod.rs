//! Compiled filter plans.
//!
//! [`FilterPlanner`] turns a list of [`FilterQuery`](crate::FilterQuery)
//! clauses into a [`ProcessedFilter`]: either a materialized answer, or a
//! per-segment filter to scan through plus an optional post-filter chain.

mod composite;
mod planner;

use std::sync::Arc;

pub use composite::{ComplementIterator, CompositeFilter, ConjunctionIterator};
pub use planner::FilterPlanner;

use crate::{
    doc_set::DocSet,
    post_filter::PostFilterChain,
    segment::{DocIdIterator, LiveDocs, SegmentContext},
    top_filter::TopFilter,
};

/// What a scan iterates per segment.
#[derive(Debug)]
pub enum SegmentFilter {
    Top(TopFilter),
    Composite(CompositeFilter),
}

impl SegmentFilter {
    /// Matching documents of `segment` as segment-local ids, or `None` when
    /// the segment has no matches.
    pub fn segment_iter<'a>(
        &'a mut self,
        segment: &SegmentContext,
        accept_docs: Option<&Arc<dyn LiveDocs>>,
    ) -> Option<Box<dyn DocIdIterator + 'a>> {
        match self {
            SegmentFilter::Top(top) => top.segment_iter(segment, accept_docs),
            SegmentFilter::Composite(composite) => composite.segment_iter(segment, accept_docs),
        }
    }
}

/// The outcome of planning a list of filter clauses.
///
/// When `answer` is set it is the exact match set and `filter`, if present,
/// is its top filter. Otherwise the matches are whatever a scan through
/// `filter` (all live documents when `None`) lets through `post_filter`.
/// Dropping the plan releases every set it holds.
#[derive(Debug, Default)]
pub struct ProcessedFilter {
    pub(crate) answer: Option<DocSet>,
    pub(crate) filter: Option<SegmentFilter>,
    pub(crate) post_filter: Option<PostFilterChain>,
}

impl ProcessedFilter {
    pub fn answer(&self) -> Option<&DocSet> {
        self.answer.as_ref()
    }

    pub fn take_answer(&mut self) -> Option<DocSet> {
        self.answer.take()
    }

    pub fn filter(&self) -> Option<&SegmentFilter> {
        self.filter.as_ref()
    }

    pub fn filter_mut(&mut self) -> Option<&mut SegmentFilter> {
        self.filter.as_mut()
    }

    pub fn post_filter(&self) -> Option<&PostFilterChain> {
        self.post_filter.as_ref()
    }

    pub fn post_filter_mut(&mut self) -> Option<&mut PostFilterChain> {
        self.post_filter.as_mut()
    }
}
