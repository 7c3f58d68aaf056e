use std::sync::Arc;

use crate::{
    predicate::FilterQuery,
    segment::{
        AcceptDocsIterator, AllDocsIterator, DocIdIterator, LiveDocs, NO_MORE_DOCS, SegmentContext,
    },
    top_filter::TopFilter,
};

/// Conjunction of an optional top filter and the clauses that were not
/// materialized. Residual clauses are kept in ascending cost order.
#[derive(Debug)]
pub struct CompositeFilter {
    top: Option<TopFilter>,
    residual: Vec<FilterQuery>,
}

impl CompositeFilter {
    pub fn new(top: Option<TopFilter>, mut residual: Vec<FilterQuery>) -> CompositeFilter {
        residual.sort_by_key(FilterQuery::cost);
        CompositeFilter { top, residual }
    }

    pub fn top(&self) -> Option<&TopFilter> {
        self.top.as_ref()
    }

    pub fn residual(&self) -> &[FilterQuery] {
        &self.residual
    }

    pub fn segment_iter<'a>(
        &'a mut self,
        segment: &SegmentContext,
        accept_docs: Option<&Arc<dyn LiveDocs>>,
    ) -> Option<Box<dyn DocIdIterator + 'a>> {
        let CompositeFilter { top, residual } = self;
        let mut iters: Vec<Box<dyn DocIdIterator + 'a>> = Vec::with_capacity(residual.len() + 1);
        if let Some(top) = top {
            iters.push(top.segment_iter(segment, None)?);
        }
        for query in residual.iter() {
            let iter = query.predicate().segment_iter(segment);
            if query.is_negated() {
                iters.push(Box::new(ComplementIterator::new(segment, iter)));
            } else {
                iters.push(iter?);
            }
        }
        let iter: Box<dyn DocIdIterator + 'a> = match iters.len() {
            0 => Box::new(segment.all_docs()),
            1 => iters.pop()?,
            _ => Box::new(ConjunctionIterator::new(iters)),
        };
        let accept = accept_docs.filter(|accept| !segment.is_default_live_docs(accept));
        Some(match accept {
            Some(accept) => Box::new(AcceptDocsIterator::new(iter, accept.clone())),
            None => iter,
        })
    }
}

/// Documents present in every one of its iterators.
///
/// The cheapest iterator leads; the others are advanced to its candidate and
/// any overshoot moves the lead forward again.
pub struct ConjunctionIterator<'a> {
    iters: Vec<Box<dyn DocIdIterator + 'a>>,
    /// Current document of each iterator, `None` before the first move.
    docs: Vec<Option<u32>>,
}

impl<'a> ConjunctionIterator<'a> {
    pub fn new(mut iters: Vec<Box<dyn DocIdIterator + 'a>>) -> ConjunctionIterator<'a> {
        iters.sort_by_key(|iter| iter.cost());
        let docs = vec![None; iters.len()];
        ConjunctionIterator { iters, docs }
    }

    fn align(&mut self, mut candidate: u32) -> u32 {
        'outer: loop {
            if candidate == NO_MORE_DOCS {
                return NO_MORE_DOCS;
            }
            for i in 1..self.iters.len() {
                let doc = match self.docs[i] {
                    Some(doc) if doc >= candidate => doc,
                    _ => {
                        let doc = self.iters[i].advance(candidate);
                        self.docs[i] = Some(doc);
                        doc
                    }
                };
                if doc > candidate {
                    if doc == NO_MORE_DOCS {
                        return NO_MORE_DOCS;
                    }
                    candidate = self.iters[0].advance(doc);
                    self.docs[0] = Some(candidate);
                    continue 'outer;
                }
            }
            return candidate;
        }
    }
}

impl DocIdIterator for ConjunctionIterator<'_> {
    fn next_doc(&mut self) -> u32 {
        let Some(lead) = self.iters.first_mut() else {
            return NO_MORE_DOCS;
        };
        let candidate = lead.next_doc();
        self.docs[0] = Some(candidate);
        self.align(candidate)
    }

    fn advance(&mut self, target: u32) -> u32 {
        let Some(lead) = self.iters.first_mut() else {
            return NO_MORE_DOCS;
        };
        let candidate = lead.advance(target);
        self.docs[0] = Some(candidate);
        self.align(candidate)
    }

    fn cost(&self) -> u64 {
        self.iters.first().map_or(0, |lead| lead.cost())
    }
}

/// Live documents of a segment that an inner iterator does not return.
pub struct ComplementIterator<'a> {
    all: AllDocsIterator,
    excluded: Option<Box<dyn DocIdIterator + 'a>>,
    excluded_doc: Option<u32>,
}

impl<'a> ComplementIterator<'a> {
    /// `excluded` of `None` excludes nothing.
    pub fn new(
        segment: &SegmentContext,
        excluded: Option<Box<dyn DocIdIterator + 'a>>,
    ) -> ComplementIterator<'a> {
        ComplementIterator {
            all: segment.all_docs(),
            excluded,
            excluded_doc: None,
        }
    }

    fn skip_excluded(&mut self, mut doc: u32) -> u32 {
        let Some(excluded) = self.excluded.as_mut() else {
            return doc;
        };
        while doc != NO_MORE_DOCS {
            let next_excluded = match self.excluded_doc {
                Some(ex) if ex >= doc => ex,
                _ => {
                    let ex = excluded.advance(doc);
                    self.excluded_doc = Some(ex);
                    ex
                }
            };
            if next_excluded != doc {
                return doc;
            }
            doc = self.all.next_doc();
        }
        NO_MORE_DOCS
    }
}

impl DocIdIterator for ComplementIterator<'_> {
    fn next_doc(&mut self) -> u32 {
        let doc = self.all.next_doc();
        self.skip_excluded(doc)
    }

    fn advance(&mut self, target: u32) -> u32 {
        let doc = self.all.advance(target);
        self.skip_excluded(doc)
    }

    fn cost(&self) -> u64 {
        self.all.cost()
    }
}
