//! Segment descriptions and the document-id iterators used to scan them.
//!
//! Ids handed to and returned from [`DocIdIterator`]s are segment-local;
//! adding [`SegmentContext::base`] yields the index-wide id.

use std::sync::Arc;

use crate::{dense::DenseDocSet, sorted_ints};

/// Returned by iterators once they are exhausted.
pub const NO_MORE_DOCS: u32 = u32::MAX;

/// Membership test over segment-local ids, typically the non-deleted docs.
pub trait LiveDocs: Send + Sync {
    fn is_live(&self, doc: u32) -> bool;
}

impl LiveDocs for DenseDocSet {
    fn is_live(&self, doc: u32) -> bool {
        self.exists(doc)
    }
}

/// One segment of an index: a window `[base, base + max_doc)` of global ids.
#[derive(Clone)]
pub struct SegmentContext {
    pub ord: usize,
    pub base: u32,
    pub max_doc: u32,
    /// `None` when every document in the segment is live.
    pub live_docs: Option<Arc<dyn LiveDocs>>,
}

impl SegmentContext {
    pub fn new(ord: usize, base: u32, max_doc: u32) -> SegmentContext {
        SegmentContext {
            ord,
            base,
            max_doc,
            live_docs: None,
        }
    }

    pub fn with_live_docs(mut self, live_docs: Arc<dyn LiveDocs>) -> SegmentContext {
        self.live_docs = Some(live_docs);
        self
    }

    /// One past the last global id of the segment.
    pub fn end(&self) -> u64 {
        self.base as u64 + self.max_doc as u64
    }

    pub fn is_live(&self, doc: u32) -> bool {
        self.live_docs.as_ref().is_none_or(|live| live.is_live(doc))
    }

    /// Whether `accept_docs` is this segment's own live-docs instance, in
    /// which case filtering by it again is redundant.
    pub fn is_default_live_docs(&self, accept_docs: &Arc<dyn LiveDocs>) -> bool {
        self.live_docs
            .as_ref()
            .is_some_and(|live| Arc::ptr_eq(live, accept_docs))
    }

    /// Every live document of the segment.
    pub fn all_docs(&self) -> AllDocsIterator {
        AllDocsIterator {
            next: 0,
            max_doc: self.max_doc,
            live_docs: self.live_docs.clone(),
        }
    }
}

impl std::fmt::Debug for SegmentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentContext")
            .field("ord", &self.ord)
            .field("base", &self.base)
            .field("max_doc", &self.max_doc)
            .field("has_deletions", &self.live_docs.is_some())
            .finish()
    }
}

/// Forward-only iteration over ascending segment-local ids.
pub trait DocIdIterator {
    /// Moves to the next document, or returns [`NO_MORE_DOCS`].
    fn next_doc(&mut self) -> u32;

    /// Moves to the first document at or after `target`, or returns
    /// [`NO_MORE_DOCS`]. `target` must be beyond the current document.
    fn advance(&mut self, target: u32) -> u32;

    /// Estimated number of documents this iterator yields.
    fn cost(&self) -> u64;
}

impl<I: DocIdIterator + ?Sized> DocIdIterator for Box<I> {
    fn next_doc(&mut self) -> u32 {
        (**self).next_doc()
    }

    fn advance(&mut self, target: u32) -> u32 {
        (**self).advance(target)
    }

    fn cost(&self) -> u64 {
        (**self).cost()
    }
}

/// Iterates a slice of global ids that all fall within one segment.
pub struct SortedIdsIterator<'a> {
    ids: &'a [u32],
    base: u32,
    next: usize,
    cost: u64,
}

impl<'a> SortedIdsIterator<'a> {
    pub fn new(ids: &'a [u32], base: u32, cost: u64) -> SortedIdsIterator<'a> {
        debug_assert!(ids.first().is_none_or(|&first| first >= base));
        SortedIdsIterator {
            ids,
            base,
            next: 0,
            cost,
        }
    }
}

impl DocIdIterator for SortedIdsIterator<'_> {
    fn next_doc(&mut self) -> u32 {
        match self.ids.get(self.next) {
            Some(&id) => {
                self.next += 1;
                id - self.base
            }
            None => NO_MORE_DOCS,
        }
    }

    fn advance(&mut self, target: u32) -> u32 {
        let global = self.base as u64 + target as u64;
        if global > u32::MAX as u64 {
            self.next = self.ids.len();
            return NO_MORE_DOCS;
        }
        let global = global as u32;
        // The next id is the most likely answer; only search past it.
        if let Some(&id) = self.ids.get(self.next)
            && id < global
        {
            let rest = &self.ids[self.next + 1..];
            self.next += 1 + sorted_ints::find_index(rest, global);
        }
        self.next_doc()
    }

    fn cost(&self) -> u64 {
        self.cost
    }
}

/// Every live document `0..max_doc` of a segment.
pub struct AllDocsIterator {
    next: u32,
    max_doc: u32,
    live_docs: Option<Arc<dyn LiveDocs>>,
}

impl DocIdIterator for AllDocsIterator {
    fn next_doc(&mut self) -> u32 {
        while self.next < self.max_doc {
            let doc = self.next;
            self.next += 1;
            if self.live_docs.as_ref().is_none_or(|live| live.is_live(doc)) {
                return doc;
            }
        }
        NO_MORE_DOCS
    }

    fn advance(&mut self, target: u32) -> u32 {
        self.next = self.next.max(target);
        self.next_doc()
    }

    fn cost(&self) -> u64 {
        self.max_doc as u64
    }
}

/// Drops documents rejected by an extra membership filter.
pub struct AcceptDocsIterator<'a> {
    inner: Box<dyn DocIdIterator + 'a>,
    accept_docs: Arc<dyn LiveDocs>,
}

impl<'a> AcceptDocsIterator<'a> {
    pub fn new(
        inner: Box<dyn DocIdIterator + 'a>,
        accept_docs: Arc<dyn LiveDocs>,
    ) -> AcceptDocsIterator<'a> {
        AcceptDocsIterator { inner, accept_docs }
    }

    fn skip_rejected(&mut self, mut doc: u32) -> u32 {
        while doc != NO_MORE_DOCS && !self.accept_docs.is_live(doc) {
            doc = self.inner.next_doc();
        }
        doc
    }
}

impl DocIdIterator for AcceptDocsIterator<'_> {
    fn next_doc(&mut self) -> u32 {
        let doc = self.inner.next_doc();
        self.skip_rejected(doc)
    }

    fn advance(&mut self, target: u32) -> u32 {
        let doc = self.inner.advance(target);
        self.skip_rejected(doc)
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }
}
