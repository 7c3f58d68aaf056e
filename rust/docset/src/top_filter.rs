//! Segment-relative views of a [`DocSet`] for index scans.
//!
//! A scan visits segments in ascending `base` order and asks the filter for
//! an iterator over each one. Dense sets answer with a bit scan clamped to the
//! segment window. Sparse sets locate the window by binary search, starting
//! from where the previous segment ended; if segments arrive out of order the
//! cursor is reset and the search starts over from the front.

use std::sync::Arc;

use crate::{
    dense::{DenseDocSet, bits2words},
    doc_set::{DocIdSet, DocSet, DocSetRepr},
    segment::{
        AcceptDocsIterator, DocIdIterator, LiveDocs, NO_MORE_DOCS, SegmentContext,
        SortedIdsIterator,
    },
    sorted_ints,
};

/// Per-segment iteration over a shared [`DocSet`].
pub struct TopFilter {
    set: DocSet,
    /// One past the last id index consumed by the previous segment.
    last_end: usize,
}

impl TopFilter {
    pub fn new(set: DocSet) -> TopFilter {
        TopFilter { set, last_end: 0 }
    }

    pub fn doc_set(&self) -> &DocSet {
        &self.set
    }

    /// Iterates the members within `segment` as segment-local ids, or returns
    /// `None` when the segment holds none of them.
    ///
    /// `accept_docs` filters further unless it is the segment's own live-docs
    /// instance; the set itself is expected to contain live documents only.
    pub fn segment_iter<'a>(
        &'a mut self,
        segment: &SegmentContext,
        accept_docs: Option<&Arc<dyn LiveDocs>>,
    ) -> Option<Box<dyn DocIdIterator + 'a>> {
        let accept_docs = accept_docs
            .filter(|accept| !segment.is_default_live_docs(accept))
            .cloned();
        let TopFilter { set, last_end } = self;
        let iter: Box<dyn DocIdIterator + 'a> = match set.repr() {
            DocSetRepr::Dense(bits) => Box::new(DenseSegmentIter::new(bits, segment)),
            DocSetRepr::Sparse(ids) => {
                let range = sparse_segment_range(ids.ids(), last_end, segment);
                if range.is_empty() {
                    return None;
                }
                Box::new(SortedIdsIterator::new(
                    &ids.ids()[range],
                    segment.base,
                    ids.len() as u64,
                ))
            }
            DocSetRepr::Foreign { set, .. } => {
                Box::new(ForeignSegmentIter::new(set.as_ref(), segment))
            }
        };
        Some(match accept_docs {
            Some(accept) => Box::new(AcceptDocsIterator::new(iter, accept)),
            None => iter,
        })
    }

    /// Random-access membership over `segment`, available for bitsets only.
    pub fn bits(&self, segment: &SegmentContext) -> Option<SegmentBits<'_>> {
        self.set.as_dense().map(|bits| SegmentBits {
            bits,
            base: segment.base,
            len: segment.max_doc,
        })
    }
}

impl std::fmt::Debug for TopFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopFilter")
            .field("size", &self.set.size())
            .field("last_end", &self.last_end)
            .finish()
    }
}

/// Locates the ids inside `segment`, reusing the end of the previous lookup
/// as the starting point.
fn sparse_segment_range(
    ids: &[u32],
    last_end: &mut usize,
    segment: &SegmentContext,
) -> std::ops::Range<usize> {
    let mut start = (*last_end).min(ids.len());
    if start > 0 && ids[start - 1] >= segment.base {
        log::warn!(
            "segment {} (base {}) visited out of order, restarting sparse filter cursor",
            segment.ord,
            segment.base
        );
        start = 0;
    }
    start += sorted_ints::find_index(&ids[start..], segment.base);
    // At most max_doc distinct ids fit in the segment.
    let limit = start.saturating_add(segment.max_doc as usize).min(ids.len());
    let window = &ids[start..limit];
    let end = start + window.partition_point(|&id| (id as u64) < segment.end());
    *last_end = end;
    start..end
}

/// Bit scan over one segment window of a [`DenseDocSet`].
struct DenseSegmentIter<'a> {
    bits: &'a DenseDocSet,
    base: usize,
    /// Exclusive upper bound of the window, clamped to the capacity.
    end: usize,
    /// Global position to resume scanning from.
    next: usize,
    cost: u64,
}

impl<'a> DenseSegmentIter<'a> {
    fn new(bits: &'a DenseDocSet, segment: &SegmentContext) -> DenseSegmentIter<'a> {
        let base = segment.base as usize;
        let end = (segment.end() as usize).min(bits.capacity());
        let cost = match bits.cached_cardinality() {
            Some(size) if bits.capacity() > 0 => {
                let share =
                    (bits2words(segment.max_doc as usize) * 64) as f64 / bits.capacity() as f64;
                (size as f64 * share) as u64
            }
            _ => segment.max_doc as u64,
        };
        DenseSegmentIter {
            bits,
            base,
            end,
            next: base,
            cost,
        }
    }

    fn scan_from(&mut self, from: usize) -> u32 {
        match self.bits.next_set_bit(from) {
            Some(index) if (index as usize) < self.end => {
                self.next = index as usize + 1;
                (index as usize - self.base) as u32
            }
            _ => {
                self.next = self.end;
                NO_MORE_DOCS
            }
        }
    }
}

impl DocIdIterator for DenseSegmentIter<'_> {
    fn next_doc(&mut self) -> u32 {
        self.scan_from(self.next)
    }

    fn advance(&mut self, target: u32) -> u32 {
        let from = self.next.max(self.base + target as usize);
        self.scan_from(from)
    }

    fn cost(&self) -> u64 {
        self.cost
    }
}

/// Linear scan of a foreign set clamped to one segment window.
struct ForeignSegmentIter<'a> {
    ids: std::iter::Peekable<Box<dyn Iterator<Item = u32> + 'a>>,
    base: u32,
    end: u64,
    cost: u64,
}

impl<'a> ForeignSegmentIter<'a> {
    fn new(set: &'a dyn DocIdSet, segment: &SegmentContext) -> ForeignSegmentIter<'a> {
        ForeignSegmentIter {
            ids: set.doc_ids().peekable(),
            base: segment.base,
            end: segment.end(),
            cost: set.size() as u64,
        }
    }
}

impl DocIdIterator for ForeignSegmentIter<'_> {
    fn next_doc(&mut self) -> u32 {
        self.advance(0)
    }

    fn advance(&mut self, target: u32) -> u32 {
        let global = self.base as u64 + target as u64;
        while let Some(&id) = self.ids.peek() {
            if id as u64 >= self.end {
                break;
            }
            self.ids.next();
            if id as u64 >= global {
                return id - self.base;
            }
        }
        NO_MORE_DOCS
    }

    fn cost(&self) -> u64 {
        self.cost
    }
}

/// Random-access view of one segment window of a bitset.
pub struct SegmentBits<'a> {
    bits: &'a DenseDocSet,
    base: u32,
    len: u32,
}

impl SegmentBits<'_> {
    /// Membership of the segment-local `doc`.
    pub fn get(&self, doc: u32) -> bool {
        doc < self.len && self.bits.exists(self.base + doc)
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
