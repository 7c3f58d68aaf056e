//! Accumulating scan results into a document set.

use docset_common::{Error, Result};
use docset_page_alloc::{Arena, ArenaBuffer};

use crate::{
    dense::DenseDocSet, doc_set::DocSet, memory, segment::SegmentContext,
    sorted_ints, sparse::SparseDocSet,
};

/// Receives the matches of a segment-by-segment scan.
pub trait Collector {
    /// Called before the first document of each segment.
    fn set_next_segment(&mut self, segment: &SegmentContext) -> Result<()>;

    /// Receives a segment-local document id.
    fn collect(&mut self, doc: u32) -> Result<()>;

    /// Called once after the last segment.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Builds a [`DocSet`] from unsorted, possibly repeated ids, choosing the
/// representation as it goes.
///
/// Ids are buffered in pooled scratch pages. Once more than
/// `collect_limit` ids have been buffered the collector promotes itself: it
/// allocates a bitset over the whole scan universe, folds everything buffered
/// so far into it, and from then on folds each full page instead of keeping
/// it. [`into_doc_set`](Self::into_doc_set) returns a sorted array when the
/// result has at most `small_set_size` members and the bitset otherwise.
pub struct AdaptiveCollector {
    arena: Arena,
    max_doc: u32,
    small_set_size: usize,
    collect_limit: usize,
    base: u32,
    buffer: ArenaBuffer,
    pos: usize,
    slots: usize,
    /// Full pages retained before promotion.
    pages: Vec<ArenaBuffer>,
    /// Ids held in `pages` or already folded into `bits`.
    global_count: usize,
    bits: Option<DenseDocSet>,
}

impl AdaptiveCollector {
    /// A collector for ids in `0..max_doc`.
    pub fn new(arena: &Arena, small_set_size: usize, max_doc: u32) -> Result<AdaptiveCollector> {
        Ok(AdaptiveCollector {
            arena: arena.clone(),
            max_doc,
            small_set_size,
            collect_limit: (small_set_size / 2 + 5).min(small_set_size),
            base: 0,
            buffer: memory::pooled_buffer(arena)?,
            pos: 0,
            slots: arena.pooled_slots::<u32>(),
            pages: Vec::new(),
            global_count: 0,
            bits: None,
        })
    }

    pub fn small_set_size(&self) -> usize {
        self.small_set_size
    }

    pub fn collect_limit(&self) -> usize {
        self.collect_limit
    }

    /// Ids received so far, duplicates included.
    pub fn collected(&self) -> usize {
        self.global_count + self.pos
    }

    pub fn is_promoted(&self) -> bool {
        self.bits.is_some()
    }

    fn page_full(&mut self) -> Result<()> {
        self.global_count += self.pos;
        if self.bits.is_none() && self.global_count > self.collect_limit {
            self.bits = Some(promote(&self.arena, self.max_doc, &mut self.pages)?);
            log::debug!(
                "collector promoted to dense after {} ids (limit {})",
                self.global_count,
                self.collect_limit
            );
        }
        match self.bits.as_mut() {
            Some(bits) => bits.set_bits(&self.buffer.as_slice::<u32>()[..self.pos]),
            None => {
                let fresh = memory::pooled_buffer(&self.arena)?;
                self.pages.push(std::mem::replace(&mut self.buffer, fresh));
            }
        }
        self.pos = 0;
        Ok(())
    }

    /// Finalizes the scan. Scratch pages not consumed by the result are
    /// returned to the arena.
    pub fn into_doc_set(self) -> Result<DocSet> {
        let AdaptiveCollector {
            arena,
            max_doc,
            small_set_size,
            collect_limit,
            buffer,
            pos,
            mut pages,
            global_count,
            mut bits,
            ..
        } = self;
        let total = global_count + pos;
        if bits.is_none() && total > collect_limit {
            bits = Some(promote(&arena, max_doc, &mut pages)?);
        }

        if let Some(mut bits) = bits {
            bits.set_bits(&buffer.as_slice::<u32>()[..pos]);
            drop(buffer);
            let size = bits.cardinality();
            if size <= small_set_size {
                log::debug!("collected {size} ids into a sorted array (from bitset)");
                return Ok(bits.to_sparse()?.into());
            }
            log::debug!("collected {size} ids into a bitset");
            return Ok(bits.into());
        }

        let mut ids = if pages.is_empty() {
            buffer
        } else {
            let mut all = memory::alloc_ids(&arena, total, false)?;
            let mut offset = 0;
            for page in &pages {
                let n = page.capacity_bytes() / 4;
                all.copy_from::<u32>(offset, page, 0, n);
                offset += n;
            }
            all.copy_from::<u32>(offset, &buffer, 0, pos);
            all
        };
        drop(pages);
        let len = sorted_ints::sort_dedup(&mut ids.as_mut_slice::<u32>()[..total]);
        log::debug!("collected {len} ids ({total} with duplicates) into a sorted array");
        Ok(SparseDocSet::adopt_trimmed(ids, len)?.into())
    }
}

/// Allocates the bitset and folds the retained pages into it.
fn promote(arena: &Arena, max_doc: u32, pages: &mut Vec<ArenaBuffer>) -> Result<DenseDocSet> {
    let mut bits = DenseDocSet::new(arena, max_doc as usize)?;
    for page in pages.drain(..) {
        bits.set_bits(page.as_slice::<u32>());
    }
    Ok(bits)
}

impl Collector for AdaptiveCollector {
    fn set_next_segment(&mut self, segment: &SegmentContext) -> Result<()> {
        self.base = segment.base;
        Ok(())
    }

    /// Fails with `InvalidOperand` when the global id falls outside
    /// `0..max_doc`; nothing is buffered in that case.
    #[inline]
    fn collect(&mut self, doc: u32) -> Result<()> {
        let id = match self.base.checked_add(doc) {
            Some(id) if id < self.max_doc => id,
            _ => {
                return Err(Error::invalid_operand(
                    "collect",
                    self.base as usize + doc as usize + 1,
                    self.max_doc as usize,
                ));
            }
        };
        if self.pos == self.slots {
            self.page_full()?;
        }
        self.buffer.as_mut_slice::<u32>()[self.pos] = id;
        self.pos += 1;
        Ok(())
    }
}

impl std::fmt::Debug for AdaptiveCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveCollector")
            .field("max_doc", &self.max_doc)
            .field("small_set_size", &self.small_set_size)
            .field("collected", &self.collected())
            .field("promoted", &self.is_promoted())
            .finish()
    }
}
