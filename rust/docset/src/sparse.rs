//! Sorted document-id arrays over arena memory.

use docset_common::{Error, Result, verify_arg};
use docset_page_alloc::{Arena, ArenaBuffer};

use crate::{dense::DenseDocSet, memory, sorted_ints};

/// A strictly ascending array of document ids.
///
/// The backing buffer may be longer than `len`; only the prefix is
/// meaningful. Set algebra between two sparse sets runs on
/// [`sorted_ints`](crate::sorted_ints) kernels.
pub struct SparseDocSet {
    ids: ArenaBuffer,
    len: usize,
}

impl SparseDocSet {
    pub fn empty(arena: &Arena) -> Result<SparseDocSet> {
        Ok(SparseDocSet {
            ids: memory::alloc_ids(arena, 0, false)?,
            len: 0,
        })
    }

    /// Copies `ids`, which must be strictly ascending.
    pub fn from_sorted(arena: &Arena, ids: &[u32]) -> Result<SparseDocSet> {
        verify_arg!(ids, sorted_ints::is_strictly_ascending(ids));
        let mut buffer = memory::alloc_ids(arena, ids.len(), false)?;
        buffer.as_mut_slice::<u32>().copy_from_slice(ids);
        Ok(SparseDocSet {
            ids: buffer,
            len: ids.len(),
        })
    }

    /// Takes ownership of `buffer`, whose first `len` ids must be strictly
    /// ascending. No copy is made.
    pub fn from_buffer(buffer: ArenaBuffer, len: usize) -> Result<SparseDocSet> {
        let capacity = buffer.capacity_bytes() / 4;
        if len > capacity {
            return Err(Error::invalid_arg(
                "len",
                format!("{len} ids exceed buffer capacity of {capacity}"),
            ));
        }
        let set = SparseDocSet { ids: buffer, len };
        debug_assert!(sorted_ints::is_strictly_ascending(set.ids()));
        Ok(set)
    }

    /// Fills a fresh buffer of `capacity` ids through `fill`, then trims it
    /// when more than 1/16 of it went unused.
    pub(crate) fn build(
        arena: &Arena,
        capacity: usize,
        fill: impl FnOnce(&mut [u32]) -> usize,
    ) -> Result<SparseDocSet> {
        let mut buffer = memory::alloc_ids(arena, capacity, false)?;
        let len = fill(buffer.as_mut_slice::<u32>());
        Self::adopt_trimmed(buffer, len)
    }

    /// Adopts `buffer`, moving its `len` ids into an exact-size allocation if
    /// it is a pooled scratch buffer or mostly unused.
    pub(crate) fn adopt_trimmed(buffer: ArenaBuffer, len: usize) -> Result<SparseDocSet> {
        let capacity = buffer.capacity_bytes() / 4;
        let buffer = if buffer.is_pooled() || len < capacity - capacity / 16 {
            memory::shrink(buffer, len * 4)?
        } else {
            buffer
        };
        Self::from_buffer(buffer, len)
    }

    pub fn arena(&self) -> &Arena {
        self.ids.arena()
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids.as_slice::<u32>()[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Approximate memory footprint in bytes.
    pub fn mem_size(&self) -> usize {
        self.len * 4 + 16
    }

    pub fn first(&self) -> Option<u32> {
        self.ids().first().copied()
    }

    pub fn last(&self) -> Option<u32> {
        self.ids().last().copied()
    }

    pub fn exists(&self, id: u32) -> bool {
        self.ids().binary_search(&id).is_ok()
    }

    /// Index of `id`, or where it would be inserted.
    pub fn find_index(&self, id: u32) -> usize {
        sorted_ints::find_index(self.ids(), id)
    }

    pub fn iter(&self) -> std::iter::Copied<std::slice::Iter<'_, u32>> {
        self.ids().iter().copied()
    }

    pub fn intersection_size(&self, other: &SparseDocSet) -> usize {
        sorted_ints::intersection_size(self.ids(), other.ids())
    }

    pub fn intersects(&self, other: &SparseDocSet) -> bool {
        sorted_ints::intersects(self.ids(), other.ids())
    }

    pub fn intersection(&self, other: &SparseDocSet) -> Result<SparseDocSet> {
        let (a, b) = (self.ids(), other.ids());
        Self::build(self.arena(), a.len().min(b.len()), |out| {
            sorted_ints::intersection_into(a, b, out)
        })
    }

    pub fn and_not(&self, other: &SparseDocSet) -> Result<SparseDocSet> {
        let (a, b) = (self.ids(), other.ids());
        Self::build(self.arena(), a.len(), |out| {
            sorted_ints::and_not_into(a, b, out)
        })
    }

    pub fn union(&self, other: &SparseDocSet) -> Result<SparseDocSet> {
        let (a, b) = (self.ids(), other.ids());
        Self::build(self.arena(), a.len() + b.len(), |out| {
            sorted_ints::union_into(a, b, out)
        })
    }

    pub fn xor(&self, other: &SparseDocSet) -> Result<SparseDocSet> {
        let (a, b) = (self.ids(), other.ids());
        Self::build(self.arena(), a.len() + b.len(), |out| {
            sorted_ints::xor_into(a, b, out)
        })
    }

    /// Keeps the ids accepted by `keep`.
    pub fn filter(&self, mut keep: impl FnMut(u32) -> bool) -> Result<SparseDocSet> {
        let ids = self.ids();
        Self::build(self.arena(), ids.len(), |out| {
            let mut k = 0;
            for &id in ids {
                if keep(id) {
                    out[k] = id;
                    k += 1;
                }
            }
            k
        })
    }

    /// Builds a bitset of capacity `num_bits` holding the same ids.
    pub fn to_dense(&self, num_bits: usize) -> Result<DenseDocSet> {
        let mut bits = DenseDocSet::new(self.arena(), num_bits)?;
        if let Some(last) = self.last()
            && last as usize >= bits.capacity()
        {
            return Err(Error::invalid_operand(
                "to_dense",
                last as usize + 1,
                bits.capacity(),
            ));
        }
        bits.set_bits(self.ids());
        Ok(bits)
    }
}

impl std::fmt::Debug for SparseDocSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseDocSet")
            .field("len", &self.len)
            .field("first", &self.first())
            .field("last", &self.last())
            .finish()
    }
}
