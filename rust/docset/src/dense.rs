//! Fixed-capacity bitset over arena memory.

use std::{
    ops::Range,
    sync::atomic::{AtomicU64, Ordering},
};

use docset_common::{Error, Result, verify_arg};
use docset_page_alloc::{Arena, ArenaBuffer};

use crate::{memory, sparse::SparseDocSet};

const UNKNOWN_SIZE: u64 = u64::MAX;

/// Number of 64-bit words needed to hold `num_bits` bits.
#[inline]
pub fn bits2words(num_bits: usize) -> usize {
    num_bits.div_ceil(64)
}

#[inline]
fn bit_position(index: u32) -> (usize, u64) {
    ((index >> 6) as usize, 1u64 << (index & 63))
}

/// A bitset of `wlen * 64` bits, one bit per document id.
///
/// The capacity is fixed at construction. Pairwise kernels require both
/// operands to have the same word count and report
/// [`ErrorKind::InvalidOperand`](docset_common::ErrorKind::InvalidOperand)
/// otherwise.
///
/// The cardinality is computed lazily and cached; every mutator clears the
/// cache. Mutators take `&mut self`, so they are only reachable while the set
/// is uniquely owned (before it is published as a [`DocSet`](crate::DocSet)).
pub struct DenseDocSet {
    words: ArenaBuffer,
    wlen: usize,
    size: AtomicU64,
}

impl DenseDocSet {
    /// Creates an empty set able to hold ids `0..num_bits` (rounded up to a
    /// whole word).
    pub fn new(arena: &Arena, num_bits: usize) -> Result<DenseDocSet> {
        let wlen = bits2words(num_bits);
        Ok(DenseDocSet {
            words: memory::alloc_words(arena, wlen)?,
            wlen,
            size: AtomicU64::new(0),
        })
    }

    pub fn from_words(arena: &Arena, words: &[u64]) -> Result<DenseDocSet> {
        let mut set = DenseDocSet {
            words: memory::alloc_words(arena, words.len())?,
            wlen: words.len(),
            size: AtomicU64::new(UNKNOWN_SIZE),
        };
        set.words_mut().copy_from_slice(words);
        Ok(set)
    }

    /// Creates a set of capacity `num_bits` holding `ids`.
    pub fn from_ids(
        arena: &Arena,
        num_bits: usize,
        ids: impl IntoIterator<Item = u32>,
    ) -> Result<DenseDocSet> {
        let mut set = DenseDocSet::new(arena, num_bits)?;
        let capacity = set.capacity();
        for id in ids {
            verify_arg!(ids, (id as usize) < capacity);
            set.fast_set(id);
        }
        Ok(set)
    }

    /// Duplicates the set. The copy is not zeroed first.
    pub fn try_clone(&self) -> Result<DenseDocSet> {
        Ok(DenseDocSet {
            words: memory::clone_buffer(&self.words)?,
            wlen: self.wlen,
            size: AtomicU64::new(self.size.load(Ordering::Relaxed)),
        })
    }

    /// Copies the set into a bitset of capacity `num_bits`.
    ///
    /// Fails with `InvalidOperand` if shrinking would drop a set bit.
    pub fn resized(&self, num_bits: usize) -> Result<DenseDocSet> {
        let wlen = bits2words(num_bits);
        if wlen == self.wlen {
            return self.try_clone();
        }
        let keep = wlen.min(self.wlen);
        if self.words()[keep..].iter().any(|&w| w != 0) {
            return Err(Error::invalid_operand("resized", self.wlen, wlen));
        }
        let mut set = DenseDocSet::new(self.arena(), num_bits)?;
        set.words_mut()[..keep].copy_from_slice(&self.words()[..keep]);
        Ok(set)
    }

    pub fn arena(&self) -> &Arena {
        self.words.arena()
    }

    pub fn wlen(&self) -> usize {
        self.wlen
    }

    /// Number of addressable bits.
    pub fn capacity(&self) -> usize {
        self.wlen * 64
    }

    pub fn words(&self) -> &[u64] {
        self.words.as_slice()
    }

    fn words_mut(&mut self) -> &mut [u64] {
        *self.size.get_mut() = UNKNOWN_SIZE;
        self.words.as_mut_slice()
    }

    /// Approximate memory footprint in bytes.
    pub fn mem_size(&self) -> usize {
        self.wlen * 8 + 16
    }

    /// # Panics
    ///
    /// Panics if `index` is outside the capacity.
    #[inline]
    pub fn fast_get(&self, index: u32) -> bool {
        let (word, mask) = bit_position(index);
        self.words()[word] & mask != 0
    }

    /// Bounds-checked membership test: ids past the capacity are absent.
    #[inline]
    pub fn exists(&self, index: u32) -> bool {
        (index as usize) < self.capacity() && self.fast_get(index)
    }

    #[inline]
    pub fn fast_set(&mut self, index: u32) {
        let (word, mask) = bit_position(index);
        self.words_mut()[word] |= mask;
    }

    #[inline]
    pub fn fast_clear(&mut self, index: u32) {
        let (word, mask) = bit_position(index);
        self.words_mut()[word] &= !mask;
    }

    /// Sets the bit and returns its previous value.
    #[inline]
    pub fn get_and_set(&mut self, index: u32) -> bool {
        let (word, mask) = bit_position(index);
        let words = self.words_mut();
        let previous = words[word] & mask != 0;
        words[word] |= mask;
        previous
    }

    #[inline]
    pub fn fast_flip(&mut self, index: u32) {
        let (word, mask) = bit_position(index);
        self.words_mut()[word] ^= mask;
    }

    /// Flips the bit and returns its new value.
    #[inline]
    pub fn flip_and_get(&mut self, index: u32) -> bool {
        let (word, mask) = bit_position(index);
        let words = self.words_mut();
        words[word] ^= mask;
        words[word] & mask != 0
    }

    /// Flips every bit in `range`.
    ///
    /// # Panics
    ///
    /// Panics if the range extends past the capacity.
    pub fn flip(&mut self, range: Range<usize>) {
        let Range { start, end } = range;
        if start >= end {
            return;
        }
        assert!(
            end <= self.capacity(),
            "flip range end {end} out of bounds (capacity {})",
            self.capacity()
        );
        let start_word = start >> 6;
        let end_word = (end - 1) >> 6;
        let start_mask = u64::MAX << (start & 63);
        let end_mask = u64::MAX >> ((64 - (end & 63)) & 63);
        let words = self.words_mut();
        if start_word == end_word {
            words[start_word] ^= start_mask & end_mask;
            return;
        }
        words[start_word] ^= start_mask;
        for word in &mut words[start_word + 1..end_word] {
            *word = !*word;
        }
        words[end_word] ^= end_mask;
    }

    /// Sets the bit of every id in `ids`.
    ///
    /// # Panics
    ///
    /// Panics if an id is outside the capacity.
    pub fn set_bits(&mut self, ids: &[u32]) {
        let words = self.words_mut();
        for &id in ids {
            let (word, mask) = bit_position(id);
            words[word] |= mask;
        }
    }

    pub fn clear_all(&mut self) {
        self.words_mut().fill(0);
        *self.size.get_mut() = 0;
    }

    /// Number of set bits, computed on first use and cached.
    pub fn cardinality(&self) -> usize {
        if let Some(size) = self.cached_cardinality() {
            return size;
        }
        let size = self
            .words()
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum::<usize>();
        self.size.store(size as u64, Ordering::Relaxed);
        size
    }

    /// The cardinality if it is already known.
    pub fn cached_cardinality(&self) -> Option<usize> {
        match self.size.load(Ordering::Relaxed) {
            UNKNOWN_SIZE => None,
            size => Some(size as usize),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self.cached_cardinality() {
            Some(size) => size == 0,
            None => self.words().iter().all(|&w| w == 0),
        }
    }

    /// First set bit at or after `from`.
    pub fn next_set_bit(&self, from: usize) -> Option<u32> {
        if from >= self.capacity() {
            return None;
        }
        let words = self.words();
        let mut i = from >> 6;
        let word = words[i] >> (from & 63);
        if word != 0 {
            return Some((from + word.trailing_zeros() as usize) as u32);
        }
        i += 1;
        while i < words.len() {
            if words[i] != 0 {
                return Some((i * 64 + words[i].trailing_zeros() as usize) as u32);
            }
            i += 1;
        }
        None
    }

    /// Last set bit at or before `from`. Positions past the capacity search
    /// from the last bit.
    pub fn prev_set_bit(&self, from: usize) -> Option<u32> {
        if self.wlen == 0 {
            return None;
        }
        let from = from.min(self.capacity() - 1);
        let words = self.words();
        let mut i = from >> 6;
        let word = words[i] << (63 - (from & 63));
        if word != 0 {
            return Some((from - word.leading_zeros() as usize) as u32);
        }
        while i > 0 {
            i -= 1;
            if words[i] != 0 {
                return Some((i * 64 + 63 - words[i].leading_zeros() as usize) as u32);
            }
        }
        None
    }

    pub fn iter(&self) -> DenseIter<'_> {
        DenseIter {
            words: self.words().iter(),
            current: 0,
            base: 0,
            next_base: 0,
        }
    }

    /// Enumerates the set bits into a sorted id array.
    pub fn to_sparse(&self) -> Result<SparseDocSet> {
        let len = self.cardinality();
        let mut ids = memory::alloc_ids(self.arena(), len, false)?;
        let out = ids.as_mut_slice::<u32>();
        for (slot, id) in out.iter_mut().zip(self.iter()) {
            *slot = id;
        }
        SparseDocSet::from_buffer(ids, len)
    }

    fn check_operand(&self, operation: &'static str, other: &DenseDocSet) -> Result<()> {
        if self.wlen == other.wlen {
            Ok(())
        } else {
            Err(Error::invalid_operand(operation, self.wlen, other.wlen))
        }
    }

    pub(crate) fn zip_count(&self, other: &DenseDocSet, op: impl Fn(u64, u64) -> u64) -> usize {
        debug_assert_eq!(self.wlen, other.wlen);
        self.words()
            .iter()
            .zip(other.words())
            .map(|(&a, &b)| op(a, b).count_ones() as usize)
            .sum()
    }

    pub(crate) fn zip_apply(&mut self, other: &DenseDocSet, op: impl Fn(u64, u64) -> u64) {
        debug_assert_eq!(self.wlen, other.wlen);
        for (a, &b) in self.words_mut().iter_mut().zip(other.words()) {
            *a = op(*a, b);
        }
    }

    /// `|self ∩ other|`
    pub fn intersection_count(&self, other: &DenseDocSet) -> Result<usize> {
        self.check_operand("intersection_count", other)?;
        Ok(self.zip_count(other, |a, b| a & b))
    }

    /// `|self ∪ other|`
    pub fn union_count(&self, other: &DenseDocSet) -> Result<usize> {
        self.check_operand("union_count", other)?;
        Ok(self.zip_count(other, |a, b| a | b))
    }

    /// `|self \ other|`
    pub fn and_not_count(&self, other: &DenseDocSet) -> Result<usize> {
        self.check_operand("and_not_count", other)?;
        Ok(self.zip_count(other, |a, b| a & !b))
    }

    /// `|self △ other|`
    pub fn xor_count(&self, other: &DenseDocSet) -> Result<usize> {
        self.check_operand("xor_count", other)?;
        Ok(self.zip_count(other, |a, b| a ^ b))
    }

    pub fn intersects(&self, other: &DenseDocSet) -> Result<bool> {
        self.check_operand("intersects", other)?;
        Ok(self
            .words()
            .iter()
            .zip(other.words())
            .any(|(&a, &b)| a & b != 0))
    }

    /// `self &= other`
    pub fn intersect_me(&mut self, other: &DenseDocSet) -> Result<()> {
        self.check_operand("intersect_me", other)?;
        self.zip_apply(other, |a, b| a & b);
        Ok(())
    }

    /// `self |= other`
    pub fn union_me(&mut self, other: &DenseDocSet) -> Result<()> {
        self.check_operand("union_me", other)?;
        self.zip_apply(other, |a, b| a | b);
        Ok(())
    }

    /// `self &= !other`
    pub fn remove(&mut self, other: &DenseDocSet) -> Result<()> {
        self.check_operand("remove", other)?;
        self.zip_apply(other, |a, b| a & !b);
        Ok(())
    }

    /// `self ^= other`
    pub fn xor_me(&mut self, other: &DenseDocSet) -> Result<()> {
        self.check_operand("xor_me", other)?;
        self.zip_apply(other, |a, b| a ^ b);
        Ok(())
    }
}

impl std::fmt::Debug for DenseDocSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseDocSet")
            .field("wlen", &self.wlen)
            .field("size", &self.cached_cardinality())
            .finish()
    }
}

/// Ascending iterator over the set bits of a [`DenseDocSet`].
#[derive(Clone)]
pub struct DenseIter<'a> {
    words: std::slice::Iter<'a, u64>,
    current: u64,
    base: usize,
    next_base: usize,
}

impl Iterator for DenseIter<'_> {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<u32> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some((self.base + bit) as u32);
            }
            self.current = *self.words.next()?;
            self.base = self.next_base;
            self.next_base += 64;
        }
    }
}
