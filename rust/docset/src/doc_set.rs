//! The shared document-set handle and its representation dispatch.
//!
//! A [`DocSet`] is an immutable, reference-counted view of one of three
//! representations: a [`DenseDocSet`] bitset, a [`SparseDocSet`] sorted
//! array, or a foreign [`DocIdSet`]. Binary operations match on the pair of
//! representations and take a specialized path where one exists:
//!
//! - dense × dense with equal word counts runs word-parallel kernels,
//! - sparse × sparse runs the sorted-array kernels,
//! - sparse × anything walks the sparse ids and probes the other side.
//!
//! Every other pairing materializes both operands into bitsets of a common
//! capacity and combines those.

use docset_common::{Error, Result};
use docset_page_alloc::Arena;

use crate::{
    dense::{DenseDocSet, DenseIter, bits2words},
    ref_count::{Shared, WeakShared},
    sparse::SparseDocSet,
    top_filter::TopFilter,
};

/// A document-id set implemented outside this crate.
pub trait DocIdSet: Send + Sync + std::fmt::Debug {
    fn size(&self) -> usize;

    fn exists(&self, doc: u32) -> bool;

    /// Members in ascending order.
    fn doc_ids(&self) -> Box<dyn Iterator<Item = u32> + '_>;

    fn mem_size(&self) -> usize {
        0
    }
}

#[derive(Debug)]
pub enum DocSetRepr {
    Dense(DenseDocSet),
    Sparse(SparseDocSet),
    /// A foreign set, with the arena used for results derived from it.
    Foreign { set: Box<dyn DocIdSet>, arena: Arena },
}

impl DocSetRepr {
    pub fn arena(&self) -> &Arena {
        match self {
            DocSetRepr::Dense(bits) => bits.arena(),
            DocSetRepr::Sparse(ids) => ids.arena(),
            DocSetRepr::Foreign { arena, .. } => arena,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            DocSetRepr::Dense(bits) => bits.cardinality(),
            DocSetRepr::Sparse(ids) => ids.len(),
            DocSetRepr::Foreign { set, .. } => set.size(),
        }
    }

    pub fn exists(&self, doc: u32) -> bool {
        match self {
            DocSetRepr::Dense(bits) => bits.exists(doc),
            DocSetRepr::Sparse(ids) => ids.exists(doc),
            DocSetRepr::Foreign { set, .. } => set.exists(doc),
        }
    }

    pub fn iter(&self) -> DocSetIter<'_> {
        match self {
            DocSetRepr::Dense(bits) => DocSetIter::Dense(bits.iter()),
            DocSetRepr::Sparse(ids) => DocSetIter::Sparse(ids.iter()),
            DocSetRepr::Foreign { set, .. } => DocSetIter::Foreign(set.doc_ids()),
        }
    }

    pub fn mem_size(&self) -> usize {
        match self {
            DocSetRepr::Dense(bits) => bits.mem_size(),
            DocSetRepr::Sparse(ids) => ids.mem_size(),
            DocSetRepr::Foreign { set, .. } => set.mem_size(),
        }
    }

    /// A bit capacity large enough for every member.
    pub fn universe(&self) -> usize {
        match self {
            DocSetRepr::Dense(bits) => bits.capacity(),
            DocSetRepr::Sparse(ids) => ids.last().map_or(0, |id| id as usize + 1),
            DocSetRepr::Foreign { set, .. } => {
                set.doc_ids().last().map_or(0, |id| id as usize + 1)
            }
        }
    }

    /// Copies the members into a bitset of capacity `num_bits`.
    pub fn to_dense(&self, num_bits: usize) -> Result<DenseDocSet> {
        match self {
            DocSetRepr::Dense(bits) => bits.resized(num_bits),
            DocSetRepr::Sparse(ids) => ids.to_dense(num_bits),
            DocSetRepr::Foreign { set, arena } => {
                let universe = self.universe();
                let wlen = bits2words(num_bits);
                if universe > wlen * 64 {
                    return Err(Error::invalid_operand(
                        "to_dense",
                        universe,
                        wlen * 64,
                    ));
                }
                let mut bits = DenseDocSet::new(arena, num_bits)?;
                for id in set.doc_ids() {
                    bits.fast_set(id);
                }
                Ok(bits)
            }
        }
    }
}

/// Ascending iterator over the members of a [`DocSet`].
pub enum DocSetIter<'a> {
    Dense(DenseIter<'a>),
    Sparse(std::iter::Copied<std::slice::Iter<'a, u32>>),
    Foreign(Box<dyn Iterator<Item = u32> + 'a>),
}

impl Iterator for DocSetIter<'_> {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<u32> {
        match self {
            DocSetIter::Dense(it) => it.next(),
            DocSetIter::Sparse(it) => it.next(),
            DocSetIter::Foreign(it) => it.next(),
        }
    }
}

/// A shared, immutable document set.
///
/// Cloning increments the reference count and dropping decrements it; the
/// backing memory returns to its arena with the last handle. To mutate a set,
/// regain sole ownership of its representation with
/// [`try_into_repr`](Self::try_into_repr).
#[derive(Clone)]
pub struct DocSet(Shared<DocSetRepr>);

impl DocSet {
    pub fn new(repr: DocSetRepr) -> DocSet {
        DocSet(Shared::new(repr))
    }

    pub fn empty(arena: &Arena) -> Result<DocSet> {
        Ok(SparseDocSet::empty(arena)?.into())
    }

    pub fn from_sorted(arena: &Arena, ids: &[u32]) -> Result<DocSet> {
        Ok(SparseDocSet::from_sorted(arena, ids)?.into())
    }

    pub fn from_foreign(arena: &Arena, set: Box<dyn DocIdSet>) -> DocSet {
        DocSet::new(DocSetRepr::Foreign {
            set,
            arena: arena.clone(),
        })
    }

    pub fn repr(&self) -> &DocSetRepr {
        &self.0
    }

    pub fn as_dense(&self) -> Option<&DenseDocSet> {
        match self.repr() {
            DocSetRepr::Dense(bits) => Some(bits),
            _ => None,
        }
    }

    pub fn as_sparse(&self) -> Option<&SparseDocSet> {
        match self.repr() {
            DocSetRepr::Sparse(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn arena(&self) -> &Arena {
        self.repr().arena()
    }

    pub fn ref_count(&self) -> i32 {
        Shared::ref_count(&self.0)
    }

    /// Whether both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &DocSet) -> bool {
        Shared::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakDocSet {
        WeakDocSet(Shared::downgrade(&self.0))
    }

    /// Returns the representation if this is the only handle.
    pub fn try_into_repr(self) -> std::result::Result<DocSetRepr, DocSet> {
        Shared::try_unwrap(self.0).map_err(DocSet)
    }

    pub fn size(&self) -> usize {
        self.repr().size()
    }

    pub fn is_empty(&self) -> bool {
        match self.repr() {
            DocSetRepr::Dense(bits) => bits.is_empty(),
            repr => repr.size() == 0,
        }
    }

    pub fn exists(&self, doc: u32) -> bool {
        self.repr().exists(doc)
    }

    pub fn iter(&self) -> DocSetIter<'_> {
        self.repr().iter()
    }

    pub fn mem_size(&self) -> usize {
        self.repr().mem_size()
    }

    pub fn universe(&self) -> usize {
        self.repr().universe()
    }

    pub fn to_dense(&self, num_bits: usize) -> Result<DenseDocSet> {
        self.repr().to_dense(num_bits)
    }

    /// Segment-relative iteration view for index scans.
    pub fn top_filter(&self) -> TopFilter {
        TopFilter::new(self.clone())
    }

    pub fn intersection_size(&self, other: &DocSet) -> usize {
        use DocSetRepr::*;
        match (self.repr(), other.repr()) {
            (Sparse(a), Sparse(b)) => a.intersection_size(b),
            (Dense(a), Dense(b)) if a.wlen() == b.wlen() => a.zip_count(b, |x, y| x & y),
            (Sparse(s), o) | (o, Sparse(s)) => s.iter().filter(|&id| o.exists(id)).count(),
            (a, b) => {
                let (small, large) = by_size(a, b);
                small.iter().filter(|&id| large.exists(id)).count()
            }
        }
    }

    pub fn intersects(&self, other: &DocSet) -> bool {
        use DocSetRepr::*;
        match (self.repr(), other.repr()) {
            (Sparse(a), Sparse(b)) => a.intersects(b),
            (Dense(a), Dense(b)) if a.wlen() == b.wlen() => {
                a.words().iter().zip(b.words()).any(|(&x, &y)| x & y != 0)
            }
            (Sparse(s), o) | (o, Sparse(s)) => s.iter().any(|id| o.exists(id)),
            (a, b) => {
                let (small, large) = by_size(a, b);
                small.iter().any(|id| large.exists(id))
            }
        }
    }

    pub fn union_size(&self, other: &DocSet) -> usize {
        match (self.repr(), other.repr()) {
            (DocSetRepr::Dense(a), DocSetRepr::Dense(b)) if a.wlen() == b.wlen() => {
                a.zip_count(b, |x, y| x | y)
            }
            _ => self.size() + other.size() - self.intersection_size(other),
        }
    }

    pub fn and_not_size(&self, other: &DocSet) -> usize {
        match (self.repr(), other.repr()) {
            (DocSetRepr::Dense(a), DocSetRepr::Dense(b)) if a.wlen() == b.wlen() => {
                a.zip_count(b, |x, y| x & !y)
            }
            _ => self.size() - self.intersection_size(other),
        }
    }

    pub fn xor_size(&self, other: &DocSet) -> usize {
        match (self.repr(), other.repr()) {
            (DocSetRepr::Dense(a), DocSetRepr::Dense(b)) if a.wlen() == b.wlen() => {
                a.zip_count(b, |x, y| x ^ y)
            }
            _ => self.size() + other.size() - 2 * self.intersection_size(other),
        }
    }

    pub fn intersection(&self, other: &DocSet) -> Result<DocSet> {
        use DocSetRepr::*;
        let set: DocSet = match (self.repr(), other.repr()) {
            (Sparse(a), Sparse(b)) => a.intersection(b)?.into(),
            (Sparse(s), o) | (o, Sparse(s)) => s.filter(|id| o.exists(id))?.into(),
            (Dense(a), Dense(b)) if a.wlen() == b.wlen() => {
                let mut result = a.try_clone()?;
                result.zip_apply(b, |x, y| x & y);
                result.into()
            }
            (a, b) => materialize(a, b, |x, y| x & y)?,
        };
        Ok(set)
    }

    pub fn union(&self, other: &DocSet) -> Result<DocSet> {
        use DocSetRepr::*;
        let set: DocSet = match (self.repr(), other.repr()) {
            (Sparse(a), Sparse(b)) => a.union(b)?.into(),
            (Dense(a), Dense(b)) if a.wlen() == b.wlen() => {
                let mut result = a.try_clone()?;
                result.zip_apply(b, |x, y| x | y);
                result.into()
            }
            (Dense(d), o) | (o, Dense(d)) if o.universe() <= d.capacity() => {
                let mut result = d.try_clone()?;
                for id in o.iter() {
                    result.fast_set(id);
                }
                result.into()
            }
            (a, b) => materialize(a, b, |x, y| x | y)?,
        };
        Ok(set)
    }

    /// `self \ other`. Returns `self` (another handle to the same instance)
    /// when `other` is empty.
    pub fn and_not(&self, other: &DocSet) -> Result<DocSet> {
        use DocSetRepr::*;
        if other.is_empty() {
            return Ok(self.clone());
        }
        let set: DocSet = match (self.repr(), other.repr()) {
            (Sparse(a), Sparse(b)) => a.and_not(b)?.into(),
            (Sparse(a), o) => a.filter(|id| !o.exists(id))?.into(),
            (Dense(a), Dense(b)) if a.wlen() == b.wlen() => {
                let mut result = a.try_clone()?;
                result.zip_apply(b, |x, y| x & !y);
                result.into()
            }
            (Dense(a), o) => {
                let mut result = a.try_clone()?;
                let capacity = result.capacity();
                for id in o.iter().take_while(|&id| (id as usize) < capacity) {
                    result.fast_clear(id);
                }
                result.into()
            }
            (a, b) => materialize(a, b, |x, y| x & !y)?,
        };
        Ok(set)
    }

    /// Symmetric difference.
    pub fn xor(&self, other: &DocSet) -> Result<DocSet> {
        use DocSetRepr::*;
        let set: DocSet = match (self.repr(), other.repr()) {
            (Sparse(a), Sparse(b)) => a.xor(b)?.into(),
            (Dense(a), Dense(b)) if a.wlen() == b.wlen() => {
                let mut result = a.try_clone()?;
                result.zip_apply(b, |x, y| x ^ y);
                result.into()
            }
            (a, b) => materialize(a, b, |x, y| x ^ y)?,
        };
        Ok(set)
    }
}

fn by_size<'a>(a: &'a DocSetRepr, b: &'a DocSetRepr) -> (&'a DocSetRepr, &'a DocSetRepr) {
    if a.size() <= b.size() { (a, b) } else { (b, a) }
}

/// Combines two sets of any representation word by word after copying both
/// into bitsets of a common capacity.
fn materialize(a: &DocSetRepr, b: &DocSetRepr, op: impl Fn(u64, u64) -> u64) -> Result<DocSet> {
    let num_bits = a.universe().max(b.universe());
    let mut left = a.to_dense(num_bits)?;
    let right = b.to_dense(num_bits)?;
    left.zip_apply(&right, op);
    Ok(left.into())
}

impl From<DocSetRepr> for DocSet {
    fn from(repr: DocSetRepr) -> Self {
        DocSet::new(repr)
    }
}

impl From<DenseDocSet> for DocSet {
    fn from(bits: DenseDocSet) -> Self {
        DocSet::new(DocSetRepr::Dense(bits))
    }
}

impl From<SparseDocSet> for DocSet {
    fn from(ids: SparseDocSet) -> Self {
        DocSet::new(DocSetRepr::Sparse(ids))
    }
}

impl std::fmt::Debug for DocSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocSet")
            .field("ref_count", &self.ref_count())
            .field("repr", self.repr())
            .finish()
    }
}

/// A non-owning reference to a [`DocSet`], for lookups that may race with
/// the set's release.
#[derive(Clone, Debug)]
pub struct WeakDocSet(WeakShared<DocSetRepr>);

impl WeakDocSet {
    /// A new handle, or `None` if the set was already released.
    pub fn upgrade(&self) -> Option<DocSet> {
        self.0.upgrade().map(DocSet)
    }

    pub fn is_alive(&self) -> bool {
        self.0.is_alive()
    }
}
