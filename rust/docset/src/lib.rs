//! Reference-counted document sets for search-index filtering.
//!
//! A [`DocSet`] is an immutable set of document ids backed by arena memory,
//! either a bitset ([`DenseDocSet`]) or a sorted id array ([`SparseDocSet`]).
//! [`AdaptiveCollector`] builds sets from index scans, and [`DocSetSearcher`]
//! plans and runs filter queries over a segmented index, sharing
//! materialized sets through a [`FilterCache`].

pub mod cache;
pub mod collector;
pub mod config;
pub mod dense;
pub mod doc_set;
pub mod filter;
mod memory;
pub mod post_filter;
pub mod predicate;
pub mod ref_count;
pub mod searcher;
pub mod segment;
pub mod sorted_ints;
pub mod sparse;
pub mod top_filter;
#[cfg(test)]
mod tests;

pub use cache::{FilterCache, InMemoryFilterCache};
pub use collector::{AdaptiveCollector, Collector};
pub use config::SearcherConfig;
pub use dense::DenseDocSet;
pub use doc_set::{DocIdSet, DocSet, DocSetRepr, WeakDocSet};
pub use docset_common::{Error, ErrorKind, Result};
pub use docset_page_alloc::{Arena, ArenaConfig};
pub use filter::{FilterPlanner, ProcessedFilter, SegmentFilter};
pub use post_filter::{PostFilter, PostFilterChain, PostFilterCollector};
pub use predicate::{DocIdsPredicate, FilterQuery, MatchAllDocs, Predicate, PredicateKey};
pub use ref_count::{RefCount, RefCounted, Shared, WeakShared};
pub use searcher::{DocSetSearcher, DocSetSearcherBuilder};
pub use segment::{DocIdIterator, LiveDocs, NO_MORE_DOCS, SegmentContext};
pub use sparse::SparseDocSet;
pub use top_filter::TopFilter;
