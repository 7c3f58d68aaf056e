//! The index-level entry point: segments, the filter cache and query plans.

use std::sync::{Arc, Mutex, PoisonError};

use docset_common::{Error, Result};
use docset_page_alloc::Arena;

use crate::{
    cache::FilterCache,
    collector::{AdaptiveCollector, Collector},
    config::SearcherConfig,
    doc_set::DocSet,
    filter::{FilterPlanner, ProcessedFilter, SegmentFilter},
    predicate::{FilterQuery, MatchAllDocs, Predicate},
    segment::{DocIdIterator, LiveDocs, NO_MORE_DOCS, SegmentContext},
};

/// A read-only view of an index as a list of segments, answering filter
/// queries with [`DocSet`]s.
pub struct DocSetSearcher {
    arena: Arena,
    segments: Vec<SegmentContext>,
    max_doc: u32,
    filter_cache: Option<Arc<dyn FilterCache>>,
    config: SearcherConfig,
    match_all: Mutex<Option<DocSet>>,
}

impl DocSetSearcher {
    pub fn builder() -> DocSetSearcherBuilder {
        DocSetSearcherBuilder::default()
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn segments(&self) -> &[SegmentContext] {
        &self.segments
    }

    /// Total number of documents, deleted ones included.
    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    pub fn config(&self) -> &SearcherConfig {
        &self.config
    }

    pub fn filter_cache(&self) -> Option<&Arc<dyn FilterCache>> {
        self.filter_cache.as_ref()
    }

    pub fn uses_filter_cache(&self) -> bool {
        self.config.use_filter_cache && self.filter_cache.is_some()
    }

    pub fn small_set_size(&self) -> usize {
        self.config.small_set_size_for(self.max_doc)
    }

    /// An empty collector sized for this index.
    pub fn new_collector(&self) -> Result<AdaptiveCollector> {
        AdaptiveCollector::new(&self.arena, self.small_set_size(), self.max_doc)
    }

    /// Every live document. Computed once per searcher.
    pub fn match_all(&self) -> Result<DocSet> {
        let mut slot = self.match_all.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(all) = slot.as_ref() {
            return Ok(all.clone());
        }
        let all = self.get_positive_doc_set(&MatchAllDocs)?;
        *slot = Some(all.clone());
        Ok(all)
    }

    /// The positive match set of `predicate`, from the filter cache when
    /// possible. Misses are computed and stored.
    pub fn get_positive_doc_set(&self, predicate: &dyn Predicate) -> Result<DocSet> {
        let cache = match self.filter_cache.as_ref() {
            Some(cache) if self.config.use_filter_cache => cache,
            _ => return self.get_doc_set_nc(predicate),
        };
        let key = predicate.key();
        if let Some(hit) = cache.get(&key) {
            return Ok(hit);
        }
        let set = self.get_doc_set_nc(predicate)?;
        cache.put(key, set.clone());
        Ok(set)
    }

    /// The match set of a single clause. Negated cacheable clauses are the
    /// complement of their cached positive set.
    pub fn get_doc_set(&self, query: &FilterQuery) -> Result<DocSet> {
        if !query.is_cached() {
            return self.get_doc_set_for_queries(std::slice::from_ref(query));
        }
        let positive = self.get_positive_doc_set(query.predicate().as_ref())?;
        if query.is_negated() {
            self.match_all()?.and_not(&positive)
        } else {
            Ok(positive)
        }
    }

    /// Scans `predicate` without consulting the filter cache.
    pub fn get_doc_set_nc(&self, predicate: &dyn Predicate) -> Result<DocSet> {
        let mut collector = self.new_collector()?;
        for segment in &self.segments {
            collector.set_next_segment(segment)?;
            if let Some(mut iter) = predicate.segment_iter(segment) {
                drain(&mut iter, &mut collector)?;
            }
        }
        collector.finish()?;
        collector.into_doc_set()
    }

    /// Plans `queries` together with an optional precomputed set.
    pub fn get_processed_filter(
        &self,
        set_filter: Option<&DocSet>,
        queries: &[FilterQuery],
    ) -> Result<ProcessedFilter> {
        FilterPlanner::new(self).plan(set_filter, queries)
    }

    /// The documents matching every clause of `queries`.
    pub fn get_doc_set_for_queries(&self, queries: &[FilterQuery]) -> Result<DocSet> {
        let mut plan = self.get_processed_filter(None, queries)?;
        if let Some(answer) = plan.take_answer() {
            return Ok(answer);
        }
        let mut collector = self.new_collector()?;
        let ProcessedFilter {
            filter,
            post_filter,
            ..
        } = &mut plan;
        match post_filter {
            Some(chain) => self.scan(filter.as_mut(), &mut chain.wrap(&mut collector))?,
            None => self.scan(filter.as_mut(), &mut collector)?,
        }
        drop(plan);
        collector.into_doc_set()
    }

    /// Feeds every segment's matches to `collector`, then finishes it.
    fn scan(
        &self,
        mut filter: Option<&mut SegmentFilter>,
        collector: &mut dyn Collector,
    ) -> Result<()> {
        for segment in &self.segments {
            collector.set_next_segment(segment)?;
            let iter: Option<Box<dyn DocIdIterator + '_>> = match filter.as_deref_mut() {
                Some(filter) => filter.segment_iter(segment, None),
                None => Some(Box::new(segment.all_docs())),
            };
            if let Some(mut iter) = iter {
                drain(&mut iter, collector)?;
            }
        }
        collector.finish()
    }
}

fn drain<I: DocIdIterator + ?Sized>(iter: &mut I, collector: &mut dyn Collector) -> Result<()> {
    loop {
        let doc = iter.next_doc();
        if doc == NO_MORE_DOCS {
            return Ok(());
        }
        collector.collect(doc)?;
    }
}

impl std::fmt::Debug for DocSetSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocSetSearcher")
            .field("segments", &self.segments.len())
            .field("max_doc", &self.max_doc)
            .field("has_filter_cache", &self.filter_cache.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// Assembles a [`DocSetSearcher`]. Segments receive consecutive bases in the
/// order they are added.
#[derive(Default)]
pub struct DocSetSearcherBuilder {
    arena: Option<Arena>,
    segments: Vec<(u32, Option<Arc<dyn LiveDocs>>)>,
    filter_cache: Option<Arc<dyn FilterCache>>,
    config: SearcherConfig,
}

impl DocSetSearcherBuilder {
    pub fn arena(mut self, arena: Arena) -> Self {
        self.arena = Some(arena);
        self
    }

    pub fn add_segment(mut self, max_doc: u32) -> Self {
        self.segments.push((max_doc, None));
        self
    }

    /// Adds a segment with deletions; `live_docs` holds its non-deleted docs.
    pub fn add_segment_with_live_docs(mut self, max_doc: u32, live_docs: Arc<dyn LiveDocs>) -> Self {
        self.segments.push((max_doc, Some(live_docs)));
        self
    }

    pub fn filter_cache(mut self, cache: Arc<dyn FilterCache>) -> Self {
        self.filter_cache = Some(cache);
        self
    }

    pub fn config(mut self, config: SearcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<DocSetSearcher> {
        self.config
            .validate()
            .map_err(|message| Error::invalid_arg("config", message))?;
        let mut base = 0u32;
        let mut segments = Vec::with_capacity(self.segments.len());
        for (ord, (max_doc, live_docs)) in self.segments.into_iter().enumerate() {
            let mut segment = SegmentContext::new(ord, base, max_doc);
            if let Some(live_docs) = live_docs {
                segment = segment.with_live_docs(live_docs);
            }
            segments.push(segment);
            base = base
                .checked_add(max_doc)
                .filter(|&end| end < NO_MORE_DOCS)
                .ok_or_else(|| {
                    Error::invalid_arg("segments", "total document count exceeds the id range")
                })?;
        }
        Ok(DocSetSearcher {
            arena: self.arena.unwrap_or_default(),
            segments,
            max_doc: base,
            filter_cache: self.filter_cache,
            config: self.config,
            match_all: Mutex::new(None),
        })
    }
}
