//! Streaming post-filters and their delegation chain.
//!
//! A post-filter sees every candidate document of the scan and decides
//! whether to pass it on to the next stage. Stages run in ascending cost
//! order, so cheap rejections happen before expensive ones.

use docset_common::Result;

use crate::{collector::Collector, segment::SegmentContext};

/// A predicate that can be evaluated as a streaming collector.
pub trait PostFilter: Send + Sync {
    fn collector(&self) -> Box<dyn PostFilterCollector>;
}

/// One stage of a post-filter chain.
pub trait PostFilterCollector {
    fn set_next_segment(&mut self, segment: &SegmentContext) -> Result<()>;

    /// Receives a segment-local document and forwards it to `next` if it passes.
    fn collect(&mut self, doc: u32, next: &mut dyn Collector) -> Result<()>;

    /// Flushes anything held back, then finishes `next`.
    fn finish(&mut self, next: &mut dyn Collector) -> Result<()> {
        next.finish()
    }
}

/// Post-filter stages in execution order.
#[derive(Default)]
pub struct PostFilterChain {
    stages: Vec<Box<dyn PostFilterCollector>>,
}

impl PostFilterChain {
    pub fn new(stages: Vec<Box<dyn PostFilterCollector>>) -> PostFilterChain {
        PostFilterChain { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// A collector that feeds the chain and then `last`.
    pub fn wrap<'a>(&'a mut self, last: &'a mut dyn Collector) -> ChainedCollector<'a> {
        ChainedCollector {
            stages: &mut self.stages,
            last,
        }
    }
}

impl std::fmt::Debug for PostFilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostFilterChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}

/// The remaining stages of a chain followed by its final collector.
pub struct ChainedCollector<'a> {
    stages: &'a mut [Box<dyn PostFilterCollector>],
    last: &'a mut dyn Collector,
}

impl Collector for ChainedCollector<'_> {
    fn set_next_segment(&mut self, segment: &SegmentContext) -> Result<()> {
        for stage in self.stages.iter_mut() {
            stage.set_next_segment(segment)?;
        }
        self.last.set_next_segment(segment)
    }

    fn collect(&mut self, doc: u32) -> Result<()> {
        match self.stages.split_first_mut() {
            Some((first, rest)) => first.collect(
                doc,
                &mut ChainedCollector {
                    stages: rest,
                    last: &mut *self.last,
                },
            ),
            None => self.last.collect(doc),
        }
    }

    fn finish(&mut self) -> Result<()> {
        match self.stages.split_first_mut() {
            Some((first, rest)) => first.finish(&mut ChainedCollector {
                stages: rest,
                last: &mut *self.last,
            }),
            None => self.last.finish(),
        }
    }
}
