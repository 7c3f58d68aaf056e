/// Tuning of a [`DocSetSearcher`](crate::DocSetSearcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearcherConfig {
    /// Largest result kept as a sorted id array; bigger results are bitsets.
    ///
    /// Default: `(max_doc >> 6) + 5`, the point where an id array outgrows
    /// the bitset.
    pub small_set_size: Option<usize>,

    /// Minimum declared cost for an uncached clause to run as a post-filter.
    ///
    /// Default: 100
    pub post_filter_cost_threshold: i32,

    /// Resolve cacheable clauses through the filter cache when one is set.
    ///
    /// Default: true
    pub use_filter_cache: bool,
}

impl Default for SearcherConfig {
    fn default() -> Self {
        Self {
            small_set_size: None,
            post_filter_cost_threshold: 100,
            use_filter_cache: true,
        }
    }
}

impl SearcherConfig {
    pub fn with_small_set_size(mut self, size: usize) -> Self {
        self.small_set_size = Some(size);
        self
    }

    pub fn with_post_filter_cost_threshold(mut self, threshold: i32) -> Self {
        self.post_filter_cost_threshold = threshold;
        self
    }

    pub fn with_filter_cache(mut self, enabled: bool) -> Self {
        self.use_filter_cache = enabled;
        self
    }

    pub fn small_set_size_for(&self, max_doc: u32) -> usize {
        self.small_set_size
            .unwrap_or((max_doc >> 6) as usize + 5)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.post_filter_cost_threshold < 0 {
            return Err(format!(
                "post_filter_cost_threshold must not be negative, got {}",
                self.post_filter_cost_threshold
            ));
        }
        Ok(())
    }
}
