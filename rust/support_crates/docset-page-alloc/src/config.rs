/// Sizing policy of an [`Arena`](crate::Arena).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Size of the fixed scratch buffers handed out by
    /// [`Arena::pooled_buffer`](crate::Arena::pooled_buffer).
    ///
    /// Default: 8 KiB
    pub pooled_buffer_bytes: usize,

    /// Maximum number of released scratch buffers retained for reuse.
    ///
    /// Default: 1024
    pub pool_capacity: usize,

    /// Requests of at least this many bytes are served by an anonymous memory
    /// mapping instead of the global allocator.
    ///
    /// Default: 1 MiB
    pub mmap_threshold_bytes: usize,

    /// Try large (huge) pages for mapped allocations, falling back to regular
    /// pages when unavailable.
    ///
    /// Default: false
    pub use_large_pages: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            pooled_buffer_bytes: 8 * 1024,
            pool_capacity: 1024,
            mmap_threshold_bytes: 1024 * 1024,
            use_large_pages: false,
        }
    }
}

impl ArenaConfig {
    pub fn with_pooled_buffer_bytes(mut self, bytes: usize) -> Self {
        self.pooled_buffer_bytes = bytes;
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub fn with_mmap_threshold_bytes(mut self, bytes: usize) -> Self {
        self.mmap_threshold_bytes = bytes;
        self
    }

    pub fn with_large_pages(mut self, enabled: bool) -> Self {
        self.use_large_pages = enabled;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.pooled_buffer_bytes == 0 || !self.pooled_buffer_bytes.is_multiple_of(64) {
            return Err(format!(
                "pooled_buffer_bytes must be a non-zero multiple of 64, got {}",
                self.pooled_buffer_bytes
            ));
        }
        if self.mmap_threshold_bytes <= self.pooled_buffer_bytes {
            return Err(format!(
                "mmap_threshold_bytes ({}) must exceed pooled_buffer_bytes ({})",
                self.mmap_threshold_bytes, self.pooled_buffer_bytes
            ));
        }
        Ok(())
    }
}
