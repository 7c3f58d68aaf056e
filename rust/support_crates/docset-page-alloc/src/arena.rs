//! The allocation arena and its scratch-buffer pool.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use crate::{
    ArenaConfig, MmapBuffer,
    buffer::{ArenaBuffer, RawBuffer},
};

/// Hook notified about every allocation and release made through an arena.
///
/// Useful for metrics and for leak checks in tests.
pub trait AllocationObserver: Send + Sync {
    fn on_allocate(&self, _bytes: usize) {}

    fn on_release(&self, _bytes: usize) {}

    fn on_pool_hit(&self) {}
}

/// Point-in-time counters of an [`Arena`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Buffers handed out, including pool reuses.
    pub allocations: u64,
    /// Buffers handed back.
    pub releases: u64,
    /// Allocations served from the scratch pool.
    pub pool_hits: u64,
    /// Usable bytes currently held by live buffers.
    pub outstanding_bytes: u64,
    /// Released scratch buffers currently cached.
    pub pooled_buffers: usize,
}

impl ArenaStats {
    /// Number of buffers allocated and not yet released.
    pub fn live_buffers(&self) -> u64 {
        self.allocations - self.releases
    }
}

/// Shared allocator for document-set memory.
///
/// Cloning an `Arena` is cheap and yields a handle to the same pool and
/// counters. Buffers keep their arena alive until they are dropped.
#[derive(Clone)]
pub struct Arena(Arc<ArenaInner>);

struct ArenaInner {
    config: ArenaConfig,
    pool: Mutex<Vec<RawBuffer>>,
    allocations: AtomicU64,
    releases: AtomicU64,
    pool_hits: AtomicU64,
    outstanding_bytes: AtomicU64,
    observer: Option<Arc<dyn AllocationObserver>>,
}

impl Arena {
    pub fn new(config: ArenaConfig) -> std::io::Result<Arena> {
        Self::build(config, None)
    }

    pub fn with_observer(
        config: ArenaConfig,
        observer: Arc<dyn AllocationObserver>,
    ) -> std::io::Result<Arena> {
        Self::build(config, Some(observer))
    }

    fn build(
        config: ArenaConfig,
        observer: Option<Arc<dyn AllocationObserver>>,
    ) -> std::io::Result<Arena> {
        config
            .validate()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        Ok(Self::from_parts(config, observer))
    }

    fn from_parts(config: ArenaConfig, observer: Option<Arc<dyn AllocationObserver>>) -> Arena {
        Arena(Arc::new(ArenaInner {
            pool: Mutex::new(Vec::with_capacity(config.pool_capacity.min(64))),
            config,
            allocations: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            pool_hits: AtomicU64::new(0),
            outstanding_bytes: AtomicU64::new(0),
            observer,
        }))
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.0.config
    }

    pub fn pooled_buffer_bytes(&self) -> usize {
        self.0.config.pooled_buffer_bytes
    }

    /// Number of `T` slots in one pooled scratch buffer.
    pub fn pooled_slots<T>(&self) -> usize {
        self.pooled_buffer_bytes() / std::mem::size_of::<T>()
    }

    /// Allocates room for `count` elements of `elem_size` bytes each.
    ///
    /// Fresh memory is zeroed regardless of `zero`; the flag only forces a
    /// clear when a recycled scratch buffer is handed out.
    pub fn alloc(&self, count: usize, elem_size: usize, zero: bool) -> std::io::Result<ArenaBuffer> {
        let bytes = count.checked_mul(elem_size).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "allocation size overflow")
        })?;
        if bytes == self.pooled_buffer_bytes() {
            return self.take_pooled(zero);
        }
        self.alloc_unpooled(bytes)
    }

    /// Returns a scratch buffer of exactly [`ArenaConfig::pooled_buffer_bytes`].
    ///
    /// The contents are unspecified (possibly left over from a previous owner).
    pub fn pooled_buffer(&self) -> std::io::Result<ArenaBuffer> {
        self.take_pooled(false)
    }

    pub(crate) fn alloc_unpooled(&self, bytes: usize) -> std::io::Result<ArenaBuffer> {
        let raw = if bytes == 0 {
            RawBuffer::Empty
        } else if bytes >= self.0.config.mmap_threshold_bytes {
            RawBuffer::Mapped(MmapBuffer::allocate(
                bytes,
                self.0.config.use_large_pages,
            )?)
        } else {
            RawBuffer::heap(bytes)?
        };
        Ok(self.register(raw, bytes, false))
    }

    fn take_pooled(&self, zero: bool) -> std::io::Result<ArenaBuffer> {
        let bytes = self.pooled_buffer_bytes();
        let cached = self.pool().pop();
        let buffer = match cached {
            Some(raw) => {
                self.0.pool_hits.fetch_add(1, Ordering::Relaxed);
                if let Some(observer) = &self.0.observer {
                    observer.on_pool_hit();
                }
                let mut buffer = self.register(raw, bytes, true);
                if zero {
                    buffer.fill_zero();
                }
                buffer
            }
            None => self.register(RawBuffer::heap(bytes)?, bytes, true),
        };
        Ok(buffer)
    }

    fn register(&self, raw: RawBuffer, len: usize, pooled: bool) -> ArenaBuffer {
        self.0.allocations.fetch_add(1, Ordering::Relaxed);
        self.0
            .outstanding_bytes
            .fetch_add(len as u64, Ordering::Relaxed);
        if let Some(observer) = &self.0.observer {
            observer.on_allocate(len);
        }
        ArenaBuffer::new(raw, len, pooled, self.clone())
    }

    pub(crate) fn release(&self, raw: RawBuffer, len: usize, pooled: bool) {
        self.0.releases.fetch_add(1, Ordering::Relaxed);
        self.0
            .outstanding_bytes
            .fetch_sub(len as u64, Ordering::Relaxed);
        if let Some(observer) = &self.0.observer {
            observer.on_release(len);
        }
        if !pooled {
            return;
        }
        let overflow = {
            let mut pool = self.pool();
            if pool.len() < self.0.config.pool_capacity {
                pool.push(raw);
                None
            } else {
                Some(raw)
            }
        };
        if overflow.is_some() {
            log::debug!(
                "scratch pool full ({} buffers), freeing released buffer",
                self.0.config.pool_capacity
            );
        }
    }

    /// Frees every cached scratch buffer.
    pub fn trim_pool(&self) {
        let drained = std::mem::take(&mut *self.pool());
        drop(drained);
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            allocations: self.0.allocations.load(Ordering::Relaxed),
            releases: self.0.releases.load(Ordering::Relaxed),
            pool_hits: self.0.pool_hits.load(Ordering::Relaxed),
            outstanding_bytes: self.0.outstanding_bytes.load(Ordering::Relaxed),
            pooled_buffers: self.pool().len(),
        }
    }

    pub fn ptr_eq(&self, other: &Arena) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn pool(&self) -> MutexGuard<'_, Vec<RawBuffer>> {
        self.0.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::from_parts(ArenaConfig::default(), None)
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("config", &self.0.config)
            .field("stats", &self.stats())
            .finish()
    }
}
