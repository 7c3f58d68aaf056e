//! Off-heap buffer allocation for document sets.
//!
//! An [`Arena`] hands out [`ArenaBuffer`]s: zero-initialized, 64-byte aligned
//! byte regions viewable as typed slices of 32- or 64-bit words. Small and
//! medium requests come from the global allocator, large ones from anonymous
//! memory mappings. Buffers of exactly [`ArenaConfig::pooled_buffer_bytes`]
//! are recycled through a bounded per-arena pool.

pub mod arena;
pub mod buffer;
pub mod config;
pub mod mmap_buffer;

#[cfg_attr(target_os = "linux", path = "mmap_linux.rs")]
#[cfg_attr(not(target_os = "linux"), path = "mmap_fallback.rs")]
pub mod mmap;

pub use arena::{AllocationObserver, Arena, ArenaStats};
pub use buffer::ArenaBuffer;
pub use config::ArenaConfig;
pub use mmap_buffer::MmapBuffer;
