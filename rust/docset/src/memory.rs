//! Arena allocation helpers that report failures as crate errors.

use docset_common::{Error, Result};
use docset_page_alloc::{Arena, ArenaBuffer};

/// Zeroed room for `count` bitset words.
pub(crate) fn alloc_words(arena: &Arena, count: usize) -> Result<ArenaBuffer> {
    alloc(arena, count, 8, true)
}

/// Room for `count` document ids. The contents are unspecified unless `zero`.
pub(crate) fn alloc_ids(arena: &Arena, count: usize, zero: bool) -> Result<ArenaBuffer> {
    alloc(arena, count, 4, zero)
}

pub(crate) fn pooled_buffer(arena: &Arena) -> Result<ArenaBuffer> {
    arena
        .pooled_buffer()
        .map_err(|e| Error::allocation_failed(arena.pooled_buffer_bytes(), e))
}

pub(crate) fn shrink(buffer: ArenaBuffer, len_bytes: usize) -> Result<ArenaBuffer> {
    buffer
        .shrink_to(len_bytes)
        .map_err(|e| Error::allocation_failed(len_bytes, e))
}

pub(crate) fn clone_buffer(buffer: &ArenaBuffer) -> Result<ArenaBuffer> {
    buffer
        .try_clone()
        .map_err(|e| Error::allocation_failed(buffer.len_bytes(), e))
}

fn alloc(arena: &Arena, count: usize, elem_size: usize, zero: bool) -> Result<ArenaBuffer> {
    arena
        .alloc(count, elem_size, zero)
        .map_err(|e| Error::allocation_failed(count.saturating_mul(elem_size), e))
}
