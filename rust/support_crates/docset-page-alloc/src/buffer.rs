//! Owned arena allocations.

use std::{alloc::Layout, ptr::NonNull};

use bytemuck::{AnyBitPattern, NoUninit};

use crate::{Arena, MmapBuffer};

/// Alignment of heap-backed allocations (one cache line).
pub const HEAP_ALIGNMENT: usize = 64;

/// The memory behind an [`ArenaBuffer`], before it is tied to an arena.
pub(crate) enum RawBuffer {
    Empty,
    Heap { ptr: NonNull<u8>, layout: Layout },
    Mapped(MmapBuffer),
}

impl RawBuffer {
    /// Allocates `bytes` (non-zero) of zeroed memory from the global allocator.
    pub(crate) fn heap(bytes: usize) -> std::io::Result<RawBuffer> {
        debug_assert!(bytes > 0);
        let layout = Layout::from_size_align(bytes, HEAP_ALIGNMENT)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid layout"))?;
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        NonNull::new(ptr)
            .map(|ptr| RawBuffer::Heap { ptr, layout })
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::OutOfMemory))
    }

    fn ptr(&self) -> NonNull<u8> {
        match self {
            RawBuffer::Empty => NonNull::<u64>::dangling().cast(),
            RawBuffer::Heap { ptr, .. } => *ptr,
            RawBuffer::Mapped(buf) => buf.ptr(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        match self {
            RawBuffer::Empty => 0,
            RawBuffer::Heap { layout, .. } => layout.size(),
            RawBuffer::Mapped(buf) => buf.capacity(),
        }
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        if let RawBuffer::Heap { ptr, layout } = self {
            unsafe { std::alloc::dealloc(ptr.as_ptr(), *layout) };
        }
    }
}

unsafe impl Send for RawBuffer {}
unsafe impl Sync for RawBuffer {}

/// A contiguous, exclusively owned region of arena memory.
///
/// The memory is always initialized: fresh allocations are zeroed, and reused
/// pooled buffers hold whatever their previous owner wrote unless zeroing was
/// requested. Dropping the buffer hands it back to its arena, which either
/// pools or frees it.
pub struct ArenaBuffer {
    raw: RawBuffer,
    len: usize,
    pooled: bool,
    arena: Arena,
}

impl ArenaBuffer {
    pub(crate) fn new(raw: RawBuffer, len: usize, pooled: bool, arena: Arena) -> ArenaBuffer {
        debug_assert!(len <= raw.capacity());
        ArenaBuffer {
            raw,
            len,
            pooled,
            arena,
        }
    }

    /// Usable size in bytes.
    pub fn len_bytes(&self) -> usize {
        self.len
    }

    /// Number of bytes available to typed views; equal to [`len_bytes`](Self::len_bytes).
    pub fn capacity_bytes(&self) -> usize {
        self.len
    }

    /// Bytes actually reserved from the system, which may exceed the usable size.
    pub fn reserved_bytes(&self) -> usize {
        self.raw.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the buffer is a fixed-size scratch buffer that returns to the pool.
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.raw, RawBuffer::Mapped(_))
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.raw.ptr().as_ptr(), self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.raw.ptr().as_ptr(), self.len) }
    }

    /// Views the buffer as a slice of `T`.
    ///
    /// # Panics
    ///
    /// Panics if the length is not a multiple of `size_of::<T>()`.
    pub fn as_slice<T: AnyBitPattern>(&self) -> &[T] {
        if self.len == 0 {
            return &[];
        }
        bytemuck::cast_slice(self.as_bytes())
    }

    /// Views the buffer as a mutable slice of `T`.
    ///
    /// # Panics
    ///
    /// Panics if the length is not a multiple of `size_of::<T>()`.
    pub fn as_mut_slice<T: AnyBitPattern + NoUninit>(&mut self) -> &mut [T] {
        if self.len == 0 {
            return &mut [];
        }
        bytemuck::cast_slice_mut(self.as_bytes_mut())
    }

    pub fn fill_zero(&mut self) {
        self.as_bytes_mut().fill(0);
    }

    /// Copies `count` elements of `T` from `src[src_offset..]` into
    /// `self[dst_offset..]`.
    pub fn copy_from<T: AnyBitPattern + NoUninit>(
        &mut self,
        dst_offset: usize,
        src: &ArenaBuffer,
        src_offset: usize,
        count: usize,
    ) {
        self.as_mut_slice::<T>()[dst_offset..dst_offset + count]
            .copy_from_slice(&src.as_slice::<T>()[src_offset..src_offset + count]);
    }

    /// Duplicates the buffer into a fresh allocation of the same size.
    pub fn try_clone(&self) -> std::io::Result<ArenaBuffer> {
        let mut copy = self.arena.alloc(self.len, 1, false)?;
        copy.as_bytes_mut().copy_from_slice(self.as_bytes());
        Ok(copy)
    }

    /// Moves the first `len_bytes` bytes into an exactly sized, non-pooled
    /// allocation. Returns `self` unchanged when it already fits exactly.
    pub fn shrink_to(self, len_bytes: usize) -> std::io::Result<ArenaBuffer> {
        assert!(len_bytes <= self.len);
        if len_bytes == self.len && !self.pooled {
            return Ok(self);
        }
        let mut target = self.arena.alloc_unpooled(len_bytes)?;
        target
            .as_bytes_mut()
            .copy_from_slice(&self.as_bytes()[..len_bytes]);
        Ok(target)
    }
}

impl Drop for ArenaBuffer {
    fn drop(&mut self) {
        let raw = std::mem::replace(&mut self.raw, RawBuffer::Empty);
        self.arena.release(raw, self.len, self.pooled);
    }
}

impl std::fmt::Debug for ArenaBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaBuffer")
            .field("len", &self.len)
            .field("reserved", &self.raw.capacity())
            .field("pooled", &self.pooled)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}
