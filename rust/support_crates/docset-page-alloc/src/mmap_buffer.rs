//! Memory-mapped regions backing large arena allocations.
//!
//! Mapped memory comes zeroed from the OS and is page aligned, so typed views
//! over it never need an explicit clear or an alignment fixup.

use std::ptr::NonNull;

use crate::mmap;

/// An owned anonymous mapping of at least `len` bytes.
pub struct MmapBuffer {
    ptr: NonNull<u8>,
    /// Requested size in bytes.
    len: usize,
    /// Mapped size, rounded up to the page size in use.
    capacity: usize,
    uses_large_pages: bool,
}

impl MmapBuffer {
    pub fn regular_page_size() -> usize {
        mmap::page_size()
    }

    pub fn large_page_size() -> usize {
        mmap::large_page_size()
    }

    /// Maps `size` bytes, trying large pages first when `prefer_large_pages`
    /// is set and falling back to regular pages if that fails.
    pub fn allocate(size: usize, prefer_large_pages: bool) -> std::io::Result<MmapBuffer> {
        if prefer_large_pages {
            match Self::map(size, true) {
                Ok(buf) => return Ok(buf),
                Err(e) => log::debug!("large page mapping of {size} bytes failed: {e}"),
            }
        }
        Self::map(size, false)
    }

    fn map(size: usize, large_pages: bool) -> std::io::Result<MmapBuffer> {
        let (ptr, capacity) = mmap::allocate(size, large_pages)?;
        Ok(MmapBuffer {
            ptr,
            len: size,
            capacity,
            uses_large_pages: large_pages,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn uses_large_pages(&self) -> bool {
        self.uses_large_pages
    }

    pub fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MmapBuffer {
    fn drop(&mut self) {
        if let Err(e) = unsafe { mmap::free(self.ptr, self.capacity, self.uses_large_pages) } {
            log::warn!("failed to unmap {} bytes: {e}", self.capacity);
        }
    }
}

// The mapping is exclusively owned; shared access only hands out `&[u8]`.
unsafe impl Send for MmapBuffer {}
unsafe impl Sync for MmapBuffer {}

impl std::fmt::Debug for MmapBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("uses_large_pages", &self.uses_large_pages)
            .finish()
    }
}
