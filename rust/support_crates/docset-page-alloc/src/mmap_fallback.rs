//! Page-aligned allocations through the global allocator, for platforms
//! without a native mapping backend.

use std::{
    alloc::{Layout, alloc_zeroed, dealloc},
    ptr::NonNull,
};

pub fn allocate(size: usize, large_pages: bool) -> std::io::Result<(NonNull<u8>, usize)> {
    let layout = page_layout(size.max(1), large_pages)?;
    let ptr = unsafe { alloc_zeroed(layout) };
    NonNull::new(ptr)
        .map(|p| (p, layout.size()))
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::OutOfMemory))
}

/// # Safety
///
/// `ptr` and `capacity` must come from the same successful [`allocate`] call
/// with the same `large_pages` flag, and the region must not be used afterwards.
pub unsafe fn free(ptr: NonNull<u8>, capacity: usize, large_pages: bool) -> std::io::Result<()> {
    let layout = page_layout(capacity, large_pages)?;
    unsafe { dealloc(ptr.as_ptr(), layout) };
    Ok(())
}

pub fn page_size() -> usize {
    4 * 1024
}

pub fn large_page_size() -> usize {
    2 * 1024 * 1024
}

fn page_layout(size: usize, large_pages: bool) -> std::io::Result<Layout> {
    let page = if large_pages {
        large_page_size()
    } else {
        page_size()
    };
    let capacity = size
        .checked_next_multiple_of(page)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "size overflow"))?;
    Layout::from_size_align(capacity, page)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid layout"))
}
