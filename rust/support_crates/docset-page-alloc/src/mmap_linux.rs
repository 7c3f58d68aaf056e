//! Anonymous private mappings through `mmap(2)`.

use std::{ptr::NonNull, sync::OnceLock};

/// Maps `size` bytes (rounded up to the page size) of zeroed memory.
///
/// Returns the region start and its actual capacity.
pub fn allocate(size: usize, large_pages: bool) -> std::io::Result<(NonNull<u8>, usize)> {
    let page = if large_pages {
        large_page_size()
    } else {
        page_size()
    };
    let capacity = round_up(size.max(1), page)?;
    let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
    if large_pages {
        flags |= libc::MAP_HUGETLB;
    }
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            capacity,
            libc::PROT_READ | libc::PROT_WRITE,
            flags,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    NonNull::new(ptr as *mut u8)
        .map(|p| (p, capacity))
        .ok_or_else(|| std::io::Error::other("mmap returned null"))
}

/// Unmaps a region returned by [`allocate`].
///
/// # Safety
///
/// `ptr` and `capacity` must come from the same successful [`allocate`] call,
/// and the region must not be used afterwards.
pub unsafe fn free(ptr: NonNull<u8>, capacity: usize, _large_pages: bool) -> std::io::Result<()> {
    if unsafe { libc::munmap(ptr.as_ptr() as *mut libc::c_void, capacity) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

pub fn page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    *SIZE.get_or_init(|| {
        let res = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if res > 0 { res as usize } else { 4 * 1024 }
    })
}

/// Huge page size from `/proc/meminfo`, 2 MiB when it cannot be determined.
pub fn large_page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    *SIZE.get_or_init(|| read_huge_page_size().unwrap_or(2 * 1024 * 1024))
}

fn read_huge_page_size() -> Option<usize> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let line = meminfo
        .lines()
        .find(|line| line.starts_with("Hugepagesize:"))?;
    let kb = line.split_whitespace().nth(1)?.parse::<usize>().ok()?;
    Some(kb * 1024)
}

fn round_up(size: usize, page: usize) -> std::io::Result<usize> {
    debug_assert!(page.is_power_of_two());
    size.checked_add(page - 1)
        .map(|s| s & !(page - 1))
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "size overflow"))
}
