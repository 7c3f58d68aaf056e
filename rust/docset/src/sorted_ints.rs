//! Kernels over strictly ascending `u32` slices.
//!
//! Pairwise operations pick one of two strategies by the size ratio of their
//! operands. Comparable sizes use a linear two-pointer merge. When one side is
//! more than eight times longer, each element of the shorter side is located
//! in the longer one by a bounded forward probe followed by a binary search
//! (see [`Galloper`]).
//!
//! Materializing kernels write into a caller-provided output slice and return
//! the number of ids written; the caller sizes the output for the worst case.

use std::ops::Range;

/// Whether `large` is long enough relative to `small` to prefer galloping.
#[inline]
pub fn is_skewed(small: usize, large: usize) -> bool {
    (small as u64) * 8 < large as u64
}

/// Index of `value` in `ids`, or the position where it would be inserted.
#[inline]
pub fn find_index(ids: &[u32], value: u32) -> usize {
    ids.partition_point(|&id| id < value)
}

/// Index range of the ids falling in `[start, end)`.
pub fn find_range(ids: &[u32], start: u32, end: u64) -> Range<usize> {
    let lo = find_index(ids, start);
    let hi = lo + ids[lo..].partition_point(|&id| (id as u64) < end);
    lo..hi
}

pub fn is_strictly_ascending(ids: &[u32]) -> bool {
    ids.windows(2).all(|w| w[0] < w[1])
}

/// Sorts `ids` and removes duplicates in place, returning the number of
/// distinct ids now at the front of the slice.
pub fn sort_dedup(ids: &mut [u32]) -> usize {
    if ids.len() < 2 {
        return ids.len();
    }
    ids.sort_unstable();
    let mut write = 1;
    for read in 1..ids.len() {
        if ids[read] != ids[write - 1] {
            ids[write] = ids[read];
            write += 1;
        }
    }
    write
}

/// Forward-only search cursor over a long sorted slice.
///
/// Successive targets must be ascending. Each lookup probes one fixed step
/// ahead of the cursor (twice at most) to narrow the window, then binary
/// searches it. The cursor never moves backwards, so a full pass over a
/// short slice costs well under a linear scan of the long one.
pub struct Galloper<'a> {
    ids: &'a [u32],
    low: usize,
    step: usize,
}

impl<'a> Galloper<'a> {
    /// Cursor over `ids` for roughly `lookups` ascending targets.
    pub fn new(ids: &'a [u32], lookups: usize) -> Galloper<'a> {
        Galloper {
            ids,
            low: 0,
            step: (ids.len() / lookups.max(1) + 1) * 2,
        }
    }

    /// Behaves like `binary_search` on the unvisited tail: `Ok(index)` on a hit,
    /// `Err(insertion_point)` on a miss.
    pub fn seek(&mut self, target: u32) -> Result<usize, usize> {
        let ids = self.ids;
        let mut low = self.low;
        let mut high = ids.len();
        for _ in 0..2 {
            let probe = low + self.step;
            if probe >= high {
                break;
            }
            if ids[probe] >= target {
                high = probe + 1;
                break;
            }
            low = probe + 1;
        }
        let index = low + find_index(&ids[low..high], target);
        if index < ids.len() && ids[index] == target {
            self.low = index + 1;
            Ok(index)
        } else {
            self.low = index;
            Err(index)
        }
    }

    /// Position of the cursor: everything before it is below the last target.
    pub fn position(&self) -> usize {
        self.low
    }
}

/// Orders a pair so the shorter slice comes first.
#[inline]
fn by_len<'a>(a: &'a [u32], b: &'a [u32]) -> (&'a [u32], &'a [u32]) {
    if a.len() <= b.len() { (a, b) } else { (b, a) }
}

pub fn intersection_size(a: &[u32], b: &[u32]) -> usize {
    let (small, large) = by_len(a, b);
    if small.is_empty() {
        return 0;
    }
    if is_skewed(small.len(), large.len()) {
        let mut galloper = Galloper::new(large, small.len());
        return small
            .iter()
            .filter(|&&id| galloper.seek(id).is_ok())
            .count();
    }
    let (mut i, mut j, mut count) = (0, 0, 0);
    while i < small.len() && j < large.len() {
        let (x, y) = (small[i], large[j]);
        if x > y {
            j += 1;
        } else if x < y {
            i += 1;
        } else {
            count += 1;
            i += 1;
            j += 1;
        }
    }
    count
}

pub fn intersects(a: &[u32], b: &[u32]) -> bool {
    let (small, large) = by_len(a, b);
    if small.is_empty() {
        return false;
    }
    if is_skewed(small.len(), large.len()) {
        let mut galloper = Galloper::new(large, small.len());
        return small.iter().any(|&id| galloper.seek(id).is_ok());
    }
    let (mut i, mut j) = (0, 0);
    while i < small.len() && j < large.len() {
        let (x, y) = (small[i], large[j]);
        if x > y {
            j += 1;
        } else if x < y {
            i += 1;
        } else {
            return true;
        }
    }
    false
}

/// Writes `a ∩ b` to `out`, which must hold `min(a.len(), b.len())` ids.
pub fn intersection_into(a: &[u32], b: &[u32], out: &mut [u32]) -> usize {
    let (small, large) = by_len(a, b);
    let mut k = 0;
    if small.is_empty() {
        return 0;
    }
    if is_skewed(small.len(), large.len()) {
        let mut galloper = Galloper::new(large, small.len());
        for &id in small {
            if galloper.seek(id).is_ok() {
                out[k] = id;
                k += 1;
            }
        }
        return k;
    }
    let (mut i, mut j) = (0, 0);
    while i < small.len() && j < large.len() {
        let (x, y) = (small[i], large[j]);
        if x > y {
            j += 1;
        } else if x < y {
            i += 1;
        } else {
            out[k] = x;
            k += 1;
            i += 1;
            j += 1;
        }
    }
    k
}

/// Writes `a \ b` to `out`, which must hold `a.len()` ids.
///
/// Unlike the symmetric kernels the operands keep their roles, so there are
/// two skewed cases: a long `b` is galloped once per element of `a`, while a
/// long `a` is galloped once per element of `b` and copied in runs between
/// the hits.
pub fn and_not_into(a: &[u32], b: &[u32], out: &mut [u32]) -> usize {
    if a.is_empty() {
        return 0;
    }
    if b.is_empty() {
        out[..a.len()].copy_from_slice(a);
        return a.len();
    }
    let mut k = 0;
    if is_skewed(a.len(), b.len()) {
        let mut galloper = Galloper::new(b, a.len());
        for &id in a {
            if galloper.seek(id).is_err() {
                out[k] = id;
                k += 1;
            }
        }
        return k;
    }
    if is_skewed(b.len(), a.len()) {
        let mut galloper = Galloper::new(a, b.len());
        let mut copied = 0;
        for &id in b {
            let (run_end, next) = match galloper.seek(id) {
                Ok(index) => (index, index + 1),
                Err(index) => (index, index),
            };
            let run = &a[copied..run_end];
            out[k..k + run.len()].copy_from_slice(run);
            k += run.len();
            copied = next;
            if copied >= a.len() {
                break;
            }
        }
        let tail = &a[copied..];
        out[k..k + tail.len()].copy_from_slice(tail);
        return k + tail.len();
    }
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let (x, y) = (a[i], b[j]);
        if x > y {
            j += 1;
        } else if x < y {
            out[k] = x;
            k += 1;
            i += 1;
        } else {
            i += 1;
            j += 1;
        }
    }
    let tail = &a[i..];
    out[k..k + tail.len()].copy_from_slice(tail);
    k + tail.len()
}

/// Writes `a ∪ b` to `out`, which must hold `a.len() + b.len()` ids.
pub fn union_into(a: &[u32], b: &[u32], out: &mut [u32]) -> usize {
    merge_into(a, b, out, true)
}

/// Writes the symmetric difference of `a` and `b` to `out`, which must hold
/// `a.len() + b.len()` ids.
pub fn xor_into(a: &[u32], b: &[u32], out: &mut [u32]) -> usize {
    merge_into(a, b, out, false)
}

fn merge_into(a: &[u32], b: &[u32], out: &mut [u32], keep_common: bool) -> usize {
    let (mut i, mut j, mut k) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        let (x, y) = (a[i], b[j]);
        if x < y {
            out[k] = x;
            k += 1;
            i += 1;
        } else if x > y {
            out[k] = y;
            k += 1;
            j += 1;
        } else {
            if keep_common {
                out[k] = x;
                k += 1;
            }
            i += 1;
            j += 1;
        }
    }
    for tail in [&a[i..], &b[j..]] {
        out[k..k + tail.len()].copy_from_slice(tail);
        k += tail.len();
    }
    k
}
