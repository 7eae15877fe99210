//! Free extent bookkeeping
//!
//! Free space is tracked out of band as an address-ordered map of
//! `offset -> length` runs. Keeping the metadata outside the pool region means
//! block contents can never corrupt it, and chunk reservations can take any
//! aligned run without reserving header space.
//!
//! ## Invariants
//!
//! - Extents never overlap and never touch: adjacent runs are merged on release
//! - Every offset and length is a multiple of [`GRANULE`]
//! - `free_bytes` equals the sum of all extent lengths

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::utils::{GRANULE, checked_align_up, is_aligned};

/// Address-ordered set of free runs inside a pool region
#[derive(Debug, Clone)]
pub(crate) struct FreeExtents {
    /// Start offset -> run length
    runs: BTreeMap<usize, usize>,
    /// Sum of all run lengths
    free_bytes: usize,
}

impl FreeExtents {
    /// Creates a free list covering `[0, len)` rounded down to whole granules
    pub(crate) fn new(len: usize) -> Self {
        let usable = len - len % GRANULE;
        let mut runs = BTreeMap::new();
        if usable > 0 {
            runs.insert(0, usable);
        }
        Self {
            runs,
            free_bytes: usable,
        }
    }

    pub(crate) fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    pub(crate) fn extent_count(&self) -> usize {
        self.runs.len()
    }

    pub(crate) fn largest_extent(&self) -> usize {
        self.runs.values().copied().max().unwrap_or(0)
    }

    /// Takes `size` bytes from the first run that can hold them at an address
    /// aligned to `align`, where `base_addr` is the absolute address of
    /// offset zero. Returns the offset of the taken run.
    pub(crate) fn take_first_fit(
        &mut self,
        base_addr: usize,
        size: usize,
        align: usize,
    ) -> Option<usize> {
        debug_assert!(is_aligned(size, GRANULE));
        debug_assert!(align >= GRANULE);

        let (run_start, run_len, start) = self.runs.iter().find_map(|(&offset, &len)| {
            let addr = base_addr.checked_add(offset)?;
            let aligned = checked_align_up(addr, align)?;
            let pad = aligned - addr;
            (pad.checked_add(size)? <= len).then_some((offset, len, offset + pad))
        })?;

        self.runs.remove(&run_start);
        if start > run_start {
            self.runs.insert(run_start, start - run_start);
        }
        let end = start + size;
        let run_end = run_start + run_len;
        if run_end > end {
            self.runs.insert(end, run_end - end);
        }
        self.free_bytes -= size;
        Some(start)
    }

    /// Grows an in-use run ending at `end` by `extra` bytes, if the run that
    /// starts exactly at `end` is free and large enough.
    pub(crate) fn try_extend(&mut self, end: usize, extra: usize) -> bool {
        debug_assert!(is_aligned(extra, GRANULE));

        match self.runs.get(&end).copied() {
            Some(len) if len >= extra => {
                self.runs.remove(&end);
                if len > extra {
                    self.runs.insert(end + extra, len - extra);
                }
                self.free_bytes -= extra;
                true
            }
            _ => false,
        }
    }

    /// Returns `[offset, offset + size)` to the free list, merging with
    /// neighbouring runs.
    pub(crate) fn release(&mut self, offset: usize, size: usize) {
        debug_assert!(is_aligned(offset, GRANULE) && is_aligned(size, GRANULE));
        if size == 0 {
            return;
        }

        let mut start = offset;
        let mut len = size;

        let previous = self
            .runs
            .range(..offset)
            .next_back()
            .map(|(&o, &l)| (o, l));
        if let Some((prev_start, prev_len)) = previous {
            debug_assert!(prev_start + prev_len <= offset, "release overlaps a free run");
            if prev_start + prev_len == offset {
                self.runs.remove(&prev_start);
                start = prev_start;
                len += prev_len;
            }
        }

        let next = self
            .runs
            .range((Bound::Excluded(offset), Bound::Unbounded))
            .next()
            .map(|(&o, &l)| (o, l));
        if let Some((next_start, next_len)) = next {
            debug_assert!(offset + size <= next_start, "release overlaps a free run");
            if offset + size == next_start {
                self.runs.remove(&next_start);
                len += next_len;
            }
        }

        self.runs.insert(start, len);
        self.free_bytes += size;
    }
}
