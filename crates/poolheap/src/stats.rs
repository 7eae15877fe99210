//! Pool statistics

use core::fmt;

use crate::utils::format_bytes;

/// Running counters kept by a pool
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PoolCounters {
    pub(crate) allocations: u64,
    pub(crate) frees: u64,
    pub(crate) reallocations: u64,
    pub(crate) peak_used: usize,
}

impl PoolCounters {
    pub(crate) fn observe_used(&mut self, used: usize) {
        self.peak_used = self.peak_used.max(used);
    }
}

/// Point-in-time snapshot of a pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Usable capacity in bytes
    pub total_bytes: usize,
    /// Bytes not held by blocks or chunk reservations
    pub free_bytes: usize,
    /// `total_bytes - free_bytes`
    pub used_bytes: usize,
    /// Highest `used_bytes` observed
    pub peak_used_bytes: usize,

    /// Outstanding general blocks
    pub live_blocks: usize,
    /// Outstanding chunks
    pub live_chunks: usize,
    /// Bytes reserved by outstanding chunks
    pub chunk_reserved_bytes: usize,

    pub allocation_count: u64,
    pub free_count: u64,
    pub reallocation_count: u64,
    /// Requests that ended in a capacity failure
    pub failed_allocations: u64,

    /// Number of free extents
    pub free_extents: usize,
    /// Size of the largest free extent
    pub largest_free_extent: usize,

    /// Tracker anomalies (0 when tracking is off)
    pub anomalies: usize,
}

impl PoolStats {
    /// External fragmentation: `1 - largest_free_extent / free_bytes`
    ///
    /// `0.0` when all free space is one extent or nothing is free.
    pub fn fragmentation(&self) -> f64 {
        if self.free_bytes == 0 {
            return 0.0;
        }
        1.0 - self.largest_free_extent as f64 / self.free_bytes as f64
    }

    /// Fraction of capacity in use
    pub fn utilization(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pool Statistics:")?;
        writeln!(f, "  Total: {}", format_bytes(self.total_bytes))?;
        writeln!(
            f,
            "  Used: {} ({:.1}%), peak {}",
            format_bytes(self.used_bytes),
            self.utilization() * 100.0,
            format_bytes(self.peak_used_bytes)
        )?;
        writeln!(f, "  Free: {}", format_bytes(self.free_bytes))?;
        writeln!(
            f,
            "  Blocks: {} live, {} allocated, {} freed, {} reallocated, {} failed",
            self.live_blocks,
            self.allocation_count,
            self.free_count,
            self.reallocation_count,
            self.failed_allocations
        )?;
        writeln!(
            f,
            "  Chunks: {} live, {} reserved",
            self.live_chunks,
            format_bytes(self.chunk_reserved_bytes)
        )?;
        writeln!(
            f,
            "  Free extents: {} (largest {}, fragmentation {:.1}%)",
            self.free_extents,
            format_bytes(self.largest_free_extent),
            self.fragmentation() * 100.0
        )?;
        write!(f, "  Tracker anomalies: {}", self.anomalies)
    }
}
