//! Allocation tracking for leak diagnostics
//!
//! When a pool is built with [`PoolConfig::track_allocations`] every general
//! allocation gets an [`AllocationRecord`] keyed by its address. Records live
//! in the tracker's own collections, never inside the pool region, so a
//! corrupted block cannot corrupt the diagnostics that would expose it.
//!
//! Chunks are not tracked.
//!
//! [`PoolConfig::track_allocations`]: crate::config::PoolConfig::track_allocations

use core::fmt;
use core::panic::Location;
use std::collections::{HashMap, VecDeque};

use crate::error::{MemoryError, MemoryResult};
use crate::pool::MemoryPool;

#[cfg(feature = "logging")]
use tracing::{info, warn};

/// Call site attached to an allocation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
}

impl SourceLocation {
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    /// Location of the caller, propagated through `#[track_caller]` frames
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One tracked general allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRecord {
    /// Address returned to the caller
    pub address: usize,
    /// Size the caller asked for
    pub size: usize,
    /// Where the allocation was made, when known
    pub location: Option<SourceLocation>,
    /// `false` once the block has been freed
    pub live: bool,
    /// Monotonic sequence number, in allocation order
    pub sequence: u64,
}

impl fmt::Display for AllocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:<6} {:#014x} {:>10} bytes  {:<5}",
            self.sequence,
            self.address,
            self.size,
            if self.live { "live" } else { "freed" }
        )?;
        match self.location {
            Some(location) => write!(f, "  {location}"),
            None => f.write_str("  <unknown>"),
        }
    }
}

/// Bookkeeping for every tracked allocation of one pool
#[derive(Debug, Default)]
pub struct AllocationTracker {
    live: HashMap<usize, AllocationRecord>,
    freed: VecDeque<AllocationRecord>,
    retained_freed: usize,
    anomalies: usize,
    next_sequence: u64,
}

impl AllocationTracker {
    /// Create a tracker that keeps at most `retained_freed` freed records
    pub fn new(retained_freed: usize) -> Self {
        Self {
            retained_freed,
            ..Self::default()
        }
    }

    /// Number of live records
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Number of retained freed records
    pub fn freed_count(&self) -> usize {
        self.freed.len()
    }

    /// Frees and reallocations of addresses with no live record
    pub fn anomalies(&self) -> usize {
        self.anomalies
    }

    /// Live record for `address`, if any
    pub fn get(&self, address: usize) -> Option<&AllocationRecord> {
        self.live.get(&address)
    }

    pub(crate) fn record_alloc(
        &mut self,
        address: usize,
        size: usize,
        location: Option<SourceLocation>,
    ) {
        let record = AllocationRecord {
            address,
            size,
            location,
            live: true,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        if self.live.insert(address, record).is_some() {
            // the pool handed out an address that was still recorded as live
            self.note_anomaly(address, "allocate");
        }
    }

    /// Moves the record of `old` to `new` with the reallocation's size and
    /// call site. An unrecorded `old` counts as an anomaly and starts a
    /// fresh record.
    pub(crate) fn record_realloc(
        &mut self,
        old: usize,
        new: usize,
        size: usize,
        location: Option<SourceLocation>,
    ) {
        if self.live.remove(&old).is_none() {
            self.note_anomaly(old, "reallocate");
        }
        self.record_alloc(new, size, location);
    }

    /// Marks the record for `address` freed. Returns `false` for an
    /// anomaly.
    pub(crate) fn record_free(&mut self, address: usize) -> bool {
        let Some(mut record) = self.live.remove(&address) else {
            self.note_anomaly(address, "free");
            return false;
        };
        record.live = false;
        if self.retained_freed > 0 {
            if self.freed.len() == self.retained_freed {
                self.freed.pop_front();
            }
            self.freed.push_back(record);
        }
        true
    }

    pub(crate) fn note_anomaly(&mut self, address: usize, operation: &'static str) {
        self.anomalies += 1;

        #[cfg(feature = "logging")]
        warn!(operation, "tracker anomaly: no live record for {address:#x}");
        #[cfg(not(feature = "logging"))]
        let _ = (address, operation);
    }

    /// Snapshot of live records, plus retained freed records unless
    /// `leaks_only`, in allocation order
    pub fn snapshot(&self, leaks_only: bool) -> HeapDump {
        let mut entries: Vec<AllocationRecord> = self.live.values().copied().collect();
        if !leaks_only {
            entries.extend(self.freed.iter().copied());
        }
        entries.sort_by_key(|record| record.sequence);

        HeapDump {
            entries,
            live_count: self.live.len(),
            leaks_only,
        }
    }
}

/// Result of a heap dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapDump {
    /// Dumped records in allocation order
    pub entries: Vec<AllocationRecord>,
    /// Number of allocated (live) blocks at dump time
    pub live_count: usize,
    /// Whether freed records were excluded
    pub leaks_only: bool,
}

impl HeapDump {
    /// Bytes still held by live records
    pub fn leaked_bytes(&self) -> usize {
        self.entries
            .iter()
            .filter(|record| record.live)
            .map(|record| record.size)
            .sum()
    }

    /// Iterator over the live records only
    pub fn leaks(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.entries.iter().filter(|record| record.live)
    }
}

impl fmt::Display for HeapDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Heap dump ({}): {} live blocks, {} bytes",
            if self.leaks_only { "leaks" } else { "full" },
            self.live_count,
            self.leaked_bytes()
        )?;
        for record in &self.entries {
            writeln!(f, "  {record}")?;
        }
        Ok(())
    }
}

impl MemoryPool {
    /// Tracker of this pool, if tracking is enabled
    pub fn tracker(&self) -> Option<&AllocationTracker> {
        self.tracker.as_ref()
    }

    /// Emit the tracked records through `tracing` and return the number of
    /// allocated blocks
    ///
    /// With `leaks_only` only live records are emitted; otherwise retained
    /// freed records are emitted too. The return value counts live blocks in
    /// both modes.
    pub fn dump(&self, leaks_only: bool) -> MemoryResult<usize> {
        let report = self.dump_report(leaks_only)?;

        #[cfg(feature = "logging")]
        {
            info!(
                live = report.live_count,
                bytes = report.leaked_bytes(),
                leaks_only,
                "heap dump"
            );
            for record in &report.entries {
                info!("{record}");
            }
        }

        Ok(report.live_count)
    }

    /// Same content as [`MemoryPool::dump`], returned as a value
    pub fn dump_report(&self, leaks_only: bool) -> MemoryResult<HeapDump> {
        self.ensure_initialized()?;
        self.tracker
            .as_ref()
            .map(|tracker| tracker.snapshot(leaks_only))
            .ok_or_else(|| MemoryError::not_supported("allocation tracking"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_location() {
        let here = SourceLocation::caller();
        assert!(here.file.ends_with("tracker.rs"));
        assert!(here.line > 0);
    }

    #[test]
    fn test_alloc_free_lifecycle() {
        let mut tracker = AllocationTracker::new(4);
        tracker.record_alloc(0x100, 32, None);
        tracker.record_alloc(0x200, 64, Some(SourceLocation::new("a.rs", 7)));
        assert_eq!(tracker.live_count(), 2);

        assert!(tracker.record_free(0x100));
        assert_eq!(tracker.live_count(), 1);
        assert_eq!(tracker.freed_count(), 1);
        assert_eq!(tracker.anomalies(), 0);
    }

    #[test]
    fn test_unknown_free_is_anomaly() {
        let mut tracker = AllocationTracker::new(4);
        assert!(!tracker.record_free(0xdead0));
        assert_eq!(tracker.anomalies(), 1);
    }

    #[test]
    fn test_realloc_rekeys_record() {
        let mut tracker = AllocationTracker::new(0);
        tracker.record_alloc(0x100, 16, None);
        tracker.record_realloc(0x100, 0x400, 48, None);

        assert!(tracker.get(0x100).is_none());
        assert_eq!(tracker.get(0x400).map(|r| r.size), Some(48));
        assert_eq!(tracker.anomalies(), 0);
    }

    #[test]
    fn test_freed_history_is_bounded() {
        let mut tracker = AllocationTracker::new(2);
        for address in [0x10, 0x20, 0x30] {
            tracker.record_alloc(address, 8, None);
            tracker.record_free(address);
        }
        assert_eq!(tracker.freed_count(), 2);

        let dump = tracker.snapshot(false);
        let addresses: Vec<usize> = dump.entries.iter().map(|r| r.address).collect();
        assert_eq!(addresses, vec![0x20, 0x30]);
        assert_eq!(dump.live_count, 0);
    }

    #[test]
    fn test_snapshot_orders_by_sequence() {
        let mut tracker = AllocationTracker::new(8);
        tracker.record_alloc(0x300, 1, None);
        tracker.record_alloc(0x100, 2, None);
        tracker.record_alloc(0x200, 3, None);
        tracker.record_free(0x100);

        let leaks = tracker.snapshot(true);
        let order: Vec<u64> = leaks.entries.iter().map(|r| r.sequence).collect();
        assert_eq!(order, vec![0, 2]);
        assert_eq!(leaks.leaked_bytes(), 4);

        let full = tracker.snapshot(false);
        assert_eq!(full.entries.len(), 3);
        assert_eq!(full.live_count, 2);
        assert_eq!(full.leaks().count(), 2);
    }

    #[test]
    fn test_dump_display() {
        let mut tracker = AllocationTracker::new(0);
        tracker.record_alloc(0x40, 100, Some(SourceLocation::new("main.rs", 12)));
        let text = tracker.snapshot(true).to_string();
        assert!(text.contains("1 live blocks, 100 bytes"));
        assert!(text.contains("main.rs:12"));
    }
}
