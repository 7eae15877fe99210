//! The memory pool context
//!
//! A [`MemoryPool`] owns (or borrows) one contiguous region and carves every
//! general block and chunk reservation out of it. All bookkeeping lives
//! outside the region: a free extent list, a block map for the general
//! allocator, a chunk registry, and an optional allocation tracker.
//!
//! The pool does no internal locking. Mutating operations take `&mut self`;
//! wrap the pool in a mutex (see [`crate::global`]) to share it.
//!
//! ## Lifecycle
//!
//! ```text
//! initialize ──► Initialized ──finalize / drop──► Finalized
//! ```
//!
//! Every allocator operation on a finalized pool returns
//! [`MemoryError::InvalidState`].

use core::fmt;
use core::ptr::NonNull;
use std::collections::HashMap;

use crate::backing::{BackingStore, Region, SystemStore};
use crate::callback::{AllocFailure, AllocOp, FailureCallback, FailureHook};
use crate::chunk::ChunkEntry;
use crate::config::PoolConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::extent::FreeExtents;
use crate::general::Block;
use crate::stats::{PoolCounters, PoolStats};
use crate::tracker::AllocationTracker;
use crate::utils::{GRANULE, checked_align_up};

#[cfg(feature = "logging")]
use tracing::{info, warn};

/// Lifecycle state of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolState {
    /// No pool exists yet (observable through the global facade)
    Uninitialized,
    /// Serving allocations
    Initialized,
    /// Storage released; every operation is refused
    Finalized,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Finalized => "finalized",
        })
    }
}

/// Bounded memory pool serving general blocks and fixed-base chunks
pub struct MemoryPool {
    pub(crate) config: PoolConfig,
    state: PoolState,
    pub(crate) region: Region,
    capacity: usize,
    pub(crate) extents: FreeExtents,
    /// General blocks keyed by region offset
    pub(crate) blocks: HashMap<usize, Block>,
    /// Chunk reservations keyed by region offset
    pub(crate) chunks: HashMap<usize, ChunkEntry>,
    pub(crate) tracker: Option<AllocationTracker>,
    hook: FailureHook,
    pub(crate) counters: PoolCounters,
}

// SAFETY: the pool is the only handle to its region (provider-owned regions
// are exclusively acquired, borrowed regions are handed over by the caller
// under the `from_raw_parts` contract). Everything else it holds is Send.
unsafe impl Send for MemoryPool {}

impl MemoryPool {
    /// Create a pool backed by the global allocator
    pub fn initialize(config: PoolConfig) -> MemoryResult<Self> {
        Self::initialize_with(config, SystemStore::new())
    }

    /// Create a pool whose region comes from `store`
    ///
    /// The region is `config.effective_size()` bytes and is handed back to
    /// `store` on [`MemoryPool::finalize`] or drop.
    pub fn initialize_with<S>(config: PoolConfig, store: S) -> MemoryResult<Self>
    where
        S: BackingStore + 'static,
    {
        config.validate()?;
        let region = Region::acquire(Box::new(store), config.effective_size())?;
        Ok(Self::with_region(config, region))
    }

    /// Create a pool over a caller-supplied static buffer
    ///
    /// `config.size` is ignored; the buffer length (less any leading bytes
    /// needed to reach granule alignment) is the capacity.
    pub fn from_static(buffer: &'static mut [u8], config: PoolConfig) -> MemoryResult<Self> {
        let len = buffer.len();
        let base = NonNull::from(buffer).cast::<u8>();
        // SAFETY: a `&'static mut` buffer is valid for the program's lifetime
        // and the exclusive borrow is moved into the pool.
        unsafe { Self::from_raw_parts(base, len, config) }
    }

    /// Create a pool over a caller-supplied region
    ///
    /// The pool never releases the region.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `len` bytes for as long
    /// as the pool or any pointer it returned is in use, and nothing else may
    /// access the region meanwhile.
    pub unsafe fn from_raw_parts(
        base: NonNull<u8>,
        len: usize,
        config: PoolConfig,
    ) -> MemoryResult<Self> {
        let addr = base.as_ptr() as usize;
        let aligned = checked_align_up(addr, GRANULE)
            .ok_or_else(|| MemoryError::invalid_config("region base overflows"))?;
        let pad = aligned - addr;
        let usable = len.saturating_sub(pad);
        if usable < GRANULE {
            return Err(MemoryError::invalid_config(&format!(
                "region of {len} bytes holds no aligned {GRANULE}-byte granule"
            )));
        }

        // SAFETY: pad < GRANULE <= len, so the aligned base is inside the region.
        let aligned_base = unsafe { base.add(pad) };
        Ok(Self::with_region(
            config,
            Region::borrowed(aligned_base, usable),
        ))
    }

    fn with_region(config: PoolConfig, region: Region) -> Self {
        let extents = FreeExtents::new(region.len());
        let capacity = extents.free_bytes();
        let tracker = config
            .track_allocations
            .then(|| AllocationTracker::new(config.retained_freed_records));

        #[cfg(feature = "logging")]
        info!(
            capacity,
            provider = region.provider_name(),
            tracking = config.track_allocations,
            "memory pool initialized ({})",
            crate::utils::format_bytes(capacity)
        );

        Self {
            config,
            state: PoolState::Initialized,
            region,
            capacity,
            extents,
            blocks: HashMap::new(),
            chunks: HashMap::new(),
            tracker,
            hook: FailureHook::default(),
            counters: PoolCounters::default(),
        }
    }

    /// Release provider-owned storage and refuse all further operations
    ///
    /// Outstanding blocks and chunks become invalid. Calling this twice
    /// returns [`MemoryError::InvalidState`].
    pub fn finalize(&mut self) -> MemoryResult<()> {
        if self.state != PoolState::Initialized {
            return Err(MemoryError::invalid_state(&format!(
                "cannot finalize a {} pool",
                self.state
            )));
        }

        #[cfg(feature = "logging")]
        {
            if !self.blocks.is_empty() || !self.chunks.is_empty() {
                warn!(
                    blocks = self.blocks.len(),
                    chunks = self.chunks.len(),
                    "finalizing pool with outstanding allocations"
                );
            }
            info!(
                peak_used = self.counters.peak_used,
                allocations = self.counters.allocations,
                "memory pool finalized"
            );
        }

        self.region.release();
        self.blocks.clear();
        self.chunks.clear();
        self.extents = FreeExtents::new(0);
        self.state = PoolState::Finalized;
        Ok(())
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == PoolState::Initialized
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether tracking was enabled at construction
    pub fn is_tracking(&self) -> bool {
        self.tracker.is_some()
    }

    /// Total capacity in bytes; `None` outside the initialized state
    pub fn total_heap(&self) -> Option<usize> {
        self.is_initialized().then_some(self.capacity)
    }

    /// Bytes currently free; `None` outside the initialized state
    pub fn free_heap(&self) -> Option<usize> {
        self.is_initialized().then(|| self.extents.free_bytes())
    }

    /// Whether `ptr` lies inside this pool's region
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.is_initialized() && self.region.offset_of(ptr.as_ptr() as usize).is_some()
    }

    /// Register the failure callback, returning the previous one
    pub fn set_failure_callback<F>(&mut self, callback: F) -> Option<FailureCallback>
    where
        F: FnMut(&AllocFailure) + Send + 'static,
    {
        self.hook.set(Box::new(callback))
    }

    /// Remove the failure callback
    pub fn take_failure_callback(&mut self) -> Option<FailureCallback> {
        self.hook.take()
    }

    /// Snapshot of usage and counters
    pub fn stats(&self) -> PoolStats {
        let free_bytes = self.extents.free_bytes();
        let total_bytes = if self.is_initialized() {
            self.capacity
        } else {
            0
        };
        PoolStats {
            total_bytes,
            free_bytes,
            used_bytes: total_bytes - free_bytes,
            peak_used_bytes: self.counters.peak_used,
            live_blocks: self.blocks.len(),
            live_chunks: self.chunks.len(),
            chunk_reserved_bytes: self.chunks.values().map(|chunk| chunk.reserved).sum(),
            allocation_count: self.counters.allocations,
            free_count: self.counters.frees,
            reallocation_count: self.counters.reallocations,
            failed_allocations: self.hook.fired() as u64,
            free_extents: self.extents.extent_count(),
            largest_free_extent: self.extents.largest_extent(),
            anomalies: self.tracker.as_ref().map_or(0, AllocationTracker::anomalies),
        }
    }

    // ------------------------------------------------------------------------
    // Shared plumbing for the general and chunk allocators
    // ------------------------------------------------------------------------

    pub(crate) fn ensure_initialized(&self) -> MemoryResult<()> {
        match self.state {
            PoolState::Initialized => Ok(()),
            state => Err(MemoryError::invalid_state(&format!(
                "operation on a {state} pool"
            ))),
        }
    }

    /// Take `size` bytes at `align` from the free list
    pub(crate) fn take_extent(&mut self, size: usize, align: usize) -> Option<usize> {
        let offset = self
            .extents
            .take_first_fit(self.region.base_addr(), size, align)?;
        self.observe_usage();
        Some(offset)
    }

    /// Grow the run ending at `end` in place
    pub(crate) fn extend_extent(&mut self, end: usize, extra: usize) -> bool {
        let extended = self.extents.try_extend(end, extra);
        if extended {
            self.observe_usage();
        }
        extended
    }

    /// Return a run to the free list, painting it with the dealloc pattern
    pub(crate) fn release_extent(&mut self, offset: usize, size: usize) {
        self.fill_dealloc(offset, size);
        self.extents.release(offset, size);
    }

    pub(crate) fn observe_usage(&mut self) {
        let used = self.capacity - self.extents.free_bytes();
        self.counters.observe_used(used);
    }

    pub(crate) fn fill(&mut self, offset: usize, len: usize, byte: u8) {
        if len == 0 {
            return;
        }
        debug_assert!(offset + len <= self.region.len());
        // SAFETY: [offset, offset + len) lies inside the region and belongs to
        // a block or extent the caller controls.
        unsafe { self.region.ptr_at(offset).as_ptr().write_bytes(byte, len) };
    }

    pub(crate) fn fill_alloc(&mut self, offset: usize, len: usize) {
        if let Some(pattern) = self.config.alloc_pattern {
            self.fill(offset, len, pattern);
        }
    }

    pub(crate) fn fill_dealloc(&mut self, offset: usize, len: usize) {
        if let Some(pattern) = self.config.dealloc_pattern {
            self.fill(offset, len, pattern);
        }
    }

    /// Notify the failure callback; runs before the error is returned
    pub(crate) fn report_failure(&mut self, op: AllocOp, requested: usize) {
        let failure = AllocFailure {
            op,
            requested,
            free_bytes: self.extents.free_bytes(),
        };

        #[cfg(feature = "logging")]
        warn!("{failure}");

        self.hook.notify(&failure);
    }

    /// Region offset of `ptr`, if it points inside the region
    pub(crate) fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.region.offset_of(ptr.as_ptr() as usize)
    }
}

impl Drop for MemoryPool {
    fn drop(&mut self) {
        if self.is_initialized() {
            let _ = self.finalize();
        }
    }
}

impl fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPool")
            .field("state", &self.state)
            .field("provider", &self.region.provider_name())
            .field("borrowed", &self.region.is_borrowed())
            .field("capacity", &self.capacity)
            .field("free", &self.extents.free_bytes())
            .field("blocks", &self.blocks.len())
            .field("chunks", &self.chunks.len())
            .field("tracking", &self.tracker.is_some())
            .field("hook", &self.hook)
            .finish()
    }
}
