//! General-purpose allocation on a [`MemoryPool`]
//!
//! Blocks are carved first-fit from the pool's free extents in whole
//! [`GRANULE`]s, so every returned pointer is 16-byte aligned and a
//! zero-size request still receives a distinct, freeable pointer.
//!
//! The plain entry points are `#[track_caller]`: with tracking enabled the
//! caller's file and line land in the allocation record. Shims that forward
//! calls on behalf of someone else use the `*_at` variants and pass the
//! location they captured themselves.

use core::ffi::CStr;
use core::ptr::{self, NonNull};

use crate::callback::AllocOp;
use crate::error::{MemoryError, MemoryResult};
use crate::pool::MemoryPool;
use crate::tracker::SourceLocation;
use crate::utils::{GRANULE, granules_for};

/// A live general block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block {
    /// Region offset of the block
    pub(crate) offset: usize,
    /// Bytes taken from the free list (whole granules)
    pub(crate) size: usize,
    /// Bytes the caller asked for
    pub(crate) requested: usize,
}

impl MemoryPool {
    /// Allocate `size` bytes
    #[track_caller]
    pub fn allocate(&mut self, size: usize) -> MemoryResult<NonNull<u8>> {
        self.allocate_at(size, Some(SourceLocation::caller()))
    }

    /// Allocate `count * elem_size` zeroed bytes
    ///
    /// An overflowing product is a capacity failure: the failure callback
    /// fires and [`MemoryError::SizeOverflow`] is returned.
    #[track_caller]
    pub fn allocate_zeroed(
        &mut self,
        count: usize,
        elem_size: usize,
    ) -> MemoryResult<NonNull<u8>> {
        self.allocate_zeroed_at(count, elem_size, Some(SourceLocation::caller()))
    }

    /// Resize a block, preserving `min(old, new)` bytes
    ///
    /// `None` behaves as [`MemoryPool::allocate`]. Shrinking happens in
    /// place. Growth extends into the adjacent free extent when possible and
    /// otherwise moves the block. On failure the original block is untouched.
    #[track_caller]
    pub fn reallocate(
        &mut self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
    ) -> MemoryResult<NonNull<u8>> {
        self.reallocate_at(ptr, new_size, Some(SourceLocation::caller()))
    }

    /// Copy `text` into a new NUL-terminated block
    #[track_caller]
    pub fn duplicate_string(&mut self, text: &str) -> MemoryResult<NonNull<u8>> {
        self.duplicate_bytes(text.as_bytes(), Some(SourceLocation::caller()))
    }

    /// Copy `text`, including its terminator, into a new block
    #[track_caller]
    pub fn duplicate_cstr(&mut self, text: &CStr) -> MemoryResult<NonNull<u8>> {
        let bytes = text.to_bytes();
        self.duplicate_bytes(bytes, Some(SourceLocation::caller()))
    }

    pub fn allocate_at(
        &mut self,
        size: usize,
        location: Option<SourceLocation>,
    ) -> MemoryResult<NonNull<u8>> {
        self.ensure_initialized()?;
        let block = self.carve(AllocOp::Allocate, size)?;
        self.fill_alloc(block.offset, block.size);
        Ok(self.commit(block, location))
    }

    pub fn allocate_zeroed_at(
        &mut self,
        count: usize,
        elem_size: usize,
        location: Option<SourceLocation>,
    ) -> MemoryResult<NonNull<u8>> {
        self.ensure_initialized()?;
        let Some(size) = count.checked_mul(elem_size) else {
            self.report_failure(AllocOp::AllocateZeroed, usize::MAX);
            return Err(MemoryError::size_overflow("allocate_zeroed"));
        };
        let block = self.carve(AllocOp::AllocateZeroed, size)?;
        self.fill(block.offset, block.size, 0);
        Ok(self.commit(block, location))
    }

    pub fn reallocate_at(
        &mut self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
        location: Option<SourceLocation>,
    ) -> MemoryResult<NonNull<u8>> {
        self.ensure_initialized()?;
        let Some(ptr) = ptr else {
            let block = self.carve(AllocOp::Reallocate, new_size)?;
            self.fill_alloc(block.offset, block.size);
            return Ok(self.commit(block, location));
        };

        let address = ptr.as_ptr() as usize;
        let Some(old) = self.live_block(ptr) else {
            if let Some(tracker) = self.tracker.as_mut() {
                tracker.note_anomaly(address, "reallocate");
            }
            return Err(MemoryError::unknown_pointer(address));
        };

        let Some(rounded) = granules_for(new_size) else {
            self.report_failure(AllocOp::Reallocate, new_size);
            return Err(MemoryError::size_overflow("reallocate"));
        };

        let moved = if rounded <= old.size {
            let tail = old.size - rounded;
            if tail > 0 {
                self.release_extent(old.offset + rounded, tail);
            }
            self.blocks.insert(
                old.offset,
                Block {
                    size: rounded,
                    requested: new_size,
                    ..old
                },
            );
            ptr
        } else if self.extend_extent(old.offset + old.size, rounded - old.size) {
            self.fill_alloc(old.offset + old.requested, rounded - old.requested);
            self.blocks.insert(
                old.offset,
                Block {
                    size: rounded,
                    requested: new_size,
                    ..old
                },
            );
            ptr
        } else {
            let new = self.carve(AllocOp::Reallocate, new_size)?;
            let new_ptr = self.region.ptr_at(new.offset);
            // SAFETY: both blocks are live, distinct, and at least
            // `old.requested` bytes long.
            unsafe { ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old.requested) };
            self.fill_alloc(new.offset + old.requested, new.size - old.requested);

            self.blocks.remove(&old.offset);
            self.release_extent(old.offset, old.size);
            self.blocks.insert(new.offset, new);
            new_ptr
        };

        self.counters.reallocations += 1;
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.record_realloc(address, moved.as_ptr() as usize, new_size, location);
        }
        Ok(moved)
    }

    pub fn duplicate_string_at(
        &mut self,
        text: &str,
        location: Option<SourceLocation>,
    ) -> MemoryResult<NonNull<u8>> {
        self.duplicate_bytes(text.as_bytes(), location)
    }

    fn duplicate_bytes(
        &mut self,
        bytes: &[u8],
        location: Option<SourceLocation>,
    ) -> MemoryResult<NonNull<u8>> {
        self.ensure_initialized()?;
        let Some(len) = bytes.len().checked_add(1) else {
            self.report_failure(AllocOp::DuplicateString, usize::MAX);
            return Err(MemoryError::size_overflow("duplicate_string"));
        };
        let block = self.carve(AllocOp::DuplicateString, len)?;
        let dst = self.region.ptr_at(block.offset);
        // SAFETY: the block holds at least `len` bytes and cannot overlap the
        // caller's borrowed source.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), dst.as_ptr(), bytes.len());
            dst.as_ptr().add(bytes.len()).write(0);
        }
        Ok(self.commit(block, location))
    }

    /// Return a block to the pool
    ///
    /// `None` is a no-op. A pointer that is not the start of a live general
    /// block (including a chunk base) is rejected with
    /// [`MemoryError::UnknownPointer`] and leaves the pool untouched.
    pub fn free(&mut self, ptr: Option<NonNull<u8>>) -> MemoryResult<()> {
        let Some(ptr) = ptr else {
            return Ok(());
        };
        self.ensure_initialized()?;

        let address = ptr.as_ptr() as usize;
        let Some(block) = self.live_block(ptr) else {
            if let Some(tracker) = self.tracker.as_mut() {
                tracker.note_anomaly(address, "free");
            }
            return Err(MemoryError::unknown_pointer(address));
        };

        self.blocks.remove(&block.offset);
        self.release_extent(block.offset, block.size);
        self.counters.frees += 1;
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.record_free(address);
        }
        Ok(())
    }

    /// Bytes usable through `ptr` (the request rounded up to the granule)
    pub fn usable_size(&self, ptr: NonNull<u8>) -> MemoryResult<usize> {
        self.ensure_initialized()?;
        self.live_block(ptr)
            .map(|block| block.size)
            .ok_or(MemoryError::UnknownPointer {
                address: ptr.as_ptr() as usize,
            })
    }

    /// Whether `ptr` is the start of a live general block
    pub fn is_live(&self, ptr: NonNull<u8>) -> bool {
        self.is_initialized() && self.live_block(ptr).is_some()
    }

    /// View the requested bytes of a live block
    pub fn as_slice(&self, ptr: NonNull<u8>) -> MemoryResult<&[u8]> {
        self.ensure_initialized()?;
        let block = self.live_block(ptr).ok_or(MemoryError::UnknownPointer {
            address: ptr.as_ptr() as usize,
        })?;
        // SAFETY: the block is live and `requested <= size` bytes long; the
        // shared borrow of the pool keeps it from being freed.
        Ok(unsafe { core::slice::from_raw_parts(ptr.as_ptr(), block.requested) })
    }

    /// Mutable view of the requested bytes of a live block
    pub fn as_mut_slice(&mut self, ptr: NonNull<u8>) -> MemoryResult<&mut [u8]> {
        self.ensure_initialized()?;
        let block = self.live_block(ptr).ok_or(MemoryError::UnknownPointer {
            address: ptr.as_ptr() as usize,
        })?;
        // SAFETY: as for `as_slice`; the exclusive borrow of the pool rules
        // out any other view handed out by it.
        Ok(unsafe { core::slice::from_raw_parts_mut(ptr.as_ptr(), block.requested) })
    }

    fn live_block(&self, ptr: NonNull<u8>) -> Option<Block> {
        let offset = self.offset_of(ptr)?;
        self.blocks.get(&offset).copied()
    }

    /// Take a block for `size` bytes, firing the failure callback if the
    /// pool cannot supply it
    fn carve(&mut self, op: AllocOp, size: usize) -> MemoryResult<Block> {
        let Some(rounded) = granules_for(size) else {
            self.report_failure(op, size);
            return Err(MemoryError::size_overflow(op.as_str()));
        };
        match self.take_extent(rounded, GRANULE) {
            Some(offset) => Ok(Block {
                offset,
                size: rounded,
                requested: size,
            }),
            None => {
                self.report_failure(op, size);
                Err(MemoryError::allocation_failed(size, GRANULE))
            }
        }
    }

    /// Register a carved block and record it with the tracker
    fn commit(&mut self, block: Block, location: Option<SourceLocation>) -> NonNull<u8> {
        let ptr = self.region.ptr_at(block.offset);
        self.blocks.insert(block.offset, block);
        self.counters.allocations += 1;
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.record_alloc(ptr.as_ptr() as usize, block.requested, location);
        }
        ptr
    }
}
