//! Fixed-base resizable chunks
//!
//! A chunk reserves its maximum size up front, so its logical size can move
//! anywhere in `0..=max_size` without the base ever changing. This is what a
//! managed heap needs for buffers that hold interior pointers: growth never
//! relocates, and the whole reservation returns to the pool on free.
//!
//! Chunk metadata lives in its own registry. Chunks are never tracked and
//! never visible to the general allocator: passing a chunk base to
//! [`MemoryPool::free`] is an unknown pointer, and a general block passed to
//! a chunk operation is an unknown chunk.

use core::fmt;
use core::ptr::NonNull;

use crate::callback::AllocOp;
use crate::error::{MemoryError, MemoryResult};
use crate::pool::MemoryPool;
use crate::utils::{GRANULE, checked_align_up, is_power_of_two};

#[cfg(feature = "logging")]
use tracing::debug;

/// Handle to a live chunk; its address is the chunk base
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkHandle(NonNull<u8>);

// SAFETY: the handle is an address token; all access to chunk memory goes
// through the owning pool, which enforces its own exclusivity.
unsafe impl Send for ChunkHandle {}
// SAFETY: see above.
unsafe impl Sync for ChunkHandle {}

impl ChunkHandle {
    /// Base pointer of the chunk
    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    pub fn as_non_null(self) -> NonNull<u8> {
        self.0
    }

    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Debug for ChunkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHandle({:#x})", self.addr())
    }
}

/// Public description of a live chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Base address, fixed for the chunk's life
    pub base: usize,
    /// Current logical size
    pub size: usize,
    /// Ceiling for `size`
    pub max_size: usize,
    /// Bytes held from the pool
    pub reserved: usize,
    /// Effective alignment of `base`
    pub alignment: usize,
}

/// Registry entry for one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkEntry {
    pub(crate) offset: usize,
    pub(crate) size: usize,
    pub(crate) max_size: usize,
    pub(crate) reserved: usize,
    pub(crate) alignment: usize,
}

impl MemoryPool {
    /// Reserve a chunk of up to `max_size` bytes with logical size
    /// `initial_size`, based at a multiple of `alignment`
    ///
    /// The reservation is `max_size` rounded up to the granule (one granule
    /// minimum), and the effective alignment is at least the granule.
    pub fn allocate_chunk(
        &mut self,
        initial_size: usize,
        max_size: usize,
        alignment: usize,
    ) -> MemoryResult<ChunkHandle> {
        self.ensure_initialized()?;
        if !is_power_of_two(alignment) {
            return Err(MemoryError::invalid_alignment(alignment));
        }
        if initial_size > max_size {
            return Err(MemoryError::invalid_layout(&format!(
                "initial chunk size {initial_size} exceeds maximum {max_size}"
            )));
        }

        let alignment = alignment.max(GRANULE);
        let Some(reserved) = checked_align_up(max_size.max(1), GRANULE) else {
            self.report_failure(AllocOp::AllocateChunk, max_size);
            return Err(MemoryError::size_overflow("allocate_chunk"));
        };

        let Some(offset) = self.take_extent(reserved, alignment) else {
            self.report_failure(AllocOp::AllocateChunk, max_size);
            return Err(MemoryError::allocation_failed(reserved, alignment));
        };

        self.chunks.insert(
            offset,
            ChunkEntry {
                offset,
                size: initial_size,
                max_size,
                reserved,
                alignment,
            },
        );
        let handle = ChunkHandle(self.region.ptr_at(offset));

        #[cfg(feature = "logging")]
        debug!(
            initial_size,
            max_size,
            reserved,
            alignment,
            "chunk allocated at {:#x}",
            handle.addr()
        );

        Ok(handle)
    }

    /// Change the logical size of a chunk, returning the previous size
    ///
    /// Shrinking always succeeds. Growing past `max_size` is refused with
    /// [`MemoryError::ChunkLimitExceeded`] and leaves the chunk unchanged.
    /// The base never moves.
    pub fn adjust_chunk(&mut self, handle: ChunkHandle, new_size: usize) -> MemoryResult<usize> {
        self.ensure_initialized()?;
        let entry = self.chunk_entry(handle)?;

        if new_size > entry.max_size {
            return Err(MemoryError::chunk_limit_exceeded(new_size, entry.max_size));
        }
        if new_size < entry.size {
            self.fill_dealloc(entry.offset + new_size, entry.size - new_size);
        }
        if let Some(chunk) = self.chunks.get_mut(&entry.offset) {
            chunk.size = new_size;
        }

        #[cfg(feature = "logging")]
        debug!(old = entry.size, new = new_size, "chunk {:#x} adjusted", handle.addr());

        Ok(entry.size)
    }

    /// Return a chunk's whole reservation to the pool
    pub fn free_chunk(&mut self, handle: ChunkHandle) -> MemoryResult<()> {
        self.ensure_initialized()?;
        let entry = self.chunk_entry(handle)?;
        self.chunks.remove(&entry.offset);
        self.release_extent(entry.offset, entry.reserved);

        #[cfg(feature = "logging")]
        debug!(reserved = entry.reserved, "chunk {:#x} freed", handle.addr());

        Ok(())
    }

    pub fn chunk_info(&self, handle: ChunkHandle) -> MemoryResult<ChunkInfo> {
        self.ensure_initialized()?;
        let entry = self.chunk_entry(handle)?;
        Ok(ChunkInfo {
            base: handle.addr(),
            size: entry.size,
            max_size: entry.max_size,
            reserved: entry.reserved,
            alignment: entry.alignment,
        })
    }

    /// View the logical contents of a chunk
    pub fn chunk_slice(&self, handle: ChunkHandle) -> MemoryResult<&[u8]> {
        self.ensure_initialized()?;
        let entry = self.chunk_entry(handle)?;
        // SAFETY: the chunk is live and `size <= reserved`; the shared
        // borrow of the pool keeps it from being freed or shrunk.
        Ok(unsafe { core::slice::from_raw_parts(handle.as_ptr(), entry.size) })
    }

    /// Mutable view of the logical contents of a chunk
    pub fn chunk_slice_mut(&mut self, handle: ChunkHandle) -> MemoryResult<&mut [u8]> {
        self.ensure_initialized()?;
        let entry = self.chunk_entry(handle)?;
        // SAFETY: as for `chunk_slice`, under an exclusive borrow.
        Ok(unsafe { core::slice::from_raw_parts_mut(handle.as_ptr(), entry.size) })
    }

    /// Number of live chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn chunk_entry(&self, handle: ChunkHandle) -> MemoryResult<ChunkEntry> {
        self.offset_of(handle.as_non_null())
            .and_then(|offset| self.chunks.get(&offset).copied())
            .ok_or_else(|| MemoryError::unknown_chunk(handle.addr()))
    }
}
