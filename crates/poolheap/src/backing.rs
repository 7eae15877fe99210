//! Backing store providers
//!
//! A pool never manufactures memory itself: it asks a [`BackingStore`] for one
//! contiguous region at initialization and hands it back at finalization.
//! Regions supplied directly by the caller bypass the provider and are never
//! released by the pool.
//!
//! # Safety
//!
//! - `acquire` must return a region valid for reads and writes of `size`
//!   bytes, aligned to at least [`REGION_ALIGN`], and not aliased elsewhere
//! - `release` is called at most once per acquired region, with the same size

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::{MemoryError, MemoryResult};

/// Minimum alignment of every region handed to a pool
pub const REGION_ALIGN: usize = 64;

/// Supplier of the raw bytes backing a pool
///
/// # Safety
///
/// Implementors must uphold the region contract described in the module
/// documentation; the pool writes to every byte it is given.
pub unsafe trait BackingStore: Send {
    /// Short provider name used in diagnostics
    fn name(&self) -> &'static str;

    /// Obtain a region of exactly `size` bytes
    fn acquire(&mut self, size: usize) -> MemoryResult<NonNull<u8>>;

    /// Return a region obtained from [`BackingStore::acquire`]
    ///
    /// # Safety
    ///
    /// `base` and `size` must come from a single successful `acquire` call on
    /// this provider, and the region must not be used afterwards.
    unsafe fn release(&mut self, base: NonNull<u8>, size: usize);
}

/// Provider backed by the process global allocator
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemStore;

impl SystemStore {
    /// Create a new system store
    pub const fn new() -> Self {
        Self
    }

    fn layout(size: usize) -> MemoryResult<Layout> {
        Layout::from_size_align(size, REGION_ALIGN)
            .map_err(|_| MemoryError::invalid_layout("pool region layout"))
    }
}

// SAFETY: regions come from `alloc_zeroed` with REGION_ALIGN and are freed
// with the identical layout.
unsafe impl BackingStore for SystemStore {
    fn name(&self) -> &'static str {
        "system"
    }

    fn acquire(&mut self, size: usize) -> MemoryResult<NonNull<u8>> {
        if size == 0 {
            return Err(MemoryError::invalid_layout("empty pool region"));
        }
        let layout = Self::layout(size)?;
        // SAFETY: layout has non-zero size (checked above).
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or_else(|| MemoryError::allocation_failed(size, REGION_ALIGN))
    }

    unsafe fn release(&mut self, base: NonNull<u8>, size: usize) {
        // Layout was valid when the region was acquired.
        if let Ok(layout) = Self::layout(size) {
            // SAFETY: caller guarantees `base` came from `acquire(size)`.
            unsafe { std::alloc::dealloc(base.as_ptr(), layout) };
        }
    }
}

/// Provider backed by anonymous private memory mappings
#[cfg(all(unix, feature = "mmap"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapStore;

#[cfg(all(unix, feature = "mmap"))]
impl MmapStore {
    /// Create a new mapping store
    pub const fn new() -> Self {
        Self
    }
}

// SAFETY: mmap returns page-aligned (>= REGION_ALIGN) zero-filled memory that
// stays mapped until the matching munmap in `release`.
#[cfg(all(unix, feature = "mmap"))]
unsafe impl BackingStore for MmapStore {
    fn name(&self) -> &'static str {
        "mmap"
    }

    fn acquire(&mut self, size: usize) -> MemoryResult<NonNull<u8>> {
        use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, mmap};

        if size == 0 {
            return Err(MemoryError::invalid_layout("empty pool region"));
        }

        // SAFETY: FFI call to libc mmap with a null hint, anonymous private
        // mapping, no file descriptor.
        let addr = unsafe {
            mmap(
                core::ptr::null_mut(),
                size,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if addr == MAP_FAILED {
            return Err(MemoryError::allocation_failed(size, REGION_ALIGN));
        }
        NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| MemoryError::allocation_failed(size, REGION_ALIGN))
    }

    unsafe fn release(&mut self, base: NonNull<u8>, size: usize) {
        // SAFETY: caller guarantees addr/size are from a single mmap.
        let result = unsafe { libc::munmap(base.as_ptr().cast::<libc::c_void>(), size) };
        debug_assert_eq!(result, 0, "munmap failed");
    }
}

/// Ownership of a pool region
pub(crate) enum RegionOwner {
    /// Released through the provider on finalize
    Provider(Box<dyn BackingStore>),
    /// Supplied by the caller; never released by the pool
    Borrowed,
}

/// A contiguous region of bytes owned or borrowed by a pool
pub(crate) struct Region {
    base: NonNull<u8>,
    len: usize,
    owner: RegionOwner,
}

impl Region {
    pub(crate) fn acquire(mut store: Box<dyn BackingStore>, size: usize) -> MemoryResult<Self> {
        let base = store.acquire(size).map_err(|err| {
            MemoryError::initialization_failed(&format!(
                "{} store could not supply {size} bytes: {err}",
                store.name()
            ))
        })?;
        Ok(Self {
            base,
            len: size,
            owner: RegionOwner::Provider(store),
        })
    }

    pub(crate) fn borrowed(base: NonNull<u8>, len: usize) -> Self {
        Self {
            base,
            len,
            owner: RegionOwner::Borrowed,
        }
    }

    pub(crate) fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_borrowed(&self) -> bool {
        matches!(self.owner, RegionOwner::Borrowed)
    }

    pub(crate) fn provider_name(&self) -> &'static str {
        match &self.owner {
            RegionOwner::Provider(store) => store.name(),
            RegionOwner::Borrowed => "caller",
        }
    }

    /// Offset of `addr` inside the region, if it lies within it
    pub(crate) fn offset_of(&self, addr: usize) -> Option<usize> {
        addr.checked_sub(self.base_addr())
            .filter(|offset| *offset < self.len)
    }

    /// Pointer to `offset` bytes past the region base
    pub(crate) fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset < self.len);
        // SAFETY: offset is inside the region, so the result is in bounds and
        // non-null.
        unsafe { self.base.add(offset) }
    }

    /// Hand the region back to its provider. Later calls are no-ops.
    pub(crate) fn release(&mut self) {
        let owner = core::mem::replace(&mut self.owner, RegionOwner::Borrowed);
        if let RegionOwner::Provider(mut store) = owner {
            // SAFETY: base/len are exactly what `acquire` returned, and the
            // owner was swapped out above so the provider sees one release.
            unsafe { store.release(self.base, self.len) };
        }
    }
}
