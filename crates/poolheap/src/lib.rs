//! # poolheap
//!
//! Bounded memory pool for resource-constrained runtimes.
//!
//! A [`MemoryPool`] takes one contiguous region from a backing store and
//! serves everything from it:
//! - General allocations: allocate, zeroed, reallocate, string duplicate, free
//! - Heap introspection: total and free capacity, statistics
//! - Leak diagnostics when tracking is enabled
//! - Chunks: large resizable buffers whose base never moves
//!
//! ## Quick Start
//!
//! ```rust
//! use poolheap::prelude::*;
//!
//! let mut pool = MemoryPool::initialize(PoolConfig::debug().with_size(64 * 1024))?;
//!
//! let name = pool.duplicate_string("workflow")?;
//! assert_eq!(pool.as_slice(name)?, b"workflow\0");
//!
//! let chunk = pool.allocate_chunk(0, 4096, 64)?;
//! assert_eq!(pool.adjust_chunk(chunk, 1024)?, 0);
//!
//! assert_eq!(pool.dump(true)?, 1);
//! pool.free(Some(name))?;
//! pool.free_chunk(chunk)?;
//! pool.finalize()?;
//! # Ok::<(), poolheap::MemoryError>(())
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured events through `tracing`
//! - `mmap`: [`MmapStore`](backing::MmapStore) backing regions with anonymous
//!   mappings (unix)
//!
//! ## Architecture
//!
//! - The pool is an explicit context object with no internal locking; share
//!   it through [`global`] or your own mutex
//! - Free space is tracked out of band, so block contents never hold
//!   allocator metadata
//! - General blocks and chunks carve from the same free list but keep
//!   disjoint registries

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unsafe_code)]
#![warn(rust_2018_idioms)]
// Explicit lifetimes are clearer in unsafe code even when elidable
#![allow(clippy::elidable_lifetime_names)]
// Struct bool fields are configuration
#![allow(clippy::struct_excessive_bools)]
// #[must_use] on fns returning Self/Result documents intent
#![allow(clippy::double_must_use)]
// Internal methods return Result for API consistency even when infallible today
#![allow(clippy::unnecessary_wraps)]

// Error types
pub mod error;

// Core modules
pub mod backing;
pub mod callback;
pub mod chunk;
pub mod config;
mod extent;
pub mod general;
pub mod global;
pub mod pool;
pub mod stats;
pub mod tracker;
pub mod utils;

// Re-export core types for convenience
pub use crate::backing::{BackingStore, REGION_ALIGN, SystemStore};
pub use crate::callback::{AllocFailure, AllocOp, FailureCallback};
pub use crate::chunk::{ChunkHandle, ChunkInfo};
pub use crate::config::PoolConfig;
pub use crate::error::{MemoryError, MemoryResult, Result};
pub use crate::pool::{MemoryPool, PoolState};
pub use crate::stats::PoolStats;
pub use crate::tracker::{AllocationRecord, AllocationTracker, HeapDump, SourceLocation};

#[cfg(all(unix, feature = "mmap"))]
pub use crate::backing::MmapStore;

// Public API exports
pub mod prelude {
    //! Convenient re-exports of commonly used types.

    pub use crate::config::PoolConfig;
    pub use crate::error::{MemoryError, MemoryResult, Result};

    pub use crate::backing::{BackingStore, SystemStore};
    pub use crate::callback::{AllocFailure, AllocOp};
    pub use crate::chunk::{ChunkHandle, ChunkInfo};
    pub use crate::pool::{MemoryPool, PoolState};
    pub use crate::stats::PoolStats;
    pub use crate::tracker::{HeapDump, SourceLocation};

    pub use crate::utils::{GRANULE, align_up, format_bytes};
}

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
