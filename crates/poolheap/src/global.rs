//! Process-wide pool
//!
//! One [`MemoryPool`] behind a mutex for runtimes that expect a single
//! allocator per process. Every function locks the pool for the duration of
//! the call. Allocation call sites are captured here and forwarded, so
//! tracked records point at the caller rather than at this module.
//!
//! The failure callback runs with the lock held and must not call back into
//! this module.
//!
//! ```
//! use poolheap::{PoolConfig, global};
//!
//! global::initialize(PoolConfig::production().with_size(4096)).unwrap();
//! let ptr = global::allocate(100).unwrap();
//! global::free(Some(ptr)).unwrap();
//! global::finalize().unwrap();
//! ```

use core::ptr::NonNull;

use parking_lot::Mutex;

use crate::backing::BackingStore;
use crate::callback::{AllocFailure, FailureCallback};
use crate::chunk::ChunkHandle;
use crate::config::PoolConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::pool::{MemoryPool, PoolState};
use crate::stats::PoolStats;
use crate::tracker::SourceLocation;

enum GlobalState {
    Uninitialized,
    Active(MemoryPool),
    Finalized,
}

static GLOBAL: Mutex<GlobalState> = parking_lot::const_mutex(GlobalState::Uninitialized);

/// Create the process-wide pool
///
/// Fails with [`MemoryError::AlreadyInitialized`] while a pool is active. A
/// finalized pool may be replaced by a new one.
pub fn initialize(config: PoolConfig) -> MemoryResult<()> {
    install(|| MemoryPool::initialize(config))
}

/// Create the process-wide pool over a custom backing store
pub fn initialize_with<S>(config: PoolConfig, store: S) -> MemoryResult<()>
where
    S: BackingStore + 'static,
{
    install(|| MemoryPool::initialize_with(config, store))
}

fn install(create: impl FnOnce() -> MemoryResult<MemoryPool>) -> MemoryResult<()> {
    let mut state = GLOBAL.lock();
    if matches!(*state, GlobalState::Active(_)) {
        return Err(MemoryError::AlreadyInitialized);
    }
    *state = GlobalState::Active(create()?);
    Ok(())
}

/// Finalize the process-wide pool
pub fn finalize() -> MemoryResult<()> {
    let mut state = GLOBAL.lock();
    match &mut *state {
        GlobalState::Active(pool) => pool.finalize()?,
        GlobalState::Uninitialized => return Err(MemoryError::NotInitialized),
        GlobalState::Finalized => {
            return Err(MemoryError::invalid_state("pool already finalized"));
        }
    }
    *state = GlobalState::Finalized;
    Ok(())
}

/// Current lifecycle state
pub fn state() -> PoolState {
    match &*GLOBAL.lock() {
        GlobalState::Uninitialized => PoolState::Uninitialized,
        GlobalState::Active(pool) => pool.state(),
        GlobalState::Finalized => PoolState::Finalized,
    }
}

/// Run `f` against the active pool
pub fn with_pool<R>(f: impl FnOnce(&mut MemoryPool) -> MemoryResult<R>) -> MemoryResult<R> {
    match &mut *GLOBAL.lock() {
        GlobalState::Active(pool) => f(pool),
        GlobalState::Uninitialized => Err(MemoryError::NotInitialized),
        GlobalState::Finalized => Err(MemoryError::invalid_state("pool finalized")),
    }
}

#[track_caller]
pub fn allocate(size: usize) -> MemoryResult<NonNull<u8>> {
    let location = SourceLocation::caller();
    with_pool(|pool| pool.allocate_at(size, Some(location)))
}

#[track_caller]
pub fn allocate_zeroed(count: usize, elem_size: usize) -> MemoryResult<NonNull<u8>> {
    let location = SourceLocation::caller();
    with_pool(|pool| pool.allocate_zeroed_at(count, elem_size, Some(location)))
}

#[track_caller]
pub fn reallocate(ptr: Option<NonNull<u8>>, new_size: usize) -> MemoryResult<NonNull<u8>> {
    let location = SourceLocation::caller();
    with_pool(|pool| pool.reallocate_at(ptr, new_size, Some(location)))
}

#[track_caller]
pub fn duplicate_string(text: &str) -> MemoryResult<NonNull<u8>> {
    let location = SourceLocation::caller();
    with_pool(|pool| pool.duplicate_string_at(text, Some(location)))
}

/// `free(None)` succeeds in every state
pub fn free(ptr: Option<NonNull<u8>>) -> MemoryResult<()> {
    if ptr.is_none() {
        return Ok(());
    }
    with_pool(|pool| pool.free(ptr))
}

/// Total capacity; `None` unless a pool is active
pub fn total_heap() -> Option<usize> {
    with_pool(|pool| Ok(pool.total_heap())).ok().flatten()
}

/// Free bytes; `None` unless a pool is active
pub fn free_heap() -> Option<usize> {
    with_pool(|pool| Ok(pool.free_heap())).ok().flatten()
}

pub fn dump(leaks_only: bool) -> MemoryResult<usize> {
    with_pool(|pool| pool.dump(leaks_only))
}

pub fn stats() -> MemoryResult<PoolStats> {
    with_pool(|pool| Ok(pool.stats()))
}

/// Register the failure callback, returning the previous one
pub fn set_failure_callback<F>(callback: F) -> MemoryResult<Option<FailureCallback>>
where
    F: FnMut(&AllocFailure) + Send + 'static,
{
    with_pool(|pool| Ok(pool.set_failure_callback(callback)))
}

pub fn allocate_chunk(
    initial_size: usize,
    max_size: usize,
    alignment: usize,
) -> MemoryResult<ChunkHandle> {
    with_pool(|pool| pool.allocate_chunk(initial_size, max_size, alignment))
}

pub fn adjust_chunk(handle: ChunkHandle, new_size: usize) -> MemoryResult<usize> {
    with_pool(|pool| pool.adjust_chunk(handle, new_size))
}

pub fn free_chunk(handle: ChunkHandle) -> MemoryResult<()> {
    with_pool(|pool| pool.free_chunk(handle))
}
