//! Chunk allocator integration tests

use poolheap::prelude::*;
use poolheap::MemoryError;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn pool(size: usize) -> MemoryPool {
    MemoryPool::initialize(PoolConfig::production().with_size(size)).expect("pool")
}

/// The adjust sequence returns each previous size and refuses to pass max
#[test]
fn test_adjust_sequence() {
    let mut pool = pool(4096);
    let chunk = pool.allocate_chunk(8, 64, 16).expect("chunk");
    assert_eq!(chunk.addr() % 16, 0);

    assert_eq!(pool.adjust_chunk(chunk, 32), Ok(8));
    assert_eq!(pool.adjust_chunk(chunk, 16), Ok(32));
    assert_eq!(
        pool.adjust_chunk(chunk, 128),
        Err(MemoryError::ChunkLimitExceeded {
            requested: 128,
            max_size: 64
        })
    );
    assert_eq!(pool.adjust_chunk(chunk, 0), Ok(16));
    assert_eq!(pool.adjust_chunk(chunk, 64), Ok(0));
}

/// Freeing a chunk gives back the whole reservation, whatever its size
#[test]
fn test_free_chunk_restores_reservation() {
    let mut pool = pool(8192);
    let before = pool.free_heap().unwrap();

    let chunk = pool.allocate_chunk(0, 3000, 256).expect("chunk");
    let reserved = pool.chunk_info(chunk).unwrap().reserved;
    assert_eq!(reserved, 3008);
    pool.adjust_chunk(chunk, 100).expect("shrink");

    pool.free_chunk(chunk).expect("free chunk");
    assert_eq!(pool.free_heap().unwrap(), before);
    assert_eq!(pool.chunk_count(), 0);
}

/// Growing a chunk never relocates it, even with neighbours all around
#[test]
fn test_base_is_stable() {
    let mut pool = pool(16 * 1024);
    let _before = pool.allocate(64).expect("block before");
    let chunk = pool.allocate_chunk(16, 4096, 64).expect("chunk");
    let _after = pool.allocate(64).expect("block after");

    pool.chunk_slice_mut(chunk).unwrap().fill(0x5A);
    for size in [100, 1000, 4096, 17, 2048] {
        pool.adjust_chunk(chunk, size).expect("adjust");
        assert_eq!(pool.chunk_info(chunk).unwrap().base, chunk.addr());
        assert_eq!(pool.chunk_slice(chunk).unwrap().len(), size);
    }
    assert!(pool.chunk_slice(chunk).unwrap()[..16].iter().all(|&b| b == 0x5A));
}

/// Chunks come out aligned to whatever power of two was asked for
#[test]
fn test_alignment_honoured() {
    let mut pool = pool(64 * 1024);
    for alignment in [1, 2, 8, 16, 32, 128, 512, 4096] {
        let chunk = pool.allocate_chunk(0, 48, alignment).expect("chunk");
        assert_eq!(
            chunk.addr() % alignment.max(GRANULE),
            0,
            "alignment {alignment}"
        );
    }
}

/// Running out of room fires the callback and reports allocation failure
#[test]
fn test_chunk_capacity_failure() {
    let mut pool = pool(1024);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    pool.set_failure_callback(move |failure| {
        assert_eq!(failure.op, AllocOp::AllocateChunk);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let _big = pool.allocate_chunk(0, 1000, 16).expect("first chunk");
    let err = pool.allocate_chunk(0, 1000, 16).expect_err("no room");
    assert!(err.is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Chunk handles and general pointers are not interchangeable
#[test]
fn test_registries_are_disjoint() {
    let mut pool = pool(2048);
    let chunk = pool.allocate_chunk(0, 64, 16).expect("chunk");

    let err = pool.free(Some(chunk.as_non_null())).expect_err("chunk is not a block");
    assert_eq!(err.code(), "MEM:FREE:UNKNOWN");
    assert!(pool.chunk_info(chunk).is_ok());

    pool.free_chunk(chunk).expect("free chunk");
    let err = pool.free_chunk(chunk).expect_err("double free");
    assert_eq!(err.code(), "MEM:CHUNK:UNKNOWN");
}

/// Chunks are invisible to the leak tracker
#[test]
fn test_chunks_are_not_tracked() {
    let mut pool =
        MemoryPool::initialize(PoolConfig::debug().with_size(4096)).expect("tracked pool");
    let _chunk = pool.allocate_chunk(0, 512, 16).expect("chunk");
    assert_eq!(pool.dump(true), Ok(0));
}

/// The dealloc pattern paints the tail cut off by a shrink
#[test]
fn test_shrink_paints_tail() {
    let mut pool = MemoryPool::initialize(
        PoolConfig::production()
            .with_size(1024)
            .with_patterns(None, Some(0xDD)),
    )
    .expect("pool");
    let chunk = pool.allocate_chunk(64, 64, 16).expect("chunk");
    pool.chunk_slice_mut(chunk).unwrap().fill(1);

    pool.adjust_chunk(chunk, 16).expect("shrink");
    pool.adjust_chunk(chunk, 64).expect("grow");
    let data = pool.chunk_slice(chunk).unwrap();
    assert!(data[..16].iter().all(|&b| b == 1));
    assert!(data[16..].iter().all(|&b| b == 0xDD));
}
