//! Property tests for pool accounting invariants.
//!
//! After any sequence of general and chunk operations:
//! - free bytes + live block sizes + chunk reservations == capacity
//! - block contents survive reallocation up to `min(old, new)`
//! - chunk bases never move

use std::ptr::NonNull;

use poolheap::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Allocate(usize),
    Free(usize),
    Reallocate(usize, usize),
    Chunk(usize, usize, u32),
    Adjust(usize, usize),
    FreeChunk(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..600).prop_map(Op::Allocate),
        3 => any::<usize>().prop_map(Op::Free),
        3 => (any::<usize>(), 0usize..900).prop_map(|(i, s)| Op::Reallocate(i, s)),
        1 => (0usize..300, 0usize..300, 0u32..9)
            .prop_map(|(a, b, shift)| Op::Chunk(a.min(b), a.max(b), shift)),
        2 => (any::<usize>(), 0usize..400).prop_map(|(i, s)| Op::Adjust(i, s)),
        1 => any::<usize>().prop_map(Op::FreeChunk),
    ]
}

struct Live {
    ptr: NonNull<u8>,
    len: usize,
    tag: u8,
}

fn check_accounting(pool: &MemoryPool, blocks: &[Live], chunks: &[(ChunkHandle, usize)]) {
    let held: usize = blocks
        .iter()
        .map(|block| pool.usable_size(block.ptr).expect("live block"))
        .sum();
    let reserved: usize = chunks
        .iter()
        .map(|(chunk, _)| pool.chunk_info(*chunk).expect("live chunk").reserved)
        .sum();
    assert_eq!(
        pool.free_heap().unwrap() + held + reserved,
        pool.total_heap().unwrap()
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn accounting_holds_for_any_sequence(ops in proptest::collection::vec(op_strategy(), 1..80)) {
        let mut pool = MemoryPool::initialize(PoolConfig::production().with_size(16 * 1024))
            .expect("pool");
        let mut blocks: Vec<Live> = Vec::new();
        let mut chunks: Vec<(ChunkHandle, usize)> = Vec::new();
        let mut next_tag: u8 = 1;

        for op in ops {
            match op {
                Op::Allocate(size) => {
                    if let Ok(ptr) = pool.allocate(size) {
                        pool.as_mut_slice(ptr).unwrap().fill(next_tag);
                        blocks.push(Live { ptr, len: size, tag: next_tag });
                        next_tag = next_tag.wrapping_add(1).max(1);
                    }
                }
                Op::Free(i) if !blocks.is_empty() => {
                    let block = blocks.swap_remove(i % blocks.len());
                    prop_assert!(pool.free(Some(block.ptr)).is_ok());
                }
                Op::Reallocate(i, size) if !blocks.is_empty() => {
                    let idx = i % blocks.len();
                    let (ptr, len, tag) = (blocks[idx].ptr, blocks[idx].len, blocks[idx].tag);
                    match pool.reallocate(Some(ptr), size) {
                        Ok(new_ptr) => {
                            let kept = len.min(size);
                            let data = pool.as_slice(new_ptr).unwrap();
                            prop_assert!(data[..kept].iter().all(|&b| b == tag));
                            pool.as_mut_slice(new_ptr).unwrap().fill(tag);
                            blocks[idx] = Live { ptr: new_ptr, len: size, tag };
                        }
                        Err(_) => {
                            prop_assert!(pool.is_live(ptr));
                            prop_assert_eq!(pool.as_slice(ptr).unwrap().len(), len);
                        }
                    }
                }
                Op::Chunk(initial, max, shift) => {
                    if let Ok(chunk) = pool.allocate_chunk(initial, max, 1 << shift) {
                        prop_assert_eq!(chunk.addr() % (1usize << shift).max(GRANULE), 0);
                        chunks.push((chunk, chunk.addr()));
                    }
                }
                Op::Adjust(i, size) if !chunks.is_empty() => {
                    let (chunk, base) = chunks[i % chunks.len()];
                    let info = pool.chunk_info(chunk).unwrap();
                    let result = pool.adjust_chunk(chunk, size);
                    if size <= info.max_size {
                        prop_assert_eq!(result, Ok(info.size));
                    } else {
                        prop_assert!(result.is_err());
                    }
                    prop_assert_eq!(pool.chunk_info(chunk).unwrap().base, base);
                }
                Op::FreeChunk(i) if !chunks.is_empty() => {
                    let (chunk, _) = chunks.swap_remove(i % chunks.len());
                    prop_assert!(pool.free_chunk(chunk).is_ok());
                }
                _ => {}
            }

            check_accounting(&pool, &blocks, &chunks);
        }

        for block in blocks {
            prop_assert!(block.tag != 0);
            pool.free(Some(block.ptr)).unwrap();
        }
        for (chunk, _) in chunks {
            pool.free_chunk(chunk).unwrap();
        }
        prop_assert_eq!(pool.free_heap(), pool.total_heap());
        prop_assert_eq!(pool.stats().free_extents, 1);
    }

    #[test]
    fn tracked_dump_counts_outstanding(k in 0usize..40, frees in 0usize..40) {
        let mut pool = MemoryPool::initialize(PoolConfig::debug().with_size(8 * 1024))
            .expect("tracked pool");
        let ptrs: Vec<_> = (0..k).map(|i| pool.allocate(i % 50).expect("allocate")).collect();
        let j = frees.min(k);
        for ptr in &ptrs[..j] {
            pool.free(Some(*ptr)).unwrap();
        }
        prop_assert_eq!(pool.dump(true), Ok(k - j));
    }

    #[test]
    fn zero_and_small_sizes_are_distinct(sizes in proptest::collection::vec(0usize..4, 1..30)) {
        let mut pool = MemoryPool::initialize(PoolConfig::production().with_size(4096))
            .expect("pool");
        let mut seen = std::collections::HashSet::new();
        for size in sizes {
            let ptr = pool.allocate(size).expect("allocate");
            prop_assert!(seen.insert(ptr.as_ptr() as usize));
        }
    }
}
