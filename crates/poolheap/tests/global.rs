//! Process-wide facade tests
//!
//! The facade is one static pool, so the whole lifecycle runs in a single
//! test to keep the harness's threads from racing on it.

use poolheap::{MemoryError, PoolConfig, PoolState, global};

#[test]
fn test_global_lifecycle() {
    // Before initialization
    assert_eq!(global::state(), PoolState::Uninitialized);
    assert_eq!(global::allocate(8), Err(MemoryError::NotInitialized));
    assert_eq!(global::total_heap(), None);
    assert_eq!(global::free(None), Ok(()));
    assert_eq!(global::finalize(), Err(MemoryError::NotInitialized));

    // Initialized
    global::initialize(PoolConfig::debug().with_size(4096)).expect("initialize");
    assert_eq!(global::state(), PoolState::Initialized);
    assert_eq!(
        global::initialize(PoolConfig::default()),
        Err(MemoryError::AlreadyInitialized)
    );
    assert_eq!(global::total_heap(), Some(4096));

    let line = line!() + 1;
    let p1 = global::allocate(100).expect("allocate");
    let p2 = global::allocate(0).expect("allocate 0");
    assert_ne!(p1, p2);

    let report = global::with_pool(|pool| pool.dump_report(true)).expect("report");
    let location = report.entries[0].location.expect("location");
    assert!(location.file.ends_with("global.rs"));
    assert_eq!(location.line, line);

    let chunk = global::allocate_chunk(8, 64, 16).expect("chunk");
    assert_eq!(global::adjust_chunk(chunk, 32), Ok(8));
    global::free_chunk(chunk).expect("free chunk");

    global::free(Some(p1)).expect("free p1");
    global::free(None).expect("free none");
    assert_eq!(global::dump(true), Ok(1));
    global::free(Some(p2)).expect("free p2");
    assert_eq!(global::free_heap(), Some(4096));

    // Finalized
    global::finalize().expect("finalize");
    assert_eq!(global::state(), PoolState::Finalized);
    assert!(matches!(
        global::allocate(8),
        Err(MemoryError::InvalidState { .. })
    ));
    assert!(matches!(
        global::finalize(),
        Err(MemoryError::InvalidState { .. })
    ));
    assert_eq!(global::free_heap(), None);

    // Re-initialization after finalize is allowed
    global::initialize(PoolConfig::production().with_size(1024)).expect("re-initialize");
    assert_eq!(global::total_heap(), Some(1024));
    global::finalize().expect("finalize again");
}
