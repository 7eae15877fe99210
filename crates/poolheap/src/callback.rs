//! Allocation failure notification
//!
//! A pool owns at most one failure callback. It is invoked synchronously,
//! before the failing call returns its error, and cannot influence the
//! outcome: there is no retry protocol.

use core::fmt;

/// Operation that failed to obtain memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocOp {
    /// `allocate`
    Allocate,
    /// `allocate_zeroed`
    AllocateZeroed,
    /// `reallocate`
    Reallocate,
    /// `duplicate_string` / `duplicate_cstr`
    DuplicateString,
    /// `allocate_chunk`
    AllocateChunk,
}

impl AllocOp {
    /// Stable lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allocate => "allocate",
            Self::AllocateZeroed => "allocate_zeroed",
            Self::Reallocate => "reallocate",
            Self::DuplicateString => "duplicate_string",
            Self::AllocateChunk => "allocate_chunk",
        }
    }
}

impl fmt::Display for AllocOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context handed to the failure callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocFailure {
    /// Which operation failed
    pub op: AllocOp,
    /// Bytes requested by the caller (saturated on overflow)
    pub requested: usize,
    /// Free bytes in the pool at the time of failure
    pub free_bytes: usize,
}

impl fmt::Display for AllocFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} bytes failed ({} bytes free)",
            self.op, self.requested, self.free_bytes
        )
    }
}

/// Boxed failure callback owned by a pool
pub type FailureCallback = Box<dyn FnMut(&AllocFailure) + Send>;

/// Single-slot holder for the failure callback; last registration wins
#[derive(Default)]
pub(crate) struct FailureHook {
    callback: Option<FailureCallback>,
    fired: usize,
}

impl FailureHook {
    pub(crate) fn set(&mut self, callback: FailureCallback) -> Option<FailureCallback> {
        self.callback.replace(callback)
    }

    pub(crate) fn take(&mut self) -> Option<FailureCallback> {
        self.callback.take()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.callback.is_some()
    }

    /// Times a failure was reported, whether or not a callback was registered
    pub(crate) fn fired(&self) -> usize {
        self.fired
    }

    pub(crate) fn notify(&mut self, failure: &AllocFailure) {
        self.fired += 1;
        if let Some(callback) = self.callback.as_mut() {
            callback(failure);
        }
    }
}

impl fmt::Debug for FailureHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureHook")
            .field("registered", &self.is_set())
            .field("fired", &self.fired)
            .finish()
    }
}
