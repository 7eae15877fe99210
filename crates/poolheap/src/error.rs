//! Standalone error types for poolheap
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::{error, warn};

// ============================================================================
// Main Error Types
// ============================================================================

/// Memory pool errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    // --- Capacity Errors ---
    #[error("Memory allocation failed: {size} bytes with {align} byte alignment")]
    AllocationFailed { size: usize, align: usize },

    #[error("Size overflow during operation: {operation}")]
    SizeOverflow { operation: String },

    // --- Request Errors ---
    #[error("Invalid memory layout: {reason}")]
    InvalidLayout { reason: String },

    #[error("Invalid alignment: {alignment}")]
    InvalidAlignment { alignment: usize },

    #[error("Chunk growth refused: requested {requested} bytes (max: {max_size})")]
    ChunkLimitExceeded { requested: usize, max_size: usize },

    // --- Ownership Errors ---
    #[error("Pointer {address:#x} is not a live allocation of this pool")]
    UnknownPointer { address: usize },

    #[error("Address {address:#x} is not a live chunk of this pool")]
    UnknownChunk { address: usize },

    // --- Lifecycle Errors ---
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("Memory pool is already initialized")]
    AlreadyInitialized,

    #[error("Memory pool is not initialized")]
    NotInitialized,

    #[error("Initialization failed: {reason}")]
    InitializationFailed { reason: String },

    // --- Configuration Errors ---
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // --- Feature Support Errors ---
    #[error("Feature not supported: {feature}")]
    NotSupported { feature: &'static str },
}

impl MemoryError {
    /// Check if error is retryable
    ///
    /// Capacity failures may succeed once other blocks are released.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. })
    }

    /// Check if the error reports a contract violation by the caller
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::UnknownPointer { .. }
                | Self::UnknownChunk { .. }
                | Self::InvalidState { .. }
                | Self::AlreadyInitialized
                | Self::NotInitialized
        )
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AllocationFailed { .. } => "MEM:ALLOC:FAILED",
            Self::SizeOverflow { .. } => "MEM:ALLOC:OVERFLOW",
            Self::InvalidLayout { .. } => "MEM:ALLOC:LAYOUT",
            Self::InvalidAlignment { .. } => "MEM:ALLOC:ALIGN",
            Self::ChunkLimitExceeded { .. } => "MEM:CHUNK:LIMIT",
            Self::UnknownPointer { .. } => "MEM:FREE:UNKNOWN",
            Self::UnknownChunk { .. } => "MEM:CHUNK:UNKNOWN",
            Self::InvalidState { .. } => "MEM:POOL:STATE",
            Self::AlreadyInitialized => "MEM:POOL:REINIT",
            Self::NotInitialized => "MEM:POOL:UNINIT",
            Self::InitializationFailed { .. } => "MEM:POOL:INIT",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
            Self::NotSupported { .. } => "MEM:FEATURE:UNSUPPORTED",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create allocation failed error
    pub fn allocation_failed(size: usize, align: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(size, align, "memory allocation failed");

        Self::AllocationFailed { size, align }
    }

    /// Create size overflow error
    pub fn size_overflow(operation: &str) -> Self {
        Self::SizeOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create invalid layout error
    pub fn invalid_layout(reason: &str) -> Self {
        Self::InvalidLayout {
            reason: reason.to_string(),
        }
    }

    /// Create invalid alignment error
    pub fn invalid_alignment(alignment: usize) -> Self {
        Self::InvalidAlignment { alignment }
    }

    /// Create chunk limit error
    pub fn chunk_limit_exceeded(requested: usize, max_size: usize) -> Self {
        Self::ChunkLimitExceeded {
            requested,
            max_size,
        }
    }

    /// Create unknown pointer error
    pub fn unknown_pointer(address: usize) -> Self {
        #[cfg(feature = "logging")]
        error!("free of unknown pointer {address:#x}");

        Self::UnknownPointer { address }
    }

    /// Create unknown chunk error
    pub fn unknown_chunk(address: usize) -> Self {
        #[cfg(feature = "logging")]
        error!("unknown chunk handle {address:#x}");

        Self::UnknownChunk { address }
    }

    /// Create invalid state error
    pub fn invalid_state(reason: &str) -> Self {
        Self::InvalidState {
            reason: reason.to_string(),
        }
    }

    /// Create initialization failed error
    pub fn initialization_failed(reason: &str) -> Self {
        #[cfg(feature = "logging")]
        error!("Memory pool initialization failed: {reason}");

        Self::InitializationFailed {
            reason: reason.to_string(),
        }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Create not supported error
    pub fn not_supported(feature: &'static str) -> Self {
        Self::NotSupported { feature }
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Generic result type alias
pub type Result<T> = MemoryResult<T>;

// ============================================================================
// Tests
// ============================================================================
