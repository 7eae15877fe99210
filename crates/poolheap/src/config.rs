//! Memory pool configuration

use core::fmt;

use crate::error::{MemoryError, MemoryResult};
use crate::utils::{GRANULE, format_bytes};

#[cfg(feature = "logging")]
use tracing::debug;

/// Pool size used when the configured size is zero (1 MiB)
pub const DEFAULT_POOL_SIZE: usize = 1024 * 1024;

/// Freed allocation records kept for full dumps by default
pub const DEFAULT_RETAINED_FREED_RECORDS: usize = 256;

/// Configuration for a memory pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Pool capacity in bytes; `0` selects [`DEFAULT_POOL_SIZE`]
    pub size: usize,

    /// Record call-site metadata for every general allocation
    pub track_allocations: bool,

    /// Fill pattern byte for newly allocated memory (for debugging)
    pub alloc_pattern: Option<u8>,
    /// Fill pattern byte for released memory (for debugging)
    pub dealloc_pattern: Option<u8>,

    /// Freed records retained for `dump(false)`
    pub retained_freed_records: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 0,
            track_allocations: cfg!(debug_assertions),
            alloc_pattern: if cfg!(debug_assertions) {
                Some(0xBB)
            } else {
                None
            },
            dealloc_pattern: if cfg!(debug_assertions) {
                Some(0xDD)
            } else {
                None
            },
            retained_freed_records: DEFAULT_RETAINED_FREED_RECORDS,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Production configuration - no tracking, no fill patterns
    #[must_use]
    pub fn production() -> Self {
        Self {
            size: 0,
            track_allocations: false,
            alloc_pattern: None,
            dealloc_pattern: None,
            retained_freed_records: 0,
        }
    }

    /// Debug configuration - tracking and fill patterns enabled
    #[must_use]
    pub fn debug() -> Self {
        Self {
            size: 0,
            track_allocations: true,
            alloc_pattern: Some(0xBB),
            dealloc_pattern: Some(0xDD),
            retained_freed_records: 4 * DEFAULT_RETAINED_FREED_RECORDS,
        }
    }

    /// Performance configuration - minimal overhead
    #[must_use]
    pub fn performance() -> Self {
        Self::production()
    }

    /// Set the pool capacity
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Enable or disable allocation tracking
    pub fn with_tracking(mut self, enabled: bool) -> Self {
        self.track_allocations = enabled;
        self
    }

    /// Set both debug fill patterns
    pub fn with_patterns(mut self, alloc: Option<u8>, dealloc: Option<u8>) -> Self {
        self.alloc_pattern = alloc;
        self.dealloc_pattern = dealloc;
        self
    }

    /// Set how many freed records are kept for full dumps
    pub fn with_retained_freed_records(mut self, count: usize) -> Self {
        self.retained_freed_records = count;
        self
    }

    /// Capacity actually requested from the backing store
    pub fn effective_size(&self) -> usize {
        if self.size == 0 {
            DEFAULT_POOL_SIZE
        } else {
            self.size
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> MemoryResult<()> {
        let size = self.effective_size();
        if size < GRANULE {
            return Err(MemoryError::invalid_config(&format!(
                "pool size {size} is smaller than one {GRANULE}-byte granule"
            )));
        }
        if size > isize::MAX as usize {
            return Err(MemoryError::invalid_config("pool size exceeds isize::MAX"));
        }

        #[cfg(feature = "logging")]
        debug!(size, tracking = self.track_allocations, "pool configuration validated");

        Ok(())
    }

    /// Load configuration from environment variables
    ///
    /// Reads `POOLHEAP_SIZE`, `POOLHEAP_TRACK_ALLOCATIONS` and
    /// `POOLHEAP_RETAINED_FREED_RECORDS` on top of [`PoolConfig::default`].
    pub fn from_env() -> MemoryResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> MemoryResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(size) = lookup("POOLHEAP_SIZE") {
            config.size = size
                .trim()
                .parse()
                .map_err(|_| MemoryError::invalid_config("Invalid POOLHEAP_SIZE"))?;
        }

        if let Some(tracking) = lookup("POOLHEAP_TRACK_ALLOCATIONS") {
            config.track_allocations = tracking
                .trim()
                .parse()
                .map_err(|_| MemoryError::invalid_config("Invalid POOLHEAP_TRACK_ALLOCATIONS"))?;
        }

        if let Some(retained) = lookup("POOLHEAP_RETAINED_FREED_RECORDS") {
            config.retained_freed_records = retained.trim().parse().map_err(|_| {
                MemoryError::invalid_config("Invalid POOLHEAP_RETAINED_FREED_RECORDS")
            })?;
        }

        config.validate()?;
        Ok(config)
    }
}

impl fmt::Display for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pool Configuration:")?;
        writeln!(f, "  Size: {}", format_bytes(self.effective_size()))?;
        writeln!(f, "  Tracking: {}", self.track_allocations)?;
        writeln!(f, "  Alloc pattern: {:?}", self.alloc_pattern)?;
        writeln!(f, "  Dealloc pattern: {:?}", self.dealloc_pattern)?;
        write!(f, "  Retained freed records: {}", self.retained_freed_records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_size(), DEFAULT_POOL_SIZE);
    }

    #[test]
    fn test_presets() {
        assert!(!PoolConfig::production().track_allocations);
        assert!(PoolConfig::debug().track_allocations);
        assert_eq!(PoolConfig::debug().alloc_pattern, Some(0xBB));
        assert_eq!(PoolConfig::performance(), PoolConfig::production());
    }

    #[test]
    fn test_invalid_size() {
        let config = PoolConfig::production().with_size(GRANULE - 1);
        assert!(matches!(
            config.validate(),
            Err(MemoryError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("POOLHEAP_SIZE", "8192"),
            ("POOLHEAP_TRACK_ALLOCATIONS", "true"),
            ("POOLHEAP_RETAINED_FREED_RECORDS", " 12 "),
        ]
        .into_iter()
        .collect();

        let config = PoolConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()))
            .expect("valid environment");
        assert_eq!(config.size, 8192);
        assert!(config.track_allocations);
        assert_eq!(config.retained_freed_records, 12);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = PoolConfig::from_lookup(|key| {
            (key == "POOLHEAP_TRACK_ALLOCATIONS").then(|| "maybe".to_string())
        });
        assert!(matches!(result, Err(MemoryError::InvalidConfig { .. })));
    }

    #[test]
    fn test_display() {
        let text = PoolConfig::production().with_size(4096).to_string();
        assert!(text.contains("4.00 KB"));
        assert!(text.contains("Tracking: false"));
    }
}
