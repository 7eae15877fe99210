//! Utility functions shared by the pool, general allocator and chunk allocator
//!
//! - Memory alignment helpers
//! - Checked size rounding
//! - Size formatting

/// Smallest unit of pool bookkeeping; every extent is a multiple of it.
pub const GRANULE: usize = 16;

/// Aligns a value up to the nearest multiple of alignment
///
/// # Examples
/// ```
/// use poolheap::utils::align_up;
///
/// assert_eq!(align_up(7, 8), 8);
/// assert_eq!(align_up(8, 8), 8);
/// assert_eq!(align_up(9, 8), 16);
/// ```
#[inline(always)]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Aligns a value up, returning `None` on overflow
///
/// # Examples
/// ```
/// use poolheap::utils::checked_align_up;
///
/// assert_eq!(checked_align_up(17, 16), Some(32));
/// assert_eq!(checked_align_up(usize::MAX, 16), None);
/// ```
#[inline(always)]
pub const fn checked_align_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    match value.checked_add(alignment - 1) {
        Some(v) => Some(v & !(alignment - 1)),
        None => None,
    }
}

/// Aligns a value down to the nearest multiple of alignment
///
/// # Examples
/// ```
/// use poolheap::utils::align_down;
///
/// assert_eq!(align_down(7, 8), 0);
/// assert_eq!(align_down(9, 8), 8);
/// ```
#[inline(always)]
pub const fn align_down(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    value & !(alignment - 1)
}

/// Checks if a value is aligned to the given alignment
///
/// # Examples
/// ```
/// use poolheap::utils::is_aligned;
///
/// assert!(is_aligned(32, 16));
/// assert!(!is_aligned(17, 8));
/// ```
#[inline(always)]
pub const fn is_aligned(value: usize, alignment: usize) -> bool {
    debug_assert!(alignment.is_power_of_two());
    value & (alignment - 1) == 0
}

/// Returns `true` for non-zero powers of two
#[inline(always)]
pub const fn is_power_of_two(value: usize) -> bool {
    value != 0 && value & (value - 1) == 0
}

/// Rounds a request up to whole granules, at least one granule.
///
/// Zero-sized requests still occupy a granule so that each returned
/// pointer is distinct.
#[inline]
pub(crate) const fn granules_for(size: usize) -> Option<usize> {
    let size = if size == 0 { 1 } else { size };
    checked_align_up(size, GRANULE)
}

/// Format bytes into human-readable string
///
/// # Examples
/// ```
/// use poolheap::utils::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// assert_eq!(format_bytes(1048576), "1.00 MB");
/// ```
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_helpers() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_down(31, 16), 16);
        assert!(is_aligned(64, 64));
        assert!(!is_aligned(65, 64));
    }

    #[test]
    fn test_is_power_of_two() {
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(4096));
        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(24));
    }

    #[test]
    fn test_granules_for() {
        assert_eq!(granules_for(0), Some(GRANULE));
        assert_eq!(granules_for(1), Some(GRANULE));
        assert_eq!(granules_for(16), Some(16));
        assert_eq!(granules_for(17), Some(32));
        assert_eq!(granules_for(usize::MAX), None);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(4096), "4.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
