//! Constants shared by the region layout and the handles.

use std::time::Duration;

/// Signature written at the start of every formatted region
pub const RING_MAGIC: &[u8; 32] = b"daqring shared byte ring\0\0\0\0\0\0\0\0";

/// Layout version; bumped whenever the region format changes
pub const LAYOUT_VERSION: u32 = 1;

/// Cache line size for cursor record alignment
pub const CACHE_LINE_SIZE: usize = 64;

/// Default ring data size (4 MiB)
pub const DEFAULT_RING_SIZE: usize = 4 * 1024 * 1024;

/// Default number of consumer slots
pub const DEFAULT_MAX_CONSUMERS: usize = 100;

/// Default sleep between predicate evaluations in a blocking call
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Timeout that never expires
pub const WAIT_FOREVER: Duration = Duration::MAX;

/// Longest shared memory object name, including the leading slash
pub const MAX_NAME_LEN: usize = 255;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_line_size_is_power_of_two() {
        assert!(CACHE_LINE_SIZE.is_power_of_two());
    }

    #[test]
    fn test_magic_is_nul_padded() {
        assert_eq!(RING_MAGIC.len(), 32);
        assert_eq!(RING_MAGIC[31], 0);
    }
}
