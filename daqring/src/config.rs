//! Ring configuration and process-wide defaults.

use std::sync::atomic::{ AtomicUsize, Ordering };
use std::time::Duration;

use crate::constants::{ DEFAULT_MAX_CONSUMERS, DEFAULT_POLL_INTERVAL, DEFAULT_RING_SIZE };
use crate::error::{ Result, RingError };
use crate::region::RingRegion;

static DEFAULT_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_RING_SIZE);
static DEFAULT_CONSUMERS: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_CONSUMERS);

/// Data size used by rings created without an explicit size
pub fn default_ring_size() -> usize {
    DEFAULT_SIZE.load(Ordering::Relaxed)
}

/// Set the data size used by rings created without an explicit size.
/// Returns the previous default.
pub fn set_default_ring_size(bytes: usize) -> Result<usize> {
    if bytes < 2 {
        return Err(RingError::config("default ring size must be at least 2 bytes"));
    }
    Ok(DEFAULT_SIZE.swap(bytes, Ordering::Relaxed))
}

/// Consumer slot count used by rings created without an explicit count
pub fn default_max_consumers() -> usize {
    DEFAULT_CONSUMERS.load(Ordering::Relaxed)
}

/// Set the consumer slot count used by rings created without an explicit
/// count. Returns the previous default.
pub fn set_default_max_consumers(n: usize) -> Result<usize> {
    if n == 0 {
        return Err(RingError::config("default consumer count must be greater than 0"));
    }
    Ok(DEFAULT_CONSUMERS.swap(n, Ordering::Relaxed))
}

/// Configuration for creating a ring and polling on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingConfig {
    /// Requested data bytes (rounded up to whole pages on creation)
    pub data_bytes: usize,
    /// Number of consumer slots
    pub max_consumers: usize,
    /// Poll interval for handles opened with `RingConfig::open`
    pub poll_interval: Duration,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            data_bytes: default_ring_size(),
            max_consumers: default_max_consumers(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl RingConfig {
    /// Create a configuration with the given data size
    pub fn new(data_bytes: usize) -> Result<Self> {
        if data_bytes < 2 {
            return Err(RingError::config("ring must hold at least 2 data bytes"));
        }
        Ok(Self {
            data_bytes,
            ..Default::default()
        })
    }

    /// Set the number of consumer slots
    pub fn with_consumers(mut self, max_consumers: usize) -> Result<Self> {
        if max_consumers == 0 {
            return Err(RingError::config("Number of consumers must be greater than 0"));
        }
        self.max_consumers = max_consumers;
        Ok(self)
    }

    /// Set the poll interval for blocking calls
    pub fn with_poll_interval(mut self, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(RingError::config("poll interval must be non-zero"));
        }
        self.poll_interval = interval;
        Ok(self)
    }

    /// Create a ring named `name` with this configuration
    pub fn create(&self, name: &str) -> Result<()> {
        RingRegion::create(name, self.data_bytes, self.max_consumers)
    }

    /// Open a handle on `name` using this configuration's poll interval
    pub fn open(&self, name: &str, mode: crate::ClientMode) -> Result<crate::RingBuffer> {
        let mut ring = crate::RingBuffer::open(name, mode)?;
        ring.set_poll_interval(self.poll_interval);
        Ok(ring)
    }
}
