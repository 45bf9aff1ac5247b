//! Per-handle transfer counters.
//!
//! Lightweight counters for observability. Each handle keeps its own; nothing
//! here lives in shared memory.

use std::sync::atomic::{ AtomicU64, Ordering };

use serde::Serialize;

#[derive(Debug, Default)]
pub struct HandleStats {
    pub puts: AtomicU64,
    pub gets: AtomicU64,
    pub bytes_put: AtomicU64,
    pub bytes_got: AtomicU64,
    pub bytes_skipped: AtomicU64,
    pub timeouts: AtomicU64,
}

impl HandleStats {
    pub const fn new() -> Self {
        Self {
            puts: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            bytes_put: AtomicU64::new(0),
            bytes_got: AtomicU64::new(0),
            bytes_skipped: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_put(&self, bytes: u64) {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.bytes_put.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_get(&self, bytes: u64) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.bytes_got.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_skip(&self, bytes: u64) {
        self.bytes_skipped.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            puts: self.puts.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            bytes_put: self.bytes_put.load(Ordering::Relaxed),
            bytes_got: self.bytes_got.load(Ordering::Relaxed),
            bytes_skipped: self.bytes_skipped.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.puts.store(0, Ordering::Relaxed);
        self.gets.store(0, Ordering::Relaxed);
        self.bytes_put.store(0, Ordering::Relaxed);
        self.bytes_got.store(0, Ordering::Relaxed);
        self.bytes_skipped.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub puts: u64,
    pub gets: u64,
    pub bytes_put: u64,
    pub bytes_got: u64,
    pub bytes_skipped: u64,
    pub timeouts: u64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "puts={} gets={} bytes_put={} bytes_got={} skipped={} timeouts={}",
            self.puts,
            self.gets,
            self.bytes_put,
            self.bytes_got,
            self.bytes_skipped,
            self.timeouts
        )
    }
}
