//! # daqring-test-support
//!
//! Testing infrastructure for daqring.
//!
//! ## Components
//!
//! - **TestRing** - Uniquely named ring removed again on drop
//! - **RecordWriter / RecordReader** - Self-checking framed records
//! - **run_fanout** - One producer, many consumers, integrity counted

pub mod stress;
pub mod verify;

pub use stress::{ run_fanout, StressConfig, StressCounters, StressMetrics };
pub use verify::{ pattern, RecordReader, RecordWriter, VerifyError, RECORD_HEADER };

use std::sync::atomic::{ AtomicUsize, Ordering };

use daqring::RingRegion;

static SEQ: AtomicUsize = AtomicUsize::new(0);

/// Ring name unique to this process and call
pub fn unique_name(tag: &str) -> String {
    format!("/daqring-{}-{}-{}", tag, std::process::id(), SEQ.fetch_add(1, Ordering::Relaxed))
}

/// A freshly created ring that is removed when dropped.
pub struct TestRing {
    pub name: String,
}

impl TestRing {
    pub fn new(tag: &str, data_bytes: usize, max_consumers: usize) -> Self {
        let name = unique_name(tag);
        let _ = RingRegion::remove(&name);
        RingRegion::create(&name, data_bytes, max_consumers).expect("create test ring");
        Self { name }
    }
}

impl Drop for TestRing {
    fn drop(&mut self) {
        let _ = RingRegion::remove(&self.name);
    }
}
