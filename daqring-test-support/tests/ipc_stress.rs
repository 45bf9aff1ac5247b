//! Threaded fan-out stress. Every record carries its sequence number and a
//! derived payload so loss, duplication and corruption are all detected.

use std::collections::HashSet;
use std::sync::{ Arc, Barrier };
use std::thread;
use std::time::Duration;

use daqring::{ ClientMode, RingBuffer, RingError };
use daqring_test_support::{ run_fanout, StressConfig, TestRing };

#[test]
fn test_single_consumer_integrity() {
    let config = StressConfig::new(20_000).with_consumers(1).with_payload(0, 256);
    let metrics = run_fanout(&config);
    assert!(metrics.is_clean(1), "{:?}", metrics);
}

#[test]
fn test_fanout_integrity() {
    let config = StressConfig::new(10_000).with_consumers(4).with_payload(1, 1024);
    let metrics = run_fanout(&config);
    assert!(metrics.is_clean(4), "{:?}", metrics);
    assert_eq!(metrics.bytes_received, metrics.bytes_sent * 4);
}

/// Records close to the ring size force nearly every write across the top.
#[test]
fn test_wraparound_heavy() {
    let config = StressConfig::new(2_000)
        .with_consumers(2)
        .with_ring_bytes(4096)
        .with_payload(1000, 3000)
        .with_deadline(Duration::from_secs(60));
    let metrics = run_fanout(&config);
    assert!(metrics.is_clean(2), "{:?}", metrics);
}

#[test]
#[ignore] // long running; use --ignored
fn test_fanout_soak() {
    let config = StressConfig::new(1_000_000)
        .with_consumers(8)
        .with_ring_bytes(1 << 20)
        .with_payload(0, 8192)
        .with_deadline(Duration::from_secs(600));
    let metrics = run_fanout(&config);
    eprintln!(
        "soak: {} records, {:.1} MB/s over {:?}",
        metrics.records_sent,
        metrics.throughput_mbps(),
        metrics.duration
    );
    assert!(metrics.is_clean(8), "{:?}", metrics);
}

/// Threads racing for fewer slots than there are threads: every winner must
/// hold a distinct slot and the losers must see slot exhaustion.
#[test]
fn test_racing_consumer_claims_get_distinct_slots() {
    const THREADS: usize = 8;
    const SLOTS: usize = 4;

    for _round in 0..50 {
        let ring = TestRing::new("race", 4096, SLOTS);
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let name = ring.name.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    RingBuffer::open(&name, ClientMode::Consumer)
                })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            match handle.join().unwrap() {
                Ok(consumer) => winners.push(consumer),
                Err(err) => assert!(matches!(err, RingError::NoFreeConsumerSlot { .. }), "{}", err),
            }
        }

        assert_eq!(winners.len(), SLOTS);
        let slots: HashSet<usize> = winners.iter().filter_map(|c| c.consumer_slot()).collect();
        assert_eq!(slots.len(), SLOTS);
        assert!(winners.iter().all(|c| c.owns_slot()));

        let manager = RingBuffer::open(&ring.name, ClientMode::Manager).unwrap();
        assert_eq!(manager.usage().consumers.len(), SLOTS);
    }
}
