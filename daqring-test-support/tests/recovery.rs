//! Recovering rings left behind by clients that went away without closing.

use std::time::Duration;

use daqring::{ ClientMode, ReleasedSlot, RingBuffer, RingError, RingRegion };
use daqring_test_support::TestRing;

/// Pid far above any real pid_max, so it never names a live process.
const DEAD_PID: i64 = i32::MAX as i64;

fn plant_owner(name: &str, slot: Option<usize>, pid: i64) {
    let region = RingRegion::map(name).unwrap();
    let record = match slot {
        Some(slot) => region.consumer(slot),
        None => region.producer(),
    };
    record.try_claim(pid).expect("slot already owned");
}

#[test]
fn test_reap_releases_dead_owners_only() {
    let ring = TestRing::new("reap", 1024, 3);
    let live = RingBuffer::open(&ring.name, ClientMode::Consumer).unwrap();
    plant_owner(&ring.name, Some(1), DEAD_PID);
    plant_owner(&ring.name, None, DEAD_PID);

    assert!(matches!(
        RingBuffer::open(&ring.name, ClientMode::Producer),
        Err(RingError::ProducerExists { pid: DEAD_PID, .. })
    ));

    let manager = RingBuffer::open(&ring.name, ClientMode::Manager).unwrap();
    let released = manager.reap_stale().unwrap();
    assert_eq!(released, vec![
        ReleasedSlot::Producer { pid: DEAD_PID },
        ReleasedSlot::Consumer { slot: 1, pid: DEAD_PID }
    ]);
    assert!(manager.reap_stale().unwrap().is_empty());

    let usage = manager.usage();
    assert_eq!(usage.producer, None);
    assert_eq!(usage.consumers.len(), 1);
    assert_eq!(usage.consumers[0].slot, live.consumer_slot().unwrap());

    let _producer = RingBuffer::open(&ring.name, ClientMode::Producer).unwrap();
}

#[test]
fn test_forced_release_lets_producer_resume() {
    let ring = TestRing::new("resume", 1024, 1);
    let mut consumer = RingBuffer::open(&ring.name, ClientMode::Consumer).unwrap();
    {
        let mut producer = RingBuffer::open(&ring.name, ClientMode::Producer).unwrap();
        producer.put(b"before crash ", Duration::ZERO).unwrap();
        // Simulate a crash: the handle never runs its drop.
        std::mem::forget(producer);
    }

    let manager = RingBuffer::open(&ring.name, ClientMode::Manager).unwrap();
    assert!(manager.is_producer_attached());
    manager.force_producer_release().unwrap();
    assert!(!manager.is_producer_attached());

    let mut producer = RingBuffer::open(&ring.name, ClientMode::Producer).unwrap();
    producer.put(b"after restart", Duration::ZERO).unwrap();

    let mut buf = [0u8; 64];
    let n = consumer.get(&mut buf, 26, Duration::ZERO).unwrap();
    assert_eq!(&buf[..n], b"before crash after restart");
}

#[test]
fn test_forced_consumer_release_unblocks_producer() {
    let ring = TestRing::new("unblock", 1024, 2);
    let mut producer = RingBuffer::open(&ring.name, ClientMode::Producer).unwrap();
    let stalled = RingBuffer::open(&ring.name, ClientMode::Consumer).unwrap();
    let slot = stalled.consumer_slot().unwrap();
    std::mem::forget(stalled);

    let fill = vec![0u8; producer.data_bytes() - 1];
    producer.put(&fill, Duration::ZERO).unwrap();
    assert_eq!(producer.put(b"x", Duration::ZERO).unwrap(), 0);

    let manager = RingBuffer::open(&ring.name, ClientMode::Manager).unwrap();
    assert!(matches!(
        manager.force_consumer_release(99),
        Err(RingError::SlotOutOfRange { slot: 99, max_consumers: 2 })
    ));
    manager.force_consumer_release(slot).unwrap();

    assert_eq!(producer.put(b"x", Duration::ZERO).unwrap(), 1);
}

#[test]
fn test_reformat_discards_everything() {
    let ring = TestRing::new("reformat", 1024, 2);
    {
        let mut producer = RingBuffer::open(&ring.name, ClientMode::Producer).unwrap();
        producer.put(b"stale", Duration::ZERO).unwrap();
        std::mem::forget(producer);
    }
    plant_owner(&ring.name, Some(0), DEAD_PID);

    RingRegion::format(&ring.name, 4).unwrap();

    let manager = RingBuffer::open(&ring.name, ClientMode::Manager).unwrap();
    let usage = manager.usage();
    assert_eq!(usage.max_consumers, 4);
    assert_eq!(usage.producer, None);
    assert!(usage.consumers.is_empty());
    assert_eq!(usage.put_space, usage.buffer_space - 1);
}
