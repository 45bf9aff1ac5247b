//! Manager-only recovery operations.
//!
//! A producer or consumer that dies without dropping its handle leaves its
//! slot owned. These operations let a monitoring tool hand the slot back.

use serde::Serialize;
use tracing::warn;

use super::{ ClientMode, RingBuffer };
use crate::error::{ Result, RingError };
use crate::region::layout::CursorRecord;
use crate::region::shm;

/// A slot released by [`RingBuffer::reap_stale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReleasedSlot {
    Producer {
        pid: i64,
    },
    Consumer {
        slot: usize,
        pid: i64,
    },
}

impl RingBuffer {
    /// Mark the producer slot unowned regardless of who holds it.
    pub fn force_producer_release(&self) -> Result<()> {
        self.require(ClientMode::Manager, "force_producer_release")?;
        let previous = self.region.producer().force_release();
        warn!(ring = %self.region.name(), ?previous, "forced producer release");
        Ok(())
    }

    /// Mark consumer `slot` unowned regardless of who holds it.
    pub fn force_consumer_release(&self, slot: usize) -> Result<()> {
        self.require(ClientMode::Manager, "force_consumer_release")?;
        let max_consumers = self.region.max_consumers();
        if slot >= max_consumers {
            return Err(RingError::SlotOutOfRange { slot, max_consumers });
        }
        let previous = self.region.consumer(slot).force_release();
        warn!(ring = %self.region.name(), slot, ?previous, "forced consumer release");
        Ok(())
    }

    /// Release every slot whose owning process no longer exists.
    pub fn reap_stale(&self) -> Result<Vec<ReleasedSlot>> {
        self.require(ClientMode::Manager, "reap_stale")?;
        let mut released = Vec::new();

        if let Some(pid) = reap(self.region.producer()) {
            warn!(ring = %self.region.name(), pid, "reaped dead producer");
            released.push(ReleasedSlot::Producer { pid });
        }
        for (slot, record) in self.region.consumers() {
            if let Some(pid) = reap(record) {
                warn!(ring = %self.region.name(), slot, pid, "reaped dead consumer");
                released.push(ReleasedSlot::Consumer { slot, pid });
            }
        }
        Ok(released)
    }
}

/// Release `record` if its owner is dead; returns the dead owner's pid.
fn reap(record: &CursorRecord) -> Option<i64> {
    let (pid, token) = record.owner()?;
    if shm::pid_alive(pid) {
        return None;
    }
    // A live process may have re-claimed the slot since we looked.
    record.release(token).then_some(pid)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ReleasedSlot;
    use crate::region::RingRegion;
    use crate::{ ClientMode, RingBuffer, RingError };

    fn ring(tag: &str) -> String {
        let name = format!("/daqring-manage-{}-{}", tag, std::process::id());
        let _ = RingRegion::remove(&name);
        RingRegion::create(&name, 1024, 2).unwrap();
        name
    }

    #[test]
    fn test_force_releases_require_manager() {
        let name = ring("mode");
        let producer = RingBuffer::open(&name, ClientMode::Producer).unwrap();
        let consumer = RingBuffer::open(&name, ClientMode::Consumer).unwrap();

        assert!(producer.force_producer_release().unwrap_err().is_state_error());
        assert!(consumer.force_consumer_release(0).unwrap_err().is_state_error());
        assert!(consumer.reap_stale().unwrap_err().is_state_error());

        drop((producer, consumer));
        RingRegion::remove(&name).unwrap();
    }

    #[test]
    fn test_force_producer_release() {
        let name = ring("producer");
        let stuck = RingBuffer::open(&name, ClientMode::Producer).unwrap();
        let manager = RingBuffer::open(&name, ClientMode::Manager).unwrap();
        assert!(manager.is_producer_attached());

        manager.force_producer_release().unwrap();
        assert!(!manager.is_producer_attached());
        drop(stuck);

        let mut replacement = RingBuffer::open(&name, ClientMode::Producer).unwrap();
        assert_eq!(replacement.put(b"new", Duration::ZERO).unwrap(), 3);
        assert!(manager.is_producer_attached());

        drop((replacement, manager));
        RingRegion::remove(&name).unwrap();
    }

    #[test]
    fn test_force_consumer_release() {
        let name = ring("consumer");
        let a = RingBuffer::open(&name, ClientMode::Consumer).unwrap();
        let _b = RingBuffer::open(&name, ClientMode::Consumer).unwrap();
        let manager = RingBuffer::open(&name, ClientMode::Manager).unwrap();

        assert!(matches!(
            manager.force_consumer_release(2),
            Err(RingError::SlotOutOfRange { slot: 2, max_consumers: 2 })
        ));

        let slot = a.consumer_slot().unwrap();
        manager.force_consumer_release(slot).unwrap();
        let c = RingBuffer::open(&name, ClientMode::Consumer).unwrap();
        assert_eq!(c.consumer_slot(), Some(slot));

        drop((a, _b, c, manager));
        RingRegion::remove(&name).unwrap();
    }

    #[test]
    fn test_reap_stale_owners() {
        let name = ring("reap");
        let region = RingRegion::map(&name).unwrap();
        // No process can have pid i32::MAX on Linux (pid_max <= 2^22).
        let dead = i32::MAX as i64;
        region.producer().try_claim(dead).unwrap();
        region.consumer(1).try_claim(dead).unwrap();

        let live = RingBuffer::open(&name, ClientMode::Consumer).unwrap();
        let manager = RingBuffer::open(&name, ClientMode::Manager).unwrap();

        let released = manager.reap_stale().unwrap();
        assert_eq!(released, vec![
            ReleasedSlot::Producer { pid: dead },
            ReleasedSlot::Consumer { slot: 1, pid: dead }
        ]);
        assert!(!manager.is_producer_attached());
        assert_eq!(manager.usage().consumers.len(), 1);
        assert_eq!(manager.usage().consumers[0].slot, live.consumer_slot().unwrap());
        assert!(manager.reap_stale().unwrap().is_empty());

        drop((live, manager, region));
        RingRegion::remove(&name).unwrap();
    }
}
