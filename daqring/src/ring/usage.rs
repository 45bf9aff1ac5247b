use std::sync::atomic::Ordering;

use serde::Serialize;

use super::RingBuffer;

/// One attached consumer in a [`Usage`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsumerUsage {
    pub slot: usize,
    pub pid: i64,
    /// Bytes this consumer has yet to read
    pub available: usize,
}

/// Point-in-time usage of a ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Usage {
    /// Size of the circular data area
    pub buffer_space: usize,
    /// Bytes the producer could put right now
    pub put_space: usize,
    pub max_consumers: usize,
    /// Producer pid, if one is attached
    pub producer: Option<i64>,
    /// Largest backlog over attached consumers (0 with none attached)
    pub max_get_space: usize,
    /// Smallest backlog over attached consumers (0 with none attached)
    pub min_get_space: usize,
    pub consumers: Vec<ConsumerUsage>,
}

impl RingBuffer {
    /// Snapshot ring usage. Never blocks and never changes the ring.
    pub fn usage(&self) -> Usage {
        let region = &self.region;
        let geometry = region.geometry();
        let buffer_space = geometry.data_bytes();
        let producer_offset = region.producer().offset.load(Ordering::Acquire) as usize;
        let producer = region.producer().owner_pid();

        let consumers: Vec<ConsumerUsage> = self
            .attached_consumers()
            .map(|(slot, pid, offset)| ConsumerUsage {
                slot,
                pid,
                available: geometry.distance(producer_offset, offset),
            })
            .collect();

        let put_space = geometry.free_space(consumers.iter().map(|c| c.available));
        let max_get_space = consumers.iter().map(|c| c.available).max().unwrap_or(0);
        let min_get_space = consumers.iter().map(|c| c.available).min().unwrap_or(0);

        Usage {
            buffer_space,
            put_space,
            max_consumers: region.max_consumers(),
            producer,
            max_get_space,
            min_get_space,
            consumers,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{ ClientMode, RingBuffer, RingRegion };

    #[test]
    fn test_usage_snapshot() {
        let name = format!("/daqring-usage-{}", std::process::id());
        let _ = RingRegion::remove(&name);
        RingRegion::create(&name, 1024, 3).unwrap();

        let manager = RingBuffer::open(&name, ClientMode::Manager).unwrap();
        let idle = manager.usage();
        assert_eq!(idle.producer, None);
        assert_eq!(idle.max_consumers, 3);
        assert_eq!(idle.put_space, idle.buffer_space - 1);
        assert_eq!((idle.min_get_space, idle.max_get_space), (0, 0));
        assert!(idle.consumers.is_empty());

        let mut producer = RingBuffer::open(&name, ClientMode::Producer).unwrap();
        let early = RingBuffer::open(&name, ClientMode::Consumer).unwrap();
        producer.put(&[0u8; 30], Duration::ZERO).unwrap();
        let late = RingBuffer::open(&name, ClientMode::Consumer).unwrap();
        producer.put(&[0u8; 20], Duration::ZERO).unwrap();

        let usage = manager.usage();
        assert_eq!(usage.producer, Some(crate::region::shm::current_pid()));
        assert_eq!(usage.consumers.len(), 2);
        assert_eq!(usage.consumers[0].slot, early.consumer_slot().unwrap());
        assert_eq!(usage.consumers[0].available, 50);
        assert_eq!(usage.consumers[1].slot, late.consumer_slot().unwrap());
        assert_eq!(usage.consumers[1].available, 20);
        assert_eq!(usage.max_get_space, 50);
        assert_eq!(usage.min_get_space, 20);
        assert_eq!(usage.put_space, usage.buffer_space - 51);
        assert_eq!(usage.put_space, manager.available_put_space());

        drop((producer, early, late, manager));
        RingRegion::remove(&name).unwrap();
    }
}
