//! Ring buffer handles.
//!
//! A [`RingBuffer`] maps a ring region into this process and binds to one
//! [`ClientMode`]:
//!
//! ```text
//!                 ┌──────────── circular data area ────────────┐
//!   Producer ───► │ . . . . █ █ █ █ █ █ █ █ █ █ . . . . . . . . │
//!                 └─────────▲─────────────▲───────────▲────────┘
//!                        consumer 1    consumer 0   producer
//! ```
//!
//! Every consumer tails the same byte stream from its own cursor. The producer
//! may only write up to one byte short of the slowest attached consumer.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use daqring::{ ClientMode, RingBuffer, RingRegion };
//!
//! RingRegion::create("events", 1 << 20, 4)?;
//!
//! let mut producer = RingBuffer::open("events", ClientMode::Producer)?;
//! let mut consumer = RingBuffer::open("events", ClientMode::Consumer)?;
//!
//! producer.put(b"hello", Duration::from_secs(1))?;
//!
//! let mut buf = [0u8; 64];
//! let n = consumer.get(&mut buf, 1, Duration::from_secs(1))?;
//! assert_eq!(&buf[..n], b"hello");
//! # Ok::<(), daqring::RingError>(())
//! ```

mod manage;
mod mode;
mod predicate;
mod usage;

use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::debug;

use crate::constants::DEFAULT_POLL_INTERVAL;
use crate::error::{ Result, RingError };
use crate::insights;
use crate::metrics::{ HandleStats, StatsSnapshot };
use crate::region::layout::{ ClaimToken, CursorRecord };
use crate::region::{ shm, RingRegion };

pub use manage::ReleasedSlot;
pub use mode::ClientMode;
pub use predicate::{ BlockingPredicate, DataAvailablePredicate, PutSpacePredicate };
pub use usage::{ ConsumerUsage, Usage };

/// A process's handle on a named ring.
///
/// Dropping the handle releases its slot and unmaps the region. The region
/// itself persists until [`RingRegion::remove`].
pub struct RingBuffer {
    region: RingRegion,
    mode: ClientMode,
    /// Claimed consumer slot (consumer handles only)
    consumer_slot: Option<usize>,
    /// Ownership word of our slot claim (producer and consumer handles)
    claim: Option<ClaimToken>,
    pid: i64,
    poll_interval: Duration,
    stats: HandleStats,
}

impl RingBuffer {
    /// Map `name` and bind to `mode`, claiming the producer slot or a free
    /// consumer slot as required.
    ///
    /// A producer continues from wherever the producer cursor was left. A
    /// consumer starts at the current producer cursor and sees no backlog.
    pub fn open(name: &str, mode: ClientMode) -> Result<Self> {
        let region = RingRegion::map(name)?;
        let pid = shm::current_pid();

        // On error `region` drops here and the mapping goes with it.
        let (consumer_slot, claim) = match mode {
            ClientMode::Producer => (None, Some(claim_producer(&region, pid)?)),
            ClientMode::Consumer => {
                let (slot, token) = claim_consumer(&region, pid)?;
                (Some(slot), Some(token))
            }
            ClientMode::Manager => (None, None),
        };

        debug!(ring = %region.name(), %mode, ?consumer_slot, pid, "opened ring handle");
        Ok(Self {
            region,
            mode,
            consumer_slot,
            claim,
            pid,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stats: HandleStats::new(),
        })
    }

    /// Open a handle from a numeric mode code (0 producer, 1 consumer,
    /// 2 manager), as passed by scripted front ends.
    pub fn open_with_code(name: &str, mode: u32) -> Result<Self> {
        Self::open(name, ClientMode::try_from(mode)?)
    }

    // ========================================================================
    // Producer API
    // ========================================================================

    /// Write all of `data`, waiting up to `timeout` for enough free space.
    ///
    /// Returns `data.len()` on success and `0` if the wait timed out, in which
    /// case nothing was written.
    pub fn put(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        self.require(ClientMode::Producer, "put")?;
        let capacity = self.region.data_bytes();
        if data.len() >= capacity {
            return Err(RingError::TooLarge { requested: data.len(), capacity });
        }
        if data.is_empty() {
            return Ok(0);
        }
        self.check_claim()?;

        let predicate = PutSpacePredicate { needed: data.len() };
        if !self.block_while(&predicate, timeout) {
            self.stats.record_timeout();
            insights::record_timeout(self.region.name(), "put", data.len());
            return Ok(0);
        }

        self.check_claim()?;
        let producer = self.region.producer();
        let offset = producer.offset.load(Ordering::Relaxed) as usize;
        let next = self.region.write_at(offset, data);
        producer.offset.store(next as u64, Ordering::Release);

        self.stats.record_put(data.len() as u64);
        insights::record_put(self.region.name(), data.len());
        Ok(data.len())
    }

    /// Bytes the producer could write right now without overrunning any
    /// attached consumer.
    pub fn available_put_space(&self) -> usize {
        let producer = self.region.producer().offset.load(Ordering::Acquire) as usize;
        let geometry = self.region.geometry();
        geometry.free_space(
            self.attached_consumers().map(|(_, _, offset)| geometry.distance(producer, offset))
        )
    }

    // ========================================================================
    // Consumer API
    // ========================================================================

    /// Read up to `buf.len()` bytes, waiting up to `timeout` until at least
    /// `min_bytes` are available.
    ///
    /// Returns the number of bytes copied, `0` on timeout.
    pub fn get(&mut self, buf: &mut [u8], min_bytes: usize, timeout: Duration) -> Result<usize> {
        self.require(ClientMode::Consumer, "get")?;
        let capacity = self.region.data_bytes();
        if min_bytes >= capacity {
            return Err(RingError::TooLarge { requested: min_bytes, capacity });
        }
        if min_bytes > buf.len() {
            return Err(RingError::MinExceedsMax { min: min_bytes, max: buf.len() });
        }
        self.check_claim()?;

        let predicate = DataAvailablePredicate { needed: min_bytes };
        if !self.block_while(&predicate, timeout) {
            self.stats.record_timeout();
            insights::record_timeout(self.region.name(), "get", min_bytes);
            return Ok(0);
        }

        let n = self.peek(buf)?;
        if n > 0 {
            self.advance_consumer(n);
        }
        self.stats.record_get(n as u64);
        insights::record_get(self.region.name(), n);
        Ok(n)
    }

    /// Copy up to `buf.len()` available bytes without consuming them.
    ///
    /// Never blocks. Returns `0` when nothing is available or when called on
    /// a producer or manager handle.
    pub fn peek(&self, buf: &mut [u8]) -> Result<usize> {
        let Some(own) = self.own_consumer() else {
            return Ok(0);
        };
        self.check_claim()?;
        let n = self.available_data().min(buf.len());
        if n > 0 {
            let offset = own.offset.load(Ordering::Relaxed) as usize;
            self.region.read_at(offset, &mut buf[..n]);
        }
        Ok(n)
    }

    /// Discard `n` bytes without copying them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.require(ClientMode::Consumer, "skip")?;
        let available = self.available_data();
        if n > available {
            return Err(RingError::SkipPastProducer { requested: n, available });
        }
        self.check_claim()?;
        if n > 0 {
            self.advance_consumer(n);
            self.stats.record_skip(n as u64);
        }
        Ok(())
    }

    /// Bytes this consumer can read right now; `0` for other modes.
    pub fn available_data(&self) -> usize {
        match self.own_consumer() {
            Some(own) => {
                let producer = self.region.producer().offset.load(Ordering::Acquire) as usize;
                let offset = own.offset.load(Ordering::Relaxed) as usize;
                self.region.geometry().distance(producer, offset)
            }
            None => 0,
        }
    }

    // ========================================================================
    // Blocking
    // ========================================================================

    /// Poll `predicate` every `poll_interval` until it clears or `timeout`
    /// elapses. A zero timeout tests once without sleeping.
    ///
    /// Returns `true` if the predicate cleared, `false` on timeout.
    pub fn block_while<P>(&self, predicate: &P, timeout: Duration) -> bool
        where P: BlockingPredicate + ?Sized
    {
        predicate::block_while(self, predicate, timeout, self.poll_interval)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Set the sleep between predicate evaluations. Zero is bumped to 1µs so
    /// a blocked call still yields the CPU.
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval.max(Duration::from_micros(1));
    }

    // ========================================================================
    // Inquiry
    // ========================================================================

    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    /// Shared memory object name (with leading `/`)
    pub fn name(&self) -> &str {
        self.region.name()
    }

    /// Consumer slot held by this handle
    pub fn consumer_slot(&self) -> Option<usize> {
        self.consumer_slot
    }

    pub fn max_consumers(&self) -> usize {
        self.region.max_consumers()
    }

    /// Size of the circular data area
    pub fn data_bytes(&self) -> usize {
        self.region.data_bytes()
    }

    /// Pid holding the producer slot, if any
    pub fn producer_pid(&self) -> Option<i64> {
        self.region.producer().owner_pid()
    }

    pub fn is_producer_attached(&self) -> bool {
        self.producer_pid().is_some()
    }

    /// Transfer counters for this handle
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Zero the transfer counters, returning their last values.
    pub fn reset_stats(&self) -> StatsSnapshot {
        let last = self.stats.snapshot();
        self.stats.reset();
        last
    }

    /// Whether this handle still owns the slot it claimed. Always `true` for
    /// managers, which claim nothing.
    pub fn owns_slot(&self) -> bool {
        match (self.claim, self.own_record()) {
            (Some(token), Some(record)) => record.holds(token),
            _ => true,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn require(&self, mode: ClientMode, operation: &'static str) -> Result<()> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(RingError::WrongMode { operation, mode: self.mode })
        }
    }

    fn own_consumer(&self) -> Option<&CursorRecord> {
        self.consumer_slot.map(|slot| self.region.consumer(slot))
    }

    fn own_record(&self) -> Option<&CursorRecord> {
        match self.mode {
            ClientMode::Producer => Some(self.region.producer()),
            ClientMode::Consumer => self.own_consumer(),
            ClientMode::Manager => None,
        }
    }

    /// A cursor is only ever written by the claim that owns it. Checked
    /// before every cursor store.
    fn check_claim(&self) -> Result<()> {
        if self.owns_slot() {
            Ok(())
        } else {
            Err(RingError::SlotLost { name: self.region.name().to_string(), mode: self.mode })
        }
    }

    fn advance_consumer(&self, n: usize) {
        if let Some(own) = self.own_consumer() {
            let offset = own.offset.load(Ordering::Relaxed) as usize;
            let next = self.region.geometry().advance(offset, n);
            own.offset.store(next as u64, Ordering::Release);
        }
    }

    /// `(slot, pid, offset)` of every owned consumer slot
    fn attached_consumers(&self) -> impl Iterator<Item = (usize, i64, usize)> + '_ {
        self.region.consumers().filter_map(|(slot, record)| {
            record
                .owner_pid()
                .map(|pid| (slot, pid, record.offset.load(Ordering::Acquire) as usize))
        })
    }
}

impl Drop for RingBuffer {
    fn drop(&mut self) {
        if let (Some(token), Some(record)) = (self.claim, self.own_record()) {
            // Only our own claim is given back; one taken over after a forced
            // release carries a newer generation and stays put.
            let released = record.release(token);
            debug!(
                ring = %self.region.name(),
                mode = %self.mode,
                slot = ?self.consumer_slot,
                released,
                "closed ring handle"
            );
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("name", &self.region.name())
            .field("mode", &self.mode)
            .field("consumer_slot", &self.consumer_slot)
            .field("data_bytes", &self.region.data_bytes())
            .finish()
    }
}

fn claim_producer(region: &RingRegion, pid: i64) -> Result<ClaimToken> {
    let producer = region.producer();
    producer.try_claim(pid).ok_or_else(|| RingError::ProducerExists {
        name: region.name().to_string(),
        pid: producer.owner_pid().unwrap_or_default(),
    })
}

/// Claim the first free consumer slot. The compare-and-swap on the owner makes
/// the claim atomic across processes scanning at the same time.
fn claim_consumer(region: &RingRegion, pid: i64) -> Result<(usize, ClaimToken)> {
    for (slot, record) in region.consumers() {
        if let Some(token) = record.try_claim(pid) {
            let start = region.producer().offset.load(Ordering::Acquire);
            record.offset.store(start, Ordering::Release);
            return Ok((slot, token));
        }
    }
    Err(RingError::NoFreeConsumerSlot {
        name: region.name().to_string(),
        max_consumers: region.max_consumers(),
    })
}
