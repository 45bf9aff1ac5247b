//! Blocking predicates for `put`/`get`.
//!
//! Producer and consumers are unrelated processes sharing nothing but the
//! mapped region, so a blocked handle polls: evaluate the predicate, sleep for
//! the handle's poll interval, check the clock, repeat.

use std::thread;
use std::time::{ Duration, Instant };

use super::RingBuffer;

/// Condition evaluated against a handle while it waits.
///
/// `should_block` returns `true` for as long as the caller must keep waiting.
pub trait BlockingPredicate {
    fn should_block(&self, ring: &RingBuffer) -> bool;
}

impl<F> BlockingPredicate for F where F: Fn(&RingBuffer) -> bool {
    fn should_block(&self, ring: &RingBuffer) -> bool {
        self(ring)
    }
}

/// Blocks while the producer has fewer than `needed` bytes of free space.
#[derive(Debug, Clone, Copy)]
pub struct PutSpacePredicate {
    pub needed: usize,
}

impl BlockingPredicate for PutSpacePredicate {
    fn should_block(&self, ring: &RingBuffer) -> bool {
        ring.available_put_space() < self.needed
    }
}

/// Blocks while the consumer has fewer than `needed` bytes to read.
#[derive(Debug, Clone, Copy)]
pub struct DataAvailablePredicate {
    pub needed: usize,
}

impl BlockingPredicate for DataAvailablePredicate {
    fn should_block(&self, ring: &RingBuffer) -> bool {
        ring.available_data() < self.needed
    }
}

/// Poll `predicate` until it clears or `timeout` elapses.
///
/// A zero timeout evaluates the predicate once and never sleeps. Returns
/// `true` if the predicate cleared, `false` on timeout.
pub(crate) fn block_while<P>(
    ring: &RingBuffer,
    predicate: &P,
    timeout: Duration,
    poll_interval: Duration
) -> bool
    where P: BlockingPredicate + ?Sized
{
    if timeout.is_zero() {
        return !predicate.should_block(ring);
    }

    let start = Instant::now();
    loop {
        if !predicate.should_block(ring) {
            return true;
        }
        thread::sleep(poll_interval);
        if start.elapsed() >= timeout {
            return false;
        }
    }
}
