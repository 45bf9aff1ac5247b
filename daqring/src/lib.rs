//! # daqring
//!
//! Named shared-memory byte ring for moving event data between processes on
//! one host. One producer writes into a fixed circular region; any number of
//! consumers (up to the ring's slot count) tail the same bytes, each at its
//! own pace from its own cursor.
//!
//! ## Architecture
//!
//! ```text
//! Readout process              Shared memory "/events"            Consumers
//! ┌──────────────┐      ┌──────────────────────────────┐      ┌────────────┐
//! │  RingBuffer  │      │ header                       │      │ RingBuffer │
//! │  (producer) ─┼─put─►│ producer cursor              │◄─get─┼ (consumer) │
//! │              │      │ consumer cursors × N         │      ├────────────┤
//! └──────────────┘      │ circular data ...            │◄─get─┼ (consumer) │
//!                       └──────────────────────────────┘      └────────────┘
//! ```
//!
//! - [`RingRegion`] creates, formats, maps and removes the named region.
//! - [`RingBuffer`] is a per-process handle in one [`ClientMode`].
//! - Blocking `put`/`get` poll a [`BlockingPredicate`] until it clears or
//!   the timeout runs out; a timeout returns `0`, not an error.
//! - Manager handles inspect [`Usage`] and release slots left behind by
//!   crashed clients.

pub mod config;
pub mod constants;
pub mod error;
pub mod insights;
pub mod metrics;
pub mod region;
pub mod ring;

pub use config::{
    default_max_consumers,
    default_ring_size,
    set_default_max_consumers,
    set_default_ring_size,
    RingConfig,
};
pub use constants::WAIT_FOREVER;
pub use error::{ Result, RingError };
pub use metrics::StatsSnapshot;
pub use region::RingRegion;
pub use ring::{
    BlockingPredicate,
    ClientMode,
    ConsumerUsage,
    DataAvailablePredicate,
    PutSpacePredicate,
    ReleasedSlot,
    RingBuffer,
    Usage,
};

/// Create a ring using the process-wide default size and slot count.
pub fn create_default(name: &str) -> Result<()> {
    RingRegion::create(name, default_ring_size(), default_max_consumers())
}
