//! Error types and handling for daqring

use thiserror::Error;

use crate::ring::ClientMode;

/// Result type alias for ring operations
pub type Result<T> = std::result::Result<T, RingError>;

/// Main error type for daqring.
///
/// A timed-out `put`/`get` is not an error; those return `Ok(0)`.
#[derive(Error, Debug)]
pub enum RingError {
    /// I/O errors while sizing or mapping the shared region
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the OS shared memory primitives
    #[error("OS error: {0}")]
    Os(#[from] nix::Error),

    /// Every consumer slot of the ring is taken
    #[error("ring '{name}' has no free consumer slot (max {max_consumers})")]
    NoFreeConsumerSlot {
        /// Ring name
        name: String,
        /// Size of the consumer slot array
        max_consumers: usize,
    },

    /// The shared memory object does not carry a valid ring header
    #[error("'{name}' is not a ring buffer: {reason}")]
    NotARing {
        /// Ring name
        name: String,
        /// What failed validation
        reason: String,
    },

    /// The producer slot is already claimed
    #[error("ring '{name}' already has a producer (pid {pid})")]
    ProducerExists {
        /// Ring name
        name: String,
        /// Pid currently holding the producer slot
        pid: i64,
    },

    /// Operation called on a handle of the wrong mode
    #[error("{operation} is not allowed on a {mode} handle")]
    WrongMode {
        /// Operation attempted
        operation: &'static str,
        /// Mode of the handle it was attempted on
        mode: ClientMode,
    },

    /// The handle's slot was force-released, reaped or reformatted away
    #[error("{mode} handle on ring '{name}' no longer owns its slot")]
    SlotLost {
        /// Ring name
        name: String,
        /// Mode of the handle that lost its slot
        mode: ClientMode,
    },

    /// Unknown client mode value
    #[error("invalid client mode: {value}")]
    InvalidMode {
        /// The rejected value
        value: String,
    },

    /// Transfer that can never be satisfied however long we wait
    #[error("request of {requested} bytes can never fit a ring of {capacity} data bytes")]
    TooLarge {
        /// Requested byte count
        requested: usize,
        /// Ring data capacity
        capacity: usize,
    },

    /// `get` minimum larger than the destination buffer
    #[error("minimum transfer {min} exceeds buffer size {max}")]
    MinExceedsMax {
        /// Requested minimum
        min: usize,
        /// Destination buffer length
        max: usize,
    },

    /// `skip` past the producer
    #[error("cannot skip {requested} bytes, only {available} available")]
    SkipPastProducer {
        /// Requested byte count
        requested: usize,
        /// Bytes currently available to this consumer
        available: usize,
    },

    /// Consumer slot index outside `[0, max_consumers)`
    #[error("consumer slot {slot} out of range (max {max_consumers})")]
    SlotOutOfRange {
        /// Requested slot
        slot: usize,
        /// Size of the consumer slot array
        max_consumers: usize,
    },

    /// Invalid configuration parameter
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Ring name that cannot be mapped onto a shared memory object name
    #[error("invalid ring name '{name}': {reason}")]
    InvalidName {
        /// The rejected name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },
}

impl RingError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a new header validation error
    pub fn not_a_ring(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotARing {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// OS-level failures and slot exhaustion
    pub fn is_resource_error(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Os(_) | Self::NoFreeConsumerSlot { .. } | Self::NotARing { .. }
        )
    }

    /// Operation issued in a state that cannot accept it
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Self::ProducerExists { .. } |
                Self::WrongMode { .. } |
                Self::SlotLost { .. } |
                Self::InvalidMode { .. }
        )
    }

    /// Sizes or indices that can never be satisfied
    pub fn is_range_error(&self) -> bool {
        matches!(
            self,
            Self::TooLarge { .. } |
                Self::MinExceedsMax { .. } |
                Self::SkipPastProducer { .. } |
                Self::SlotOutOfRange { .. }
        )
    }
}
