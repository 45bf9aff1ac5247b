//! Binary layout of a ring region.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐ 0
//! │  RingHeader (128 bytes)                      │
//! │  ├─ magic[32], version                       │
//! │  └─ max_consumer, offsets, data_bytes        │
//! ├──────────────────────────────────────────────┤ producer_info_offset
//! │  CursorRecord (producer, 64 bytes)           │
//! ├──────────────────────────────────────────────┤ first_consumer_offset
//! │  CursorRecord × max_consumer                 │
//! ├──────────────────────────────────────────────┤ data_offset
//! │  circular data bytes ...                     │
//! │                                              │ top_offset (last byte)
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Every offset is absolute from the region start. Cursor offsets always lie in
//! `[data_offset, top_offset]`.

use std::sync::atomic::{ AtomicU64, Ordering };

use static_assertions::const_assert_eq;

use crate::constants::{ CACHE_LINE_SIZE, LAYOUT_VERSION, RING_MAGIC };

/// Fixed header at the start of the region. Written once by `format`.
#[repr(C, align(64))]
#[derive(Debug, Clone, Copy)]
pub struct RingHeader {
    pub magic: [u8; 32],
    pub version: u32,
    _pad0: u32,
    pub max_consumer: u64,
    pub producer_info_offset: u64,
    pub first_consumer_offset: u64,
    pub data_offset: u64,
    pub top_offset: u64,
    pub data_bytes: u64,
}

/// One producer or consumer cursor. Each lives on its own cache line.
///
/// Ownership is a single word: the claim generation in the high half and the
/// owner pid in the low half, pid `0` meaning unowned. Every claim bumps the
/// generation, so the word a handle got when claiming (its [`ClaimToken`])
/// matches only for as long as that particular claim stands.
#[repr(C, align(64))]
pub struct CursorRecord {
    /// Next byte this client writes (producer) or reads (consumer)
    pub offset: AtomicU64,
    owner: AtomicU64,
}

/// Ownership word observed by a successful claim
pub type ClaimToken = u64;

const PID_MASK: u64 = 0xffff_ffff;

#[inline]
fn owner_word(generation: u64, pid: u32) -> u64 {
    (generation << 32) | pid as u64
}

#[inline]
fn generation(word: u64) -> u64 {
    word >> 32
}

#[inline]
fn pid_of(word: u64) -> Option<i64> {
    match word & PID_MASK {
        0 => None,
        pid => Some(pid as i64),
    }
}

pub const HEADER_SIZE: usize = std::mem::size_of::<RingHeader>();
pub const CURSOR_RECORD_SIZE: usize = std::mem::size_of::<CursorRecord>();

const_assert_eq!(HEADER_SIZE, 2 * CACHE_LINE_SIZE);
const_assert_eq!(CURSOR_RECORD_SIZE, CACHE_LINE_SIZE);

impl RingHeader {
    /// Compute a header for a region of `region_len` bytes.
    ///
    /// Returns `None` when the region cannot hold the cursor records plus at
    /// least two data bytes.
    pub fn for_region(region_len: usize, max_consumers: usize) -> Option<Self> {
        let data_offset = control_bytes(max_consumers)?;
        if region_len < data_offset.checked_add(2)? {
            return None;
        }
        Some(Self {
            magic: *RING_MAGIC,
            version: LAYOUT_VERSION,
            _pad0: 0,
            max_consumer: max_consumers as u64,
            producer_info_offset: HEADER_SIZE as u64,
            first_consumer_offset: (HEADER_SIZE + CURSOR_RECORD_SIZE) as u64,
            data_offset: data_offset as u64,
            top_offset: (region_len - 1) as u64,
            data_bytes: (region_len - data_offset) as u64,
        })
    }

    /// Check a header read back from a mapped region of `region_len` bytes.
    pub fn validate(&self, region_len: usize) -> std::result::Result<(), String> {
        if &self.magic != RING_MAGIC {
            return Err("bad magic signature".into());
        }
        if self.version != LAYOUT_VERSION {
            return Err(format!("layout version {} (expected {})", self.version, LAYOUT_VERSION));
        }
        let expected = Self::for_region(region_len, self.max_consumer as usize).ok_or_else(||
            format!("region of {} bytes cannot hold {} consumers", region_len, self.max_consumer)
        )?;
        if
            self.producer_info_offset != expected.producer_info_offset ||
            self.first_consumer_offset != expected.first_consumer_offset ||
            self.data_offset != expected.data_offset ||
            self.top_offset != expected.top_offset ||
            self.data_bytes != expected.data_bytes
        {
            return Err("inconsistent region geometry".into());
        }
        Ok(())
    }

    #[inline]
    pub fn geometry(&self) -> Geometry {
        Geometry {
            data_offset: self.data_offset as usize,
            top_offset: self.top_offset as usize,
        }
    }

    /// Region offset of consumer slot `slot`
    #[inline]
    pub fn consumer_offset(&self, slot: usize) -> usize {
        self.first_consumer_offset as usize + slot * CURSOR_RECORD_SIZE
    }
}

impl CursorRecord {
    /// Move the cursor to `data_offset` and drop any owner. Outstanding claim
    /// tokens stop matching.
    pub fn reset(&self, data_offset: u64) {
        self.offset.store(data_offset, Ordering::Relaxed);
        let word = self.owner.load(Ordering::Relaxed);
        self.owner.store(owner_word(generation(word).wrapping_add(1), 0), Ordering::Release);
    }

    /// Pid holding this record, if any
    #[inline]
    pub fn owner_pid(&self) -> Option<i64> {
        pid_of(self.owner.load(Ordering::Acquire))
    }

    /// Claim the record for `pid` if it is unowned.
    pub fn try_claim(&self, pid: i64) -> Option<ClaimToken> {
        let pid = u32::try_from(pid).ok().filter(|pid| *pid != 0)?;
        let mut current = self.owner.load(Ordering::Acquire);
        loop {
            if pid_of(current).is_some() {
                return None;
            }
            let claimed = owner_word(generation(current).wrapping_add(1), pid);
            match
                self.owner.compare_exchange_weak(
                    current,
                    claimed,
                    Ordering::AcqRel,
                    Ordering::Acquire
                )
            {
                Ok(_) => {
                    return Some(claimed);
                }
                Err(actual) => {
                    current = actual;
                }
            }
        }
    }

    /// Whether the claim that produced `token` still stands
    #[inline]
    pub fn holds(&self, token: ClaimToken) -> bool {
        self.owner.load(Ordering::Acquire) == token
    }

    /// Give up the claim behind `token`. Returns `false` if it was already
    /// lost to a forced release, a reap or a reformat.
    pub fn release(&self, token: ClaimToken) -> bool {
        self.owner
            .compare_exchange(
                token,
                owner_word(generation(token), 0),
                Ordering::AcqRel,
                Ordering::Relaxed
            )
            .is_ok()
    }

    /// Drop whoever owns the record. Returns the previous owner.
    pub fn force_release(&self) -> Option<i64> {
        let mut current = self.owner.load(Ordering::Acquire);
        loop {
            let previous = pid_of(current)?;
            match
                self.owner.compare_exchange_weak(
                    current,
                    owner_word(generation(current), 0),
                    Ordering::AcqRel,
                    Ordering::Acquire
                )
            {
                Ok(_) => {
                    return Some(previous);
                }
                Err(actual) => {
                    current = actual;
                }
            }
        }
    }

    /// Owner pid together with the claim it holds, read in one load
    #[inline]
    pub fn owner(&self) -> Option<(i64, ClaimToken)> {
        let word = self.owner.load(Ordering::Acquire);
        pid_of(word).map(|pid| (pid, word))
    }
}

/// Bytes taken by header and all cursor records
pub fn control_bytes(max_consumers: usize) -> Option<usize> {
    max_consumers
        .checked_add(1)?
        .checked_mul(CURSOR_RECORD_SIZE)?
        .checked_add(HEADER_SIZE)
}

/// Bounds of the circular data area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub data_offset: usize,
    pub top_offset: usize,
}

impl Geometry {
    /// Usable bytes in the circular area
    #[inline]
    pub fn data_bytes(&self) -> usize {
        self.top_offset - self.data_offset + 1
    }

    /// Bytes from `other` forward to `producer` around the circle.
    #[inline]
    pub fn distance(&self, producer: usize, other: usize) -> usize {
        distance(producer, other, self.data_offset, self.top_offset)
    }

    /// Bytes a producer may write given every attached consumer's backlog:
    /// one short of the smallest gap, or of the whole area with no consumers.
    pub fn free_space(&self, backlogs: impl IntoIterator<Item = usize>) -> usize {
        let data_bytes = self.data_bytes();
        backlogs
            .into_iter()
            .fold(data_bytes - 1, |space, backlog| space.min(data_bytes - backlog - 1))
    }

    /// `offset` moved forward by `n` bytes, wrapping at `top_offset`.
    #[inline]
    pub fn advance(&self, offset: usize, n: usize) -> usize {
        debug_assert!(n < self.data_bytes());
        let next = offset + n;
        if next > self.top_offset {
            next - self.data_bytes()
        } else {
            next
        }
    }

    /// Split a transfer of `len` bytes at `offset` into the part before
    /// `top_offset` and the part that wraps to `data_offset`.
    #[inline]
    pub fn split(&self, offset: usize, len: usize) -> (usize, usize) {
        let until_top = self.top_offset - offset + 1;
        if len <= until_top {
            (len, 0)
        } else {
            (until_top, len - until_top)
        }
    }
}

/// Forward distance from `other` to `producer` in a circular area spanning
/// `[data_offset, top_offset]`. Both cursors must lie inside the area.
///
/// This is the only place cursor distances are computed; free space,
/// availability and usage all go through it.
#[inline]
pub fn distance(producer: usize, other: usize, data_offset: usize, top_offset: usize) -> usize {
    if producer >= other {
        producer - other
    } else {
        top_offset - other + 1 + (producer - data_offset)
    }
}
