//! Self-checking record framing for ring streams.
//!
//! A record is `[len: u32 LE][seq: u64 LE][payload: len bytes]` where every
//! payload byte is `pattern(seq, index)`. Readers can therefore detect lost,
//! duplicated, reordered or corrupted bytes without an out-of-band copy.

use std::fmt;

/// Bytes of framing in front of each payload
pub const RECORD_HEADER: usize = 12;

/// Expected payload byte `index` of record `seq`
#[inline]
pub fn pattern(seq: u64, index: usize) -> u8 {
    (seq as u8).wrapping_mul(31).wrapping_add(index as u8)
}

/// Produces consecutive records.
#[derive(Debug, Default)]
pub struct RecordWriter {
    next_seq: u64,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the next record with `payload_len` payload bytes
    pub fn next_record(&mut self, payload_len: usize) -> Vec<u8> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let mut record = Vec::with_capacity(RECORD_HEADER + payload_len);
        record.extend_from_slice(&(payload_len as u32).to_le_bytes());
        record.extend_from_slice(&seq.to_le_bytes());
        record.extend((0..payload_len).map(|i| pattern(seq, i)));
        record
    }

    /// Records produced so far
    pub fn count(&self) -> u64 {
        self.next_seq
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    Sequence { expected: u64, got: u64 },
    Payload { seq: u64, index: usize },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence { expected, got } => {
                write!(f, "expected record {} got {}", expected, got)
            }
            Self::Payload { seq, index } => write!(f, "record {} corrupt at byte {}", seq, index),
        }
    }
}

impl std::error::Error for VerifyError {}

/// Reassembles records from arbitrary byte chunks and checks them.
#[derive(Debug)]
pub struct RecordReader {
    pending: Vec<u8>,
    next_seq: u64,
    records: u64,
}

impl RecordReader {
    /// Reader expecting the stream to start at record `first_seq`
    pub fn starting_at(first_seq: u64) -> Self {
        Self { pending: Vec::new(), next_seq: first_seq, records: 0 }
    }

    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Feed bytes read from the ring; returns the number of records completed.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<usize, VerifyError> {
        self.pending.extend_from_slice(bytes);
        let mut completed = 0;
        let mut consumed = 0;

        while self.pending.len() - consumed >= RECORD_HEADER {
            let head = &self.pending[consumed..];
            let len = u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize;
            if head.len() < RECORD_HEADER + len {
                break;
            }
            let mut seq_bytes = [0u8; 8];
            seq_bytes.copy_from_slice(&head[4..RECORD_HEADER]);
            let seq = u64::from_le_bytes(seq_bytes);
            if seq != self.next_seq {
                return Err(VerifyError::Sequence { expected: self.next_seq, got: seq });
            }
            let payload = &head[RECORD_HEADER..RECORD_HEADER + len];
            if let Some(index) = payload
                .iter()
                .enumerate()
                .position(|(i, b)| *b != pattern(seq, i))
            {
                return Err(VerifyError::Payload { seq, index });
            }
            consumed += RECORD_HEADER + len;
            self.next_seq += 1;
            self.records += 1;
            completed += 1;
        }

        self.pending.drain(..consumed);
        Ok(completed)
    }

    /// Records verified so far
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Bytes of an incomplete trailing record
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Default for RecordReader {
    fn default() -> Self {
        Self::new()
    }
}
