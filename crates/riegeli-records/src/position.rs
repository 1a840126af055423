//! Record Positions and Skipped Regions
//!
//! A [`RecordPosition`] pins a record by the file offset of its chunk and
//! its index inside the chunk. Positions are totally ordered, stable
//! across re-reads, and cheap to hand around; the canonical byte form is
//! two varints. The numeric form `chunk_begin + record_index` is a
//! monotone `u64` that byte-position seeks accept.
//!
//! [`SkippedRegion`] is what recovery reports: the file byte range a
//! reader skipped to get past damage.

use std::fmt;

use bytes::Buf;
use riegeli_core::varint;
use serde::{Deserialize, Serialize};

/// Stable identifier of one record: `(chunk_begin, record_index)`.
///
/// Ordering is lexicographic, which equals file order.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RecordPosition {
    chunk_begin: u64,
    record_index: u64,
}

impl RecordPosition {
    pub fn new(chunk_begin: u64, record_index: u64) -> Self {
        Self {
            chunk_begin,
            record_index,
        }
    }

    /// File offset of the chunk holding the record.
    pub fn chunk_begin(&self) -> u64 {
        self.chunk_begin
    }

    /// Index of the record within its chunk.
    pub fn record_index(&self) -> u64 {
        self.record_index
    }

    /// Monotone numeric form: `chunk_begin + record_index`.
    ///
    /// Well-defined because a chunk always occupies more bytes than it
    /// holds records.
    pub fn numeric(&self) -> u64 {
        self.chunk_begin + self.record_index
    }

    /// Canonical serialization: two varints.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 * varint::MAX_LEN_U64);
        varint::write_u64(&mut out, self.chunk_begin);
        varint::write_u64(&mut out, self.record_index);
        out
    }

    /// Parses the canonical serialization; `None` on malformed or
    /// trailing input.
    pub fn from_bytes(bytes: &[u8]) -> Option<RecordPosition> {
        let mut cursor = bytes;
        let chunk_begin = varint::read_u64(&mut cursor)?;
        let record_index = varint::read_u64(&mut cursor)?;
        if cursor.has_remaining() {
            return None;
        }
        Some(RecordPosition::new(chunk_begin, record_index))
    }
}

impl fmt::Display for RecordPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chunk_begin, self.record_index)
    }
}

/// A file byte range skipped during recovery.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRegion {
    begin: u64,
    end: u64,
}

impl SkippedRegion {
    pub fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    pub fn begin(&self) -> u64 {
        self.begin
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn length(&self) -> u64 {
        self.end.saturating_sub(self.begin)
    }
}

impl fmt::Display for SkippedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}
