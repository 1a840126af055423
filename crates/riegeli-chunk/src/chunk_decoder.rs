//! Chunk Decoding Dispatch
//!
//! [`ChunkDecoder`] turns a verified [`Chunk`] into an indexed batch of
//! records, choosing the simple or transposed decoder by chunk type.
//! Signature, metadata and padding chunks decode to zero records, which
//! is what lets the record layer stream over them without special cases.
//!
//! The decoder owns the current chunk's records until the next reset, and
//! exposes a cursor (`index`) the record layer drives for sequential
//! reads and seeks.

use bytes::Bytes;

use riegeli_core::Result;

use crate::header::Chunk;
use crate::projection::FieldProjection;
use crate::types::ChunkType;
use crate::{simple_decoder, transpose_decoder};

/// A decoded record batch: one flat buffer plus cumulative record ends.
#[derive(Debug, Clone, Default)]
pub struct DecodedRecords {
    values: Bytes,
    limits: Vec<usize>,
}

impl DecodedRecords {
    pub fn new(values: Bytes, limits: Vec<usize>) -> Self {
        Self { values, limits }
    }

    pub fn num_records(&self) -> u64 {
        self.limits.len() as u64
    }

    /// Cumulative end offset of each record in the flat buffer.
    pub fn limits(&self) -> &[usize] {
        &self.limits
    }

    /// Zero-copy view of one record.
    pub fn record(&self, index: u64) -> Bytes {
        let index = index as usize;
        let begin = if index == 0 { 0 } else { self.limits[index - 1] };
        self.values.slice(begin..self.limits[index])
    }

    /// Total decoded bytes.
    pub fn decoded_size(&self) -> u64 {
        self.limits.last().copied().unwrap_or(0) as u64
    }
}

/// Decodes chunks and serves their records by index.
pub struct ChunkDecoder {
    projection: FieldProjection,
    records: DecodedRecords,
    index: u64,
}

impl ChunkDecoder {
    pub fn new(projection: FieldProjection) -> Self {
        Self {
            projection,
            records: DecodedRecords::default(),
            index: 0,
        }
    }

    /// Drops the current batch; the decoder reads as exhausted.
    pub fn reset(&mut self) {
        self.records = DecodedRecords::default();
        self.index = 0;
    }

    /// Decodes `chunk` (located at file position `pos`) and rewinds the
    /// cursor. On error the decoder is left empty.
    pub fn reset_chunk(&mut self, chunk: &Chunk, pos: u64) -> Result<()> {
        self.reset();
        let payload = chunk.data.to_bytes();
        let decoded = match chunk.header.chunk_type {
            ChunkType::FileSignature | ChunkType::FileMetadata | ChunkType::Padding => {
                DecodedRecords::default()
            }
            ChunkType::Simple => simple_decoder::decode(
                &payload,
                chunk.header.num_records,
                chunk.header.decoded_data_size,
                pos,
            )?,
            ChunkType::Transposed => transpose_decoder::decode(
                &payload,
                chunk.header.num_records,
                chunk.header.decoded_data_size,
                &self.projection,
                pos,
            )?,
        };
        self.records = decoded;
        Ok(())
    }

    /// Returns the record at the cursor and advances, or `None` at end of
    /// chunk.
    pub fn read_record(&mut self) -> Option<Bytes> {
        if self.index >= self.records.num_records() {
            return None;
        }
        let record = self.records.record(self.index);
        self.index += 1;
        Some(record)
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn num_records(&self) -> u64 {
        self.records.num_records()
    }

    /// Moves the cursor, clamping to the end of the chunk.
    pub fn set_index(&mut self, index: u64) {
        self.index = index.min(self.records.num_records());
    }
}
