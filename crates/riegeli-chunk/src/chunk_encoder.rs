//! Chunk Encoding Dispatch
//!
//! [`ChunkEncoder`] is the write-side mirror of
//! [`ChunkDecoder`](crate::chunk_decoder::ChunkDecoder): the record layer
//! feeds it records and asks for the running decoded size (the chunk
//! closer watches it), then finishes the batch into a [`Chunk`]. Whether
//! the batch is laid out simple or transposed is fixed at construction.

use riegeli_core::Result;

use crate::compressor::CompressorOptions;
use crate::header::Chunk;
use crate::simple_encoder::SimpleEncoder;
use crate::transpose_encoder::TransposeEncoder;

/// Accumulates one chunk's worth of records.
pub enum ChunkEncoder {
    Simple(SimpleEncoder),
    Transposed(TransposeEncoder),
}

impl ChunkEncoder {
    pub fn new(transpose: bool, options: CompressorOptions) -> Self {
        if transpose {
            ChunkEncoder::Transposed(TransposeEncoder::new(options))
        } else {
            ChunkEncoder::Simple(SimpleEncoder::new(options))
        }
    }

    pub fn add_record(&mut self, record: &[u8]) -> Result<()> {
        match self {
            ChunkEncoder::Simple(encoder) => {
                encoder.add_record(record);
                Ok(())
            }
            ChunkEncoder::Transposed(encoder) => encoder.add_record(record),
        }
    }

    pub fn num_records(&self) -> u64 {
        match self {
            ChunkEncoder::Simple(encoder) => encoder.num_records(),
            ChunkEncoder::Transposed(encoder) => encoder.num_records(),
        }
    }

    /// Total decoded size of the records buffered so far.
    pub fn decoded_size(&self) -> u64 {
        match self {
            ChunkEncoder::Simple(encoder) => encoder.decoded_size(),
            ChunkEncoder::Transposed(encoder) => encoder.decoded_size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ChunkEncoder::Simple(encoder) => encoder.is_empty(),
            ChunkEncoder::Transposed(encoder) => encoder.is_empty(),
        }
    }

    pub fn encode(self) -> Result<Chunk> {
        match self {
            ChunkEncoder::Simple(encoder) => encoder.encode(),
            ChunkEncoder::Transposed(encoder) => encoder.encode(),
        }
    }
}
