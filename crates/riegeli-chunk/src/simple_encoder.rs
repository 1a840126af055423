//! Simple Chunk Encoding
//!
//! The simple codec stores a batch as the record sizes followed by the
//! record bytes:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────────────────────┐
//! │ compression type │ compressed stream:                           │
//! │ (1 byte)         │   record size varint × num_records           │
//! │                  │   concatenated record bytes                  │
//! └──────────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! The sizes are the deltas of the cumulative record-end offsets; the
//! decoder reconstructs the ends. The record count itself lives in the
//! chunk header.

use bytes::{BufMut, Bytes, BytesMut};
use riegeli_core::{varint, Chain, Result};

use crate::compressor::{Compressor, CompressorOptions};
use crate::header::Chunk;
use crate::types::ChunkType;

/// Accumulates records and encodes them as a simple chunk.
pub struct SimpleEncoder {
    compressor: Compressor,
    sizes: BytesMut,
    values: Chain,
    num_records: u64,
}

impl SimpleEncoder {
    pub fn new(options: CompressorOptions) -> Self {
        Self {
            compressor: Compressor::new(options),
            sizes: BytesMut::new(),
            values: Chain::new(),
            num_records: 0,
        }
    }

    pub fn add_record(&mut self, record: &[u8]) {
        varint::write_u64(&mut self.sizes, record.len() as u64);
        self.values.append_slice(record);
        self.num_records += 1;
    }

    /// Like [`add_record`](Self::add_record) but shares large payloads
    /// instead of copying them.
    pub fn add_record_bytes(&mut self, record: Bytes) {
        varint::write_u64(&mut self.sizes, record.len() as u64);
        self.values.append_bytes(record);
        self.num_records += 1;
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    /// Total decoded size so far: the concatenated record bytes.
    pub fn decoded_size(&self) -> u64 {
        self.values.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    /// Finishes the batch into a chunk.
    pub fn encode(self) -> Result<Chunk> {
        let decoded_data_size = self.values.len() as u64;
        let mut stream = Chain::new();
        stream.append_bytes(self.sizes.freeze());
        stream.append_chain(self.values);

        let mut data = Chain::new();
        let mut type_byte = BytesMut::with_capacity(1);
        type_byte.put_u8(self.compressor.kind() as u8);
        data.append_bytes(type_byte.freeze());
        data.append_chain(self.compressor.compress(&stream)?);

        Chunk::new(ChunkType::Simple, self.num_records, decoded_data_size, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CompressionType;

    #[test]
    fn test_three_records_uncompressed_layout() {
        let mut encoder = SimpleEncoder::new(CompressorOptions::uncompressed());
        encoder.add_record(b"a");
        encoder.add_record(b"bb");
        encoder.add_record(b"ccc");
        assert_eq!(encoder.num_records(), 3);
        assert_eq!(encoder.decoded_size(), 6);

        let chunk = encoder.encode().unwrap();
        assert_eq!(chunk.header.chunk_type, ChunkType::Simple);
        assert_eq!(chunk.header.num_records, 3);
        assert_eq!(chunk.header.decoded_data_size, 6);

        let payload = chunk.data.to_bytes();
        assert_eq!(payload[0], CompressionType::None as u8);
        // Size varints 1, 2, 3 then the record bytes.
        assert_eq!(&payload[1..4], &[1, 2, 3]);
        assert_eq!(&payload[4..], b"abbccc");
    }

    #[test]
    fn test_empty_record_batch() {
        let encoder = SimpleEncoder::new(CompressorOptions::uncompressed());
        assert!(encoder.is_empty());
        let chunk = encoder.encode().unwrap();
        assert_eq!(chunk.header.num_records, 0);
        assert_eq!(chunk.header.data_size, 1);
    }

    #[test]
    fn test_empty_records_still_counted() {
        let mut encoder = SimpleEncoder::new(CompressorOptions::uncompressed());
        encoder.add_record(b"");
        encoder.add_record(b"");
        let chunk = encoder.encode().unwrap();
        assert_eq!(chunk.header.num_records, 2);
        assert_eq!(chunk.header.decoded_data_size, 0);
        let payload = chunk.data.to_bytes();
        assert_eq!(&payload[1..], &[0, 0]);
    }

    #[test]
    fn test_compressed_chunk_shrinks() {
        let mut encoder =
            SimpleEncoder::new(CompressorOptions::with_kind(CompressionType::Zstd));
        for _ in 0..100 {
            encoder.add_record(&[6u8; 200]);
        }
        let chunk = encoder.encode().unwrap();
        assert_eq!(chunk.header.decoded_data_size, 20_000);
        assert!(chunk.header.data_size < 2_000);
    }
}
