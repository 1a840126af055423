//! Chunk Header Format
//!
//! Every chunk starts with a fixed 40-byte header, all fields
//! little-endian:
//!
//! ```text
//! ┌──────────────┬───────────┬───────────┬──────────────────────┬───────────────────┐
//! │ header hash  │ data size │ data hash │ chunk type (1 byte)  │ decoded data size │
//! │ (8 bytes)    │ (8 bytes) │ (8 bytes) │ num records (7 bytes)│ (8 bytes)         │
//! └──────────────┴───────────┴───────────┴──────────────────────┴───────────────────┘
//! ```
//!
//! `header_hash` is the keyed hash of the remaining 32 header bytes;
//! `data_hash` covers the payload. The chunk type byte and the 56-bit
//! record count share one little-endian word. Corruption in either region
//! is detected independently, which drives the reader's two recovery
//! modes: a bad payload under a valid header still tells the reader where
//! the chunk ends.

use bytes::{Buf, BufMut};
use riegeli_core::{hash, Chain, Error, Result};

use crate::types::ChunkType;

/// Encoded size of a chunk header in bytes.
pub const CHUNK_HEADER_SIZE: u64 = 40;

/// Maximum representable record count (56 bits).
pub const MAX_NUM_RECORDS: u64 = (1 << 56) - 1;

/// Decoded form of the 40-byte chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub data_size: u64,
    pub data_hash: u64,
    pub chunk_type: ChunkType,
    pub num_records: u64,
    pub decoded_data_size: u64,
}

impl ChunkHeader {
    /// Serializes the header, computing `header_hash` over bytes 8..40.
    pub fn encode(&self) -> [u8; CHUNK_HEADER_SIZE as usize] {
        let mut out = [0u8; CHUNK_HEADER_SIZE as usize];
        {
            let mut rest = &mut out[8..];
            rest.put_u64_le(self.data_size);
            rest.put_u64_le(self.data_hash);
            rest.put_u64_le(self.chunk_type as u64 | (self.num_records << 8));
            rest.put_u64_le(self.decoded_data_size);
        }
        let header_hash = hash::hash(&out[8..]);
        out[..8].copy_from_slice(&header_hash.to_le_bytes());
        out
    }

    /// Parses and verifies a header read at file position `pos`.
    pub fn decode(bytes: &[u8], pos: u64) -> Result<ChunkHeader> {
        if bytes.len() < CHUNK_HEADER_SIZE as usize {
            return Err(Error::internal("chunk header slice too short"));
        }
        let mut cursor = &bytes[..CHUNK_HEADER_SIZE as usize];
        let stored_hash = cursor.get_u64_le();
        let computed_hash = hash::hash(&bytes[8..CHUNK_HEADER_SIZE as usize]);
        if stored_hash != computed_hash {
            return Err(Error::data_loss(format!(
                "invalid chunk header hash at {pos}"
            )));
        }
        let data_size = cursor.get_u64_le();
        let data_hash = cursor.get_u64_le();
        let type_and_count = cursor.get_u64_le();
        let decoded_data_size = cursor.get_u64_le();
        let chunk_type = ChunkType::try_from((type_and_count & 0xFF) as u8)
            .map_err(|_| Error::data_loss(format!("unknown chunk type at {pos}")))?;
        Ok(ChunkHeader {
            data_size,
            data_hash,
            chunk_type,
            num_records: type_and_count >> 8,
            decoded_data_size,
        })
    }

    /// Verifies `data_hash` against an assembled payload.
    pub fn verify_data(&self, data: &Chain, pos: u64) -> Result<()> {
        if hash::hash_chain(data) != self.data_hash {
            return Err(Error::data_loss(format!(
                "invalid chunk data hash for chunk at {pos}"
            )));
        }
        Ok(())
    }
}

/// A complete chunk: header plus payload.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub header: ChunkHeader,
    pub data: Chain,
}

impl Chunk {
    /// Builds a chunk over `data`, computing both hashes.
    pub fn new(
        chunk_type: ChunkType,
        num_records: u64,
        decoded_data_size: u64,
        data: Chain,
    ) -> Result<Chunk> {
        if num_records > MAX_NUM_RECORDS {
            return Err(Error::invalid_argument(format!(
                "too many records for one chunk: {num_records}"
            )));
        }
        let header = ChunkHeader {
            data_size: data.len() as u64,
            data_hash: hash::hash_chain(&data),
            chunk_type,
            num_records,
            decoded_data_size,
        };
        Ok(Chunk { header, data })
    }

    /// The mandatory first chunk of every file. No data, no records.
    pub fn file_signature() -> Chunk {
        Chunk::trusted(ChunkType::FileSignature, 0, 0, Chain::new())
    }

    /// A zero-filled chunk used to reach block alignment.
    pub fn padding(data_size: u64) -> Chunk {
        Chunk::trusted(
            ChunkType::Padding,
            0,
            0,
            Chain::from(vec![0u8; data_size as usize]),
        )
    }

    /// Constructor for record counts known to be in range.
    fn trusted(chunk_type: ChunkType, num_records: u64, decoded_data_size: u64, data: Chain) -> Chunk {
        let header = ChunkHeader {
            data_size: data.len() as u64,
            data_hash: hash::hash_chain(&data),
            chunk_type,
            num_records,
            decoded_data_size,
        };
        Chunk { header, data }
    }

    /// Total encoded size: header plus payload, before block framing.
    pub fn size(&self) -> u64 {
        CHUNK_HEADER_SIZE + self.header.data_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> Chunk {
        Chunk::new(
            ChunkType::Simple,
            3,
            6,
            Chain::from(&b"\x00\x01\x02\x03abcdef"[..]),
        )
        .unwrap()
    }

    #[test]
    fn test_header_roundtrip() {
        let chunk = sample_chunk();
        let encoded = chunk.header.encode();
        let decoded = ChunkHeader::decode(&encoded, 0).unwrap();
        assert_eq!(decoded, chunk.header);
    }

    #[test]
    fn test_header_layout() {
        let chunk = sample_chunk();
        let encoded = chunk.header.encode();
        assert_eq!(encoded.len(), 40);
        // data_size at [8..16]
        assert_eq!(
            u64::from_le_bytes(encoded[8..16].try_into().unwrap()),
            chunk.header.data_size
        );
        // chunk type byte at [24], record count in the upper 56 bits.
        assert_eq!(encoded[24], ChunkType::Simple as u8);
        let word = u64::from_le_bytes(encoded[24..32].try_into().unwrap());
        assert_eq!(word >> 8, 3);
    }

    #[test]
    fn test_header_hash_detects_flip() {
        let chunk = sample_chunk();
        let mut encoded = chunk.header.encode();
        encoded[20] ^= 0x01;
        let err = ChunkHeader::decode(&encoded, 131072).unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("131072"));
    }

    #[test]
    fn test_data_hash_detects_flip() {
        let chunk = sample_chunk();
        let mut corrupted = chunk.data.to_bytes().to_vec();
        corrupted[5] ^= 0x80;
        let err = chunk
            .header
            .verify_data(&Chain::from(corrupted), 64)
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_file_signature_shape() {
        let signature = Chunk::file_signature();
        assert_eq!(signature.header.chunk_type, ChunkType::FileSignature);
        assert_eq!(signature.header.data_size, 0);
        assert_eq!(signature.header.num_records, 0);
        assert_eq!(signature.header.decoded_data_size, 0);
        assert_eq!(signature.size(), CHUNK_HEADER_SIZE);
    }

    #[test]
    fn test_padding_is_zero_filled() {
        let padding = Chunk::padding(100);
        assert_eq!(padding.header.data_size, 100);
        assert!(padding.data.to_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_num_records_limit() {
        assert!(Chunk::new(ChunkType::Simple, 1 << 56, 0, Chain::new()).is_err());
        assert!(Chunk::new(ChunkType::Simple, (1 << 56) - 1, 0, Chain::new()).is_ok());
    }
}
