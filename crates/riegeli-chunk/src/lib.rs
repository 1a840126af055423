//! Chunk-level encoding and decoding for the Riegeli record container.
//!
//! A chunk is the unit of batching, compression and corruption detection:
//! a 40-byte checksummed header followed by a payload holding a batch of
//! records. This crate implements everything between raw record bytes and
//! a finished chunk:
//!
//! - [`ChunkHeader`] / [`Chunk`]: the checksummed framing unit
//! - [`CompressionType`] + [`Compressor`]/[`Decompressor`]: the uniform
//!   codec adapter over None/Brotli/Zstd/Snappy
//! - the simple codec: record sizes + concatenated bytes
//! - the transposed codec: records decomposed column-wise by proto field
//!   path, for compressibility and [`FieldProjection`]
//! - [`ChunkEncoder`] / [`ChunkDecoder`]: the dispatch layer the record
//!   layer drives
//!
//! Block framing (64 KiB boundaries, block headers) and the record-level
//! state machine live in `riegeli-records`.

pub mod chunk_decoder;
pub mod chunk_encoder;
pub mod compressor;
pub mod decompressor;
pub mod header;
pub mod projection;
pub mod simple_decoder;
pub mod simple_encoder;
pub mod transpose_decoder;
pub mod transpose_encoder;
pub mod types;
pub mod wire;

pub use chunk_decoder::{ChunkDecoder, DecodedRecords};
pub use chunk_encoder::ChunkEncoder;
pub use compressor::{Compressor, CompressorOptions};
pub use decompressor::Decompressor;
pub use header::{Chunk, ChunkHeader, CHUNK_HEADER_SIZE};
pub use projection::{FieldPath, FieldProjection};
pub use types::{ChunkType, CompressionType};
