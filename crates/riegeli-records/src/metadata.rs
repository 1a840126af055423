//! File Metadata Chunk
//!
//! Directly after the signature, a file may carry one `FileMetadata`
//! chunk describing the record type (a serialized message, opaque to the
//! container). Its payload is a one-record transposed chunk body whose
//! header nevertheless declares zero records, so readers that do not ask
//! for metadata stream straight over it.

use bytes::Bytes;
use riegeli_chunk::transpose_decoder;
use riegeli_chunk::transpose_encoder::TransposeEncoder;
use riegeli_chunk::{Chunk, ChunkType, CompressorOptions, FieldProjection};
use riegeli_core::{Error, Result};

/// The serialized record-type description of a file; opaque bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordsMetadata {
    serialized: Bytes,
}

impl RecordsMetadata {
    pub fn new(serialized: Bytes) -> Self {
        Self { serialized }
    }

    /// Metadata of a file that carries none.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.serialized.is_empty()
    }

    pub fn serialized(&self) -> &Bytes {
        &self.serialized
    }

    pub fn into_bytes(self) -> Bytes {
        self.serialized
    }
}

/// Encodes serialized metadata as the FileMetadata chunk.
pub(crate) fn encode_metadata_chunk(
    serialized: &[u8],
    options: CompressorOptions,
) -> Result<Chunk> {
    let mut encoder = TransposeEncoder::new(options);
    encoder.add_record(serialized)?;
    encoder.encode_as(ChunkType::FileMetadata, 0)
}

/// Decodes a FileMetadata chunk read at file position `pos`.
pub(crate) fn decode_metadata_chunk(chunk: &Chunk, pos: u64) -> Result<RecordsMetadata> {
    if chunk.header.chunk_type != ChunkType::FileMetadata {
        return Err(Error::internal("not a file metadata chunk"));
    }
    if chunk.header.num_records != 0 {
        return Err(Error::data_loss(format!(
            "file metadata chunk at {pos} declares {} records",
            chunk.header.num_records
        )));
    }
    let decoded = transpose_decoder::decode(
        &chunk.data.to_bytes(),
        1,
        chunk.header.decoded_data_size,
        &FieldProjection::All,
        pos,
    )?;
    Ok(RecordsMetadata::new(decoded.record(0)))
}
