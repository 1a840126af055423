//! Chunk and Compression Type Bytes
//!
//! Single-byte discriminators appearing in the file format. Unknown
//! values decode to `DataLoss`, never to a panic: they arrive from
//! untrusted files.

use riegeli_core::Error;

/// Discriminator byte of a chunk, stored in the chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkType {
    /// The mandatory first chunk of every file; carries no data.
    FileSignature = b's',
    /// Optional second chunk describing the record type; opaque here.
    FileMetadata = b'm',
    /// Zero-filled filler used for block alignment.
    Padding = b'p',
    /// Record sizes plus concatenated record bytes.
    Simple = b'r',
    /// Records decomposed column-wise by field path.
    Transposed = b't',
}

impl TryFrom<u8> for ChunkType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            b's' => Ok(ChunkType::FileSignature),
            b'm' => Ok(ChunkType::FileMetadata),
            b'p' => Ok(ChunkType::Padding),
            b'r' => Ok(ChunkType::Simple),
            b't' => Ok(ChunkType::Transposed),
            _ => Err(Error::data_loss(format!("unknown chunk type byte: 0x{value:02x}"))),
        }
    }
}

/// Compression applied to a chunk payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    #[default]
    Brotli = 1,
    Zstd = 2,
    Snappy = 3,
}

impl TryFrom<u8> for CompressionType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Brotli),
            2 => Ok(CompressionType::Zstd),
            3 => Ok(CompressionType::Snappy),
            _ => Err(Error::data_loss(format!(
                "unknown compression type byte: 0x{value:02x}"
            ))),
        }
    }
}
