//! Chunk Payload Compression
//!
//! One compressor interface over the format's codec set. A compressed
//! stream is prefixed with a varint carrying the exact decompressed size,
//! which the decompressor verifies; an uncompressed stream is passed
//! through untouched (the size is implied by the chunk header).
//!
//! Levels use each codec's native scale. `window_log` maps to brotli's
//! `lgwin` and zstd's window log; snappy ignores both.

use std::io::Write as _;

use riegeli_core::{varint, Chain, Error, Result};

use crate::types::CompressionType;

/// Brotli quality used when the caller does not pick one.
const DEFAULT_BROTLI_LEVEL: i32 = 6;
/// Brotli window size (lgwin) used when `window_log` is not set.
const DEFAULT_BROTLI_WINDOW_LOG: u32 = 22;
/// Zstd level used when the caller does not pick one.
const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Compression choice for chunk payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompressorOptions {
    pub kind: CompressionType,
    /// Codec-native level; `None` picks the codec default.
    pub level: Option<i32>,
    /// Window size as a log2; brotli `lgwin` / zstd window log.
    pub window_log: Option<u32>,
}

impl Default for CompressorOptions {
    fn default() -> Self {
        Self {
            kind: CompressionType::default(),
            level: None,
            window_log: None,
        }
    }
}

impl CompressorOptions {
    pub fn uncompressed() -> Self {
        Self {
            kind: CompressionType::None,
            level: None,
            window_log: None,
        }
    }

    pub fn with_kind(kind: CompressionType) -> Self {
        Self {
            kind,
            level: None,
            window_log: None,
        }
    }
}

/// Compresses chunk payload streams according to fixed options.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compressor {
    options: CompressorOptions,
}

impl Compressor {
    pub fn new(options: CompressorOptions) -> Self {
        Self { options }
    }

    pub fn kind(&self) -> CompressionType {
        self.options.kind
    }

    /// Compresses `data`, returning the stream to place after the
    /// compression-type byte.
    pub fn compress(&self, data: &Chain) -> Result<Chain> {
        match self.options.kind {
            CompressionType::None => Ok(data.clone()),
            kind => {
                let mut out = Vec::with_capacity(data.len() / 2 + varint::MAX_LEN_U64);
                varint::write_u64(&mut out, data.len() as u64);
                match kind {
                    CompressionType::None => unreachable!(),
                    CompressionType::Brotli => self.compress_brotli(data, &mut out)?,
                    CompressionType::Zstd => self.compress_zstd(data, &mut out)?,
                    CompressionType::Snappy => self.compress_snappy(data, &mut out)?,
                }
                Ok(Chain::from(out))
            }
        }
    }

    fn compress_brotli(&self, data: &Chain, out: &mut Vec<u8>) -> Result<()> {
        let quality = self.options.level.unwrap_or(DEFAULT_BROTLI_LEVEL).max(0) as u32;
        let lgwin = self.options.window_log.unwrap_or(DEFAULT_BROTLI_WINDOW_LOG);
        let mut encoder = brotli::CompressorWriter::new(out, 4096, quality, lgwin);
        for block in data.blocks() {
            encoder.write_all(block)?;
        }
        encoder.flush()?;
        Ok(())
    }

    fn compress_zstd(&self, data: &Chain, out: &mut Vec<u8>) -> Result<()> {
        let level = self.options.level.unwrap_or(DEFAULT_ZSTD_LEVEL);
        let mut encoder = zstd::stream::write::Encoder::new(out, level)
            .map_err(|e| Error::internal(format!("zstd encoder init: {e}")))?;
        if let Some(window_log) = self.options.window_log {
            encoder
                .set_parameter(zstd::stream::raw::CParameter::WindowLog(window_log))
                .map_err(|e| Error::internal(format!("zstd window log {window_log}: {e}")))?;
        }
        for block in data.blocks() {
            encoder.write_all(block)?;
        }
        encoder
            .finish()
            .map_err(|e| Error::internal(format!("zstd finish: {e}")))?;
        Ok(())
    }

    fn compress_snappy(&self, data: &Chain, out: &mut Vec<u8>) -> Result<()> {
        let mut encoder = snap::write::FrameEncoder::new(out);
        for block in data.blocks() {
            encoder.write_all(block)?;
        }
        encoder
            .into_inner()
            .map_err(|e| Error::internal(format!("snappy finish: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompressor;
    use bytes::Buf as _;

    fn roundtrip(kind: CompressionType, payload: &[u8]) {
        let compressor = Compressor::new(CompressorOptions::with_kind(kind));
        let compressed = compressor.compress(&Chain::from(payload)).unwrap();
        let restored =
            decompressor::decompress_fully(kind, &compressed.to_bytes(), 0).unwrap();
        assert_eq!(restored.as_ref(), payload, "codec {kind:?}");
    }

    #[test]
    fn test_none_passthrough() {
        let compressor = Compressor::new(CompressorOptions::uncompressed());
        let data = Chain::from(&b"as-is"[..]);
        assert_eq!(compressor.compress(&data).unwrap(), data);
    }

    #[test]
    fn test_roundtrip_all_codecs() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        for kind in [
            CompressionType::Brotli,
            CompressionType::Zstd,
            CompressionType::Snappy,
        ] {
            roundtrip(kind, &payload);
            roundtrip(kind, b"");
            roundtrip(kind, b"x");
        }
    }

    #[test]
    fn test_size_prefix_present() {
        let compressor = Compressor::new(CompressorOptions::with_kind(CompressionType::Zstd));
        let payload = vec![7u8; 300];
        let compressed = compressor.compress(&Chain::from(&payload[..])).unwrap();
        let flat = compressed.to_bytes();
        let mut cursor = flat.as_ref();
        assert_eq!(varint::read_u64(&mut cursor), Some(300));
        assert!(cursor.has_remaining());
    }

    #[test]
    fn test_repetitive_data_shrinks() {
        let payload = vec![42u8; 100_000];
        for kind in [
            CompressionType::Brotli,
            CompressionType::Zstd,
            CompressionType::Snappy,
        ] {
            let compressor = Compressor::new(CompressorOptions::with_kind(kind));
            let compressed = compressor.compress(&Chain::from(&payload[..])).unwrap();
            assert!(
                compressed.len() < payload.len() / 10,
                "{kind:?} produced {} bytes",
                compressed.len()
            );
        }
    }

    #[test]
    fn test_window_log_option() {
        let options = CompressorOptions {
            kind: CompressionType::Brotli,
            level: Some(9),
            window_log: Some(18),
        };
        let compressor = Compressor::new(options);
        let payload = vec![1u8; 50_000];
        let compressed = compressor.compress(&Chain::from(&payload[..])).unwrap();
        let restored = decompressor::decompress_fully(
            CompressionType::Brotli,
            &compressed.to_bytes(),
            0,
        )
        .unwrap();
        assert_eq!(restored.len(), payload.len());
    }
}
