//! Chunk Payload Decompression
//!
//! The inverse of [`Compressor`](crate::compressor::Compressor): a
//! variant over the codec set, constructed from the compression-type
//! byte, reading from an in-memory chunk payload. For compressed streams
//! the leading varint declares the exact decompressed size.
//!
//! Verification on close is two separate checks, and both must hold:
//! the decompressed output reached exactly its logical end (the declared
//! size, with nothing further to read), and the compressed input was
//! fully consumed by the codec. The second check matters on its own:
//! chunk hashes cover whatever bytes the writer put in the payload, so a
//! hash-valid payload can still carry trailing bytes after the codec's
//! own frame end, and the codec would silently stop short of them. Each
//! failure is `DataLoss`.
//!
//! The chunk payload is always fully in memory by the time it is
//! decompressed (the framing layer must read it to verify the data hash),
//! so a codec read error can only mean corruption, never an I/O fault.

use std::cell::Cell;
use std::io::{self, Read};
use std::rc::Rc;

use bytes::Bytes;
use riegeli_core::{varint, Error, Result};

use crate::types::CompressionType;

/// Feeds the compressed slice to a codec while mirroring how far into
/// the slice the codec has read.
///
/// `step` caps how many bytes one `read` call hands out. Brotli and zstd
/// get one byte per call, so their internal buffers never hold input
/// past their own frame end and the mirrored count lands exactly on the
/// frame boundary. Snappy framing reads its source to the end (or
/// errors), so it gets whole chunks.
struct TrackedSource<'a> {
    data: &'a [u8],
    at: usize,
    consumed: Rc<Cell<usize>>,
    step: usize,
}

impl<'a> TrackedSource<'a> {
    fn new(data: &'a [u8], consumed: Rc<Cell<usize>>, step: usize) -> Self {
        Self {
            data,
            at: 0,
            consumed,
            step,
        }
    }
}

impl io::Read for TrackedSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let take = buf.len().min(self.step).min(self.data.len() - self.at);
        buf[..take].copy_from_slice(&self.data[self.at..self.at + take]);
        self.at += take;
        self.consumed.set(self.at);
        Ok(take)
    }
}

/// Streaming decompressor over an in-memory compressed payload.
pub struct Decompressor<'a> {
    inner: Inner<'a>,
    /// Declared decompressed size; `None` for an uncompressed stream.
    declared_size: Option<u64>,
    produced: u64,
    /// Length of the input handed to the codec (size prefix excluded).
    input_len: usize,
    /// Bytes of that input the codec has taken so far.
    input_consumed: Rc<Cell<usize>>,
}

enum Inner<'a> {
    None(TrackedSource<'a>),
    Brotli(brotli::Decompressor<TrackedSource<'a>>),
    Zstd(zstd::stream::read::Decoder<'static, io::BufReader<TrackedSource<'a>>>),
    Snappy(snap::read::FrameDecoder<TrackedSource<'a>>),
}

impl<'a> Decompressor<'a> {
    /// Opens `data` (the stream after the compression-type byte).
    ///
    /// `pos` is the file position of the enclosing chunk, used in error
    /// messages.
    pub fn new(kind: CompressionType, mut data: &'a [u8], pos: u64) -> Result<Self> {
        let consumed = Rc::new(Cell::new(0));
        if kind == CompressionType::None {
            let source = TrackedSource::new(data, consumed.clone(), data.len().max(1));
            return Ok(Self {
                inner: Inner::None(source),
                declared_size: None,
                produced: 0,
                input_len: data.len(),
                input_consumed: consumed,
            });
        }
        let declared = varint::read_u64(&mut data).ok_or_else(|| {
            Error::data_loss(format!(
                "truncated decompressed-size prefix in chunk at {pos}"
            ))
        })?;
        let inner = match kind {
            CompressionType::None => unreachable!(),
            CompressionType::Brotli => Inner::Brotli(brotli::Decompressor::new(
                TrackedSource::new(data, consumed.clone(), 1),
                4096,
            )),
            CompressionType::Zstd => Inner::Zstd(
                zstd::stream::read::Decoder::new(TrackedSource::new(data, consumed.clone(), 1))
                    .map_err(|e| Error::data_loss(format!("bad zstd stream at {pos}: {e}")))?
                    .single_frame(),
            ),
            CompressionType::Snappy => Inner::Snappy(snap::read::FrameDecoder::new(
                TrackedSource::new(data, consumed.clone(), data.len().max(1)),
            )),
        };
        Ok(Self {
            inner,
            declared_size: Some(declared),
            produced: 0,
            input_len: data.len(),
            input_consumed: consumed,
        })
    }

    /// The decompressed size if the stream declares one.
    pub fn declared_size(&self) -> Option<u64> {
        self.declared_size
    }

    /// Input bytes the codec has left untouched.
    fn input_remaining(&self) -> usize {
        self.input_len - self.input_consumed.get()
    }

    /// Verifies both end conditions: the decompressed output is exactly
    /// at its logical end, and the compressed input was fully consumed.
    pub fn verify_end(mut self, pos: u64) -> Result<()> {
        let mut probe = [0u8; 1];
        let extra = self
            .read(&mut probe)
            .map_err(|e| Error::data_loss(format!("corrupt chunk payload at {pos}: {e}")))?;
        if extra != 0 {
            return Err(Error::data_loss(format!(
                "chunk payload at {pos} has data past its logical end"
            )));
        }
        if let Some(declared) = self.declared_size {
            if self.produced != declared {
                return Err(Error::data_loss(format!(
                    "chunk payload at {pos} decompressed to {} bytes, declared {}",
                    self.produced, declared
                )));
            }
        }
        let trailing = self.input_remaining();
        if trailing != 0 {
            return Err(Error::data_loss(format!(
                "chunk payload at {pos} has {trailing} bytes after the compressed stream"
            )));
        }
        Ok(())
    }
}

impl io::Read for Decompressor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.inner {
            Inner::None(inner) => inner.read(buf)?,
            Inner::Brotli(inner) => inner.read(buf)?,
            Inner::Zstd(inner) => inner.read(buf)?,
            Inner::Snappy(inner) => inner.read(buf)?,
        };
        self.produced += n as u64;
        Ok(n)
    }
}

/// Decompresses a whole payload stream and verifies its end: exact
/// declared output size and a fully consumed input.
///
/// Any codec failure or mismatch on either side is `DataLoss` naming
/// `pos`.
pub fn decompress_fully(kind: CompressionType, data: &[u8], pos: u64) -> Result<Bytes> {
    let mut decompressor = Decompressor::new(kind, data, pos)?;
    let capacity = decompressor
        .declared_size()
        .unwrap_or(data.len() as u64)
        .min(1 << 20) as usize;
    let mut out = Vec::with_capacity(capacity);
    decompressor
        .read_to_end(&mut out)
        .map_err(|e| Error::data_loss(format!("corrupt chunk payload at {pos}: {e}")))?;
    if let Some(declared) = decompressor.declared_size() {
        if out.len() as u64 != declared {
            return Err(Error::data_loss(format!(
                "chunk payload at {pos} decompressed to {} bytes, declared {declared}",
                out.len()
            )));
        }
    }
    let trailing = decompressor.input_remaining();
    if trailing != 0 {
        return Err(Error::data_loss(format!(
            "chunk payload at {pos} has {trailing} bytes after the compressed stream"
        )));
    }
    Ok(Bytes::from(out))
}
