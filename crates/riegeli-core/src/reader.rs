//! Byte Stream Reading
//!
//! The [`Reader`] trait is the pull protocol used by every decoding layer:
//! `pull(min_length)` makes at least `min_length` contiguous bytes visible
//! through [`available`](Reader::available), and [`advance`](Reader::advance)
//! moves the cursor past consumed bytes. Only source failures are errors;
//! running out of data is the `Ok(false)` return of `pull`, so clean EOF
//! and corruption stay distinguishable.
//!
//! ## Implementations
//!
//! - [`BytesReader`]: a flat in-memory buffer; `pull` never copies.
//! - [`ChainReader`]: reads a [`Chain`]; a pull spanning a block seam
//!   assembles the requested bytes into an internal scratch buffer (the
//!   slow path), everything else is a direct view into the blocks.
//! - [`IoReader`]: buffered reading from any `io::Read + io::Seek` source,
//!   typically `std::fs::File`.
//!
//! Slices returned by `available` stay valid until the next call that
//! takes `&mut self`; readers never hand out pointers into freed buffers.

use std::io;

use bytes::Bytes;

use crate::chain::Chain;
use crate::error::Result;

/// Buffer size for [`IoReader`] refills.
const IO_BUFFER_SIZE: usize = 1 << 16;

/// Cursor-based pull protocol over a byte source.
pub trait Reader {
    /// Current logical position in the stream.
    fn pos(&self) -> u64;

    /// Makes at least `min_length` contiguous bytes available at the
    /// cursor.
    ///
    /// Returns `Ok(false)` if the source ends before `min_length` bytes:
    /// a healthy EOF condition, not an error.
    fn pull(&mut self, min_length: usize) -> Result<bool>;

    /// The bytes currently visible at the cursor.
    fn available(&self) -> &[u8];

    /// Advances the cursor past `n` available bytes.
    fn advance(&mut self, n: usize);

    /// Repositions the cursor, clamping to the source size.
    fn seek(&mut self, new_pos: u64) -> Result<()>;

    /// Total size of the source in bytes.
    fn size(&mut self) -> Result<u64>;

    /// Reads exactly `len` bytes into `dst`.
    ///
    /// Returns `Ok(false)` when the source ends first; bytes read up to
    /// that point have been consumed and appended.
    fn read_slice(&mut self, mut len: usize, dst: &mut Vec<u8>) -> Result<bool> {
        while len > 0 {
            if !self.pull(1)? {
                return Ok(false);
            }
            let take = self.available().len().min(len);
            dst.extend_from_slice(&self.available()[..take]);
            self.advance(take);
            len -= take;
        }
        Ok(true)
    }

    /// Skips exactly `len` bytes. `Ok(false)` when the source ends first.
    fn skip(&mut self, mut len: usize) -> Result<bool> {
        while len > 0 {
            if !self.pull(1)? {
                return Ok(false);
            }
            let take = self.available().len().min(len);
            self.advance(take);
            len -= take;
        }
        Ok(true)
    }
}

/// Reads from a flat shared buffer.
#[derive(Debug, Clone)]
pub struct BytesReader {
    data: Bytes,
    cursor: usize,
}

impl BytesReader {
    pub fn new(data: Bytes) -> Self {
        Self { data, cursor: 0 }
    }
}

impl Reader for BytesReader {
    fn pos(&self) -> u64 {
        self.cursor as u64
    }

    fn pull(&mut self, min_length: usize) -> Result<bool> {
        Ok(self.data.len() - self.cursor >= min_length)
    }

    fn available(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        debug_assert!(self.cursor + n <= self.data.len());
        self.cursor += n;
    }

    fn seek(&mut self, new_pos: u64) -> Result<()> {
        self.cursor = (new_pos as usize).min(self.data.len());
        Ok(())
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

/// Reads a [`Chain`] without flattening it.
pub struct ChainReader {
    blocks: Vec<Bytes>,
    /// Cumulative start offset of each block.
    starts: Vec<u64>,
    len: u64,
    pos: u64,
    /// Assembled bytes for pulls that span a block seam.
    scratch: Vec<u8>,
    scratch_start: u64,
}

impl ChainReader {
    pub fn new(chain: &Chain) -> Self {
        let blocks = chain.share_blocks();
        let mut starts = Vec::with_capacity(blocks.len());
        let mut len = 0u64;
        for block in &blocks {
            starts.push(len);
            len += block.len() as u64;
        }
        Self {
            blocks,
            starts,
            len,
            pos: 0,
            scratch: Vec::new(),
            scratch_start: u64::MAX,
        }
    }

    /// Index of the block containing `pos`, assuming `pos < len`.
    fn block_at(&self, pos: u64) -> usize {
        match self.starts.binary_search(&pos) {
            Ok(index) => index,
            Err(index) => index - 1,
        }
    }

    fn scratch_covers(&self, min_length: usize) -> bool {
        self.pos >= self.scratch_start
            && self.scratch_start + self.scratch.len() as u64
                >= self.pos + min_length as u64
    }
}

impl Reader for ChainReader {
    fn pos(&self) -> u64 {
        self.pos
    }

    fn pull(&mut self, min_length: usize) -> Result<bool> {
        if self.len - self.pos < min_length as u64 {
            return Ok(false);
        }
        if min_length == 0 || self.scratch_covers(min_length) {
            return Ok(true);
        }
        let index = self.block_at(self.pos);
        let in_block = self.starts[index] + self.blocks[index].len() as u64 - self.pos;
        if in_block >= min_length as u64 {
            return Ok(true);
        }
        // Slow path: assemble the requested span across block seams.
        self.scratch.clear();
        self.scratch_start = self.pos;
        let mut index = index;
        let mut offset = (self.pos - self.starts[index]) as usize;
        while self.scratch.len() < min_length {
            let block = &self.blocks[index];
            self.scratch.extend_from_slice(&block[offset..]);
            offset = 0;
            index += 1;
        }
        Ok(true)
    }

    fn available(&self) -> &[u8] {
        if self.pos >= self.scratch_start
            && self.pos < self.scratch_start + self.scratch.len() as u64
        {
            return &self.scratch[(self.pos - self.scratch_start) as usize..];
        }
        if self.pos >= self.len {
            return &[];
        }
        let index = self.block_at(self.pos);
        &self.blocks[index][(self.pos - self.starts[index]) as usize..]
    }

    fn advance(&mut self, n: usize) {
        debug_assert!(self.pos + n as u64 <= self.len);
        self.pos += n as u64;
    }

    fn seek(&mut self, new_pos: u64) -> Result<()> {
        self.pos = new_pos.min(self.len);
        Ok(())
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.len)
    }
}

/// Buffered reading from an `io::Read + io::Seek` source.
pub struct IoReader<R: io::Read + io::Seek> {
    inner: R,
    buffer: Vec<u8>,
    /// Source position of `buffer[0]`.
    buffer_start: u64,
    pos: u64,
    size: Option<u64>,
}

impl<R: io::Read + io::Seek> IoReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            buffer_start: 0,
            pos: 0,
            size: None,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn buffered(&self) -> u64 {
        if self.pos >= self.buffer_start
            && self.pos <= self.buffer_start + self.buffer.len() as u64
        {
            self.buffer_start + self.buffer.len() as u64 - self.pos
        } else {
            0
        }
    }

    fn fill(&mut self, min_length: usize) -> Result<bool> {
        self.inner.seek(io::SeekFrom::Start(self.pos))?;
        self.buffer.clear();
        self.buffer_start = self.pos;
        let target = min_length.max(IO_BUFFER_SIZE);
        let mut chunk = [0u8; 8192];
        while self.buffer.len() < target {
            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
        Ok(self.buffer.len() >= min_length)
    }
}

impl<R: io::Read + io::Seek> Reader for IoReader<R> {
    fn pos(&self) -> u64 {
        self.pos
    }

    fn pull(&mut self, min_length: usize) -> Result<bool> {
        if self.buffered() >= min_length as u64 {
            return Ok(true);
        }
        self.fill(min_length)
    }

    fn available(&self) -> &[u8] {
        if self.pos >= self.buffer_start
            && self.pos < self.buffer_start + self.buffer.len() as u64
        {
            &self.buffer[(self.pos - self.buffer_start) as usize..]
        } else {
            &[]
        }
    }

    fn advance(&mut self, n: usize) {
        debug_assert!(n as u64 <= self.buffered());
        self.pos += n as u64;
    }

    fn seek(&mut self, new_pos: u64) -> Result<()> {
        let size = self.size()?;
        self.pos = new_pos.min(size);
        Ok(())
    }

    fn size(&mut self) -> Result<u64> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        let size = self.inner.seek(io::SeekFrom::End(0))?;
        self.size = Some(size);
        Ok(size)
    }
}
