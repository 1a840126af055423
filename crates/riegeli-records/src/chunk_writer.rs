//! Chunk Writing over Block Framing
//!
//! [`ChunkWriter`] streams finished chunks to a destination, inserting a
//! block header at every 64 KiB boundary the chunk covers. The header
//! distances are exact because a chunk's physical extent is known before
//! its first byte is written.
//!
//! Padding chunks bring the file to a block boundary on request; when the
//! remaining gap cannot hold even a chunk header, the padding extends to
//! the boundary after next.

use riegeli_core::{Result, Writer};
use riegeli_chunk::{Chunk, CHUNK_HEADER_SIZE};

use crate::block::{self, BlockHeader};

/// Writes chunks to `dest`, maintaining the block-header invariant.
pub struct ChunkWriter<W: Writer> {
    dest: W,
}

impl<W: Writer> ChunkWriter<W> {
    /// Starts at the beginning of a file; `dest` must be at position 0.
    pub fn new(dest: W) -> Self {
        debug_assert_eq!(dest.pos(), 0);
        Self { dest }
    }

    /// The position the next chunk will begin at.
    pub fn pos(&self) -> u64 {
        self.dest.pos()
    }

    /// Writes one chunk, block headers included.
    pub fn write_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        let begin = self.dest.pos();
        let end = block::chunk_end(begin, chunk.size());
        self.write_framed(&chunk.header.encode(), begin, end)?;
        for slice in chunk.data.blocks() {
            self.write_framed(slice, begin, end)?;
        }
        debug_assert_eq!(self.dest.pos(), end);
        Ok(())
    }

    /// Emits a padding chunk ending exactly on a block boundary.
    ///
    /// No-op when already aligned. A gap smaller than a chunk header
    /// forces the padding through to the boundary after next.
    pub fn pad_to_block_boundary(&mut self) -> Result<()> {
        let pos = self.dest.pos();
        if block::is_block_boundary(pos) {
            return Ok(());
        }
        let gap = block::next_block_begin(pos) - pos;
        let data_size = if gap >= CHUNK_HEADER_SIZE {
            gap - CHUNK_HEADER_SIZE
        } else {
            gap + block::USABLE_BLOCK_SIZE - CHUNK_HEADER_SIZE
        };
        tracing::debug!(pos, data_size, "padding to block boundary");
        self.write_chunk(&Chunk::padding(data_size))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.dest.flush()
    }

    pub fn into_dest(self) -> W {
        self.dest
    }

    /// Writes chunk bytes, overlaying block headers at boundaries.
    fn write_framed(&mut self, mut data: &[u8], chunk_begin: u64, chunk_end: u64) -> Result<()> {
        while !data.is_empty() {
            let pos = self.dest.pos();
            if block::is_block_boundary(pos) {
                let header = BlockHeader {
                    previous_chunk: pos - chunk_begin,
                    next_chunk: chunk_end - pos,
                };
                self.dest.write_slice(&header.encode())?;
            }
            let room = (block::BLOCK_SIZE - self.dest.pos() % block::BLOCK_SIZE) as usize;
            let take = room.min(data.len());
            self.dest.write_slice(&data[..take])?;
            data = &data[take..];
        }
        Ok(())
    }
}
