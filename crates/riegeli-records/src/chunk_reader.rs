//! Chunk Reading over Block Framing
//!
//! [`ChunkReader`] reassembles chunks from a byte source: it skips and
//! validates the block headers interposed at every 64 KiB boundary,
//! verifies both chunk hashes, and keeps enough state to recover when
//! verification fails.
//!
//! ## Recovery modes
//!
//! Failures put the reader into one of two recoverable states:
//!
//! - **have-chunk**: the chunk header verified, so the chunk's physical
//!   end is known. Recovery skips exactly to it (clamped to file size,
//!   which also absorbs truncated files).
//! - **find-chunk**: the header itself is unusable. Recovery walks
//!   forward one block boundary at a time and uses the boundary's
//!   `previous_chunk`/`next_chunk` distances to land on the next chunk
//!   begin, ignoring boundaries whose headers are themselves damaged.
//!
//! One [`recover`](ChunkReader::recover) call performs one hop and
//! reports the skipped byte range; if the next chunk is also damaged the
//! next read fails again and the caller decides once more.

use riegeli_core::{Chain, Error, Reader, Result};
use riegeli_chunk::{Chunk, ChunkHeader, ChunkType, CHUNK_HEADER_SIZE};

use crate::block::{self, BlockHeader};
use crate::position::SkippedRegion;

enum Recoverable {
    None,
    /// Header verified; the chunk's end is known.
    HaveChunk { begin: u64, end: u64 },
    /// Header unusable; scan block boundaries.
    FindChunk { begin: u64 },
}

/// Reads chunks from a byte source with block-header validation.
pub struct ChunkReader<R: Reader> {
    src: R,
    /// Begin position of the chunk at the current read position.
    chunk_begin: u64,
    /// Header parsed ahead of its payload, position already past it.
    peeked: Option<ChunkHeader>,
    recoverable: Recoverable,
}

impl<R: Reader> ChunkReader<R> {
    pub fn new(src: R) -> Self {
        let chunk_begin = src.pos();
        Self {
            src,
            chunk_begin,
            peeked: None,
            recoverable: Recoverable::None,
        }
    }

    /// Begin position of the current chunk; after a successful
    /// [`read_chunk`](Self::read_chunk) this is the next chunk's begin.
    pub fn pos(&self) -> u64 {
        self.chunk_begin
    }

    pub fn size(&mut self) -> Result<u64> {
        self.src.size()
    }

    pub fn into_src(self) -> R {
        self.src
    }

    /// Verifies that the file begins with a well-formed file-signature
    /// chunk. `Ok(false)` on an empty source.
    ///
    /// Valid only while positioned at the beginning of the file.
    pub fn check_file_format(&mut self) -> Result<bool> {
        if self.chunk_begin != 0 {
            return Err(Error::invalid_argument(
                "check_file_format requires the reader at the beginning of the file",
            ));
        }
        let Some(header) = self.pull_chunk_header()? else {
            return Ok(false);
        };
        if header.chunk_type != ChunkType::FileSignature
            || header.data_size != 0
            || header.num_records != 0
            || header.decoded_data_size != 0
        {
            self.recoverable = Recoverable::FindChunk { begin: 0 };
            return Err(Error::data_loss(
                "file does not begin with a file signature chunk",
            ));
        }
        Ok(true)
    }

    /// Reads and verifies the chunk header at the current position
    /// without consuming the payload. `Ok(None)` at clean end of file.
    pub fn pull_chunk_header(&mut self) -> Result<Option<ChunkHeader>> {
        if let Some(header) = self.peeked {
            return Ok(Some(header));
        }
        let begin = self.chunk_begin;
        if begin >= self.src.size()? {
            return Ok(None);
        }
        let mut buf = Vec::with_capacity(CHUNK_HEADER_SIZE as usize);
        let complete = self
            .read_framed(CHUNK_HEADER_SIZE as usize, begin, None, &mut buf)
            .map_err(|e| {
                self.recoverable = Recoverable::FindChunk { begin };
                e
            })?;
        if !complete {
            self.recoverable = Recoverable::FindChunk { begin };
            return Err(Error::data_loss(format!(
                "truncated chunk header at {begin}"
            )));
        }
        match ChunkHeader::decode(&buf, begin) {
            Ok(header) => {
                self.peeked = Some(header);
                Ok(Some(header))
            }
            Err(e) => {
                tracing::warn!(begin, "chunk header failed verification");
                self.recoverable = Recoverable::FindChunk { begin };
                Err(e)
            }
        }
    }

    /// Reads the chunk at the current position, verifying both hashes.
    /// `Ok(None)` at clean end of file.
    pub fn read_chunk(&mut self) -> Result<Option<Chunk>> {
        let begin = self.chunk_begin;
        let Some(header) = self.pull_chunk_header()? else {
            return Ok(None);
        };
        let end = block::chunk_end(begin, CHUNK_HEADER_SIZE + header.data_size);
        let mut data = Vec::with_capacity((header.data_size).min(1 << 20) as usize);
        let complete = self
            .read_framed(header.data_size as usize, begin, Some(end), &mut data)
            .map_err(|e| self.fail_with_chunk(begin, end, e))?;
        if !complete {
            return Err(self.fail_with_chunk(
                begin,
                end,
                Error::data_loss(format!("truncated chunk at {begin}")),
            ));
        }
        let data = Chain::from(data);
        if let Err(e) = header.verify_data(&data, begin) {
            tracing::warn!(begin, "chunk data failed verification");
            return Err(self.fail_with_chunk(begin, end, e));
        }
        self.peeked = None;
        self.chunk_begin = end;
        Ok(Some(Chunk { header, data }))
    }

    /// Positions the reader at `new_pos`, which the caller asserts is a
    /// chunk begin (or end of file). Clears any recoverable state.
    pub fn seek(&mut self, new_pos: u64) -> Result<()> {
        self.peeked = None;
        self.recoverable = Recoverable::None;
        self.src.seek(new_pos)?;
        self.chunk_begin = self.src.pos();
        Ok(())
    }

    /// Positions the reader at the begin of the chunk whose byte range
    /// contains `target` (clamped to the file size).
    ///
    /// Jumps to the containing block's header, follows `previous_chunk`
    /// back to a chunk boundary, then walks forward chunk by chunk
    /// reading only headers.
    pub fn seek_to_chunk_containing(&mut self, target: u64) -> Result<()> {
        let size = self.src.size()?;
        let target = target.min(size);
        let mut begin = if target < block::BLOCK_SIZE {
            0
        } else {
            let boundary = block::block_begin(target);
            let header = self.read_block_header_at(boundary).map_err(|e| {
                self.recoverable = Recoverable::FindChunk { begin: boundary };
                e
            })?;
            if header.previous_chunk > boundary {
                self.recoverable = Recoverable::FindChunk { begin: boundary };
                return Err(Error::data_loss(format!(
                    "block header at {boundary} points before the file start"
                )));
            }
            boundary - header.previous_chunk
        };
        loop {
            self.seek(begin)?;
            let Some(header) = self.pull_chunk_header()? else {
                return Ok(());
            };
            let end = block::chunk_end(begin, CHUNK_HEADER_SIZE + header.data_size);
            if target < end {
                // Found it; normalize the position back to the begin.
                return self.seek(begin);
            }
            begin = end;
        }
    }

    /// Skips past the damage recorded by the last failure. Returns the
    /// skipped region, or `None` when there is nothing to recover from.
    pub fn recover(&mut self) -> Result<Option<SkippedRegion>> {
        match std::mem::replace(&mut self.recoverable, Recoverable::None) {
            Recoverable::None => Ok(None),
            Recoverable::HaveChunk { begin, end } => {
                let size = self.src.size()?;
                let target = end.min(size);
                self.seek(target)?;
                tracing::debug!(begin, target, "skipped damaged chunk");
                Ok(Some(SkippedRegion::new(begin, target)))
            }
            Recoverable::FindChunk { begin } => {
                let size = self.src.size()?;
                let mut boundary = block::next_block_begin(begin);
                loop {
                    if boundary >= size {
                        self.seek(size)?;
                        return Ok(Some(SkippedRegion::new(begin, size)));
                    }
                    match self.read_block_header_at(boundary) {
                        Err(_) => {
                            boundary += block::BLOCK_SIZE;
                        }
                        Ok(header) => {
                            let target = if header.previous_chunk == 0 {
                                boundary
                            } else {
                                boundary + header.next_chunk
                            };
                            if (header.previous_chunk != 0 && header.next_chunk == 0)
                                || target <= begin
                                || target > size
                            {
                                // Implausible distances; keep scanning.
                                boundary += block::BLOCK_SIZE;
                                continue;
                            }
                            self.seek(target)?;
                            tracing::debug!(begin, target, "resynchronized at block boundary");
                            return Ok(Some(SkippedRegion::new(begin, target)));
                        }
                    }
                }
            }
        }
    }

    fn fail_with_chunk(&mut self, begin: u64, end: u64, error: Error) -> Error {
        self.peeked = None;
        self.recoverable = Recoverable::HaveChunk { begin, end };
        error
    }

    /// Reads `len` chunk bytes from the current source position,
    /// validating and skipping interposed block headers. `Ok(false)` if
    /// the source ends first.
    fn read_framed(
        &mut self,
        len: usize,
        chunk_begin: u64,
        chunk_end: Option<u64>,
        out: &mut Vec<u8>,
    ) -> Result<bool> {
        let target = out.len() + len;
        while out.len() < target {
            let pos = self.src.pos();
            if block::is_block_boundary(pos) {
                if !self.src.pull(block::BLOCK_HEADER_SIZE as usize)? {
                    return Ok(false);
                }
                let header = BlockHeader::decode(self.src.available(), pos)?;
                if header.previous_chunk != pos - chunk_begin {
                    return Err(Error::data_loss(format!(
                        "block header at {pos} disagrees with chunk at {chunk_begin}"
                    )));
                }
                if let Some(end) = chunk_end {
                    if header.next_chunk != end - pos {
                        return Err(Error::data_loss(format!(
                            "block header at {pos} disagrees with chunk end {end}"
                        )));
                    }
                }
                self.src.advance(block::BLOCK_HEADER_SIZE as usize);
            }
            let room = (block::next_block_begin(self.src.pos()) - self.src.pos()) as usize;
            let take = room.min(target - out.len());
            if !self.src.read_slice(take, out)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Reads and verifies the block header at `boundary` without
    /// changing the logical position.
    fn read_block_header_at(&mut self, boundary: u64) -> Result<BlockHeader> {
        self.src.seek(boundary)?;
        if !self.src.pull(block::BLOCK_HEADER_SIZE as usize)? {
            return Err(Error::data_loss(format!(
                "truncated block header at {boundary}"
            )));
        }
        BlockHeader::decode(self.src.available(), boundary)
    }
}
