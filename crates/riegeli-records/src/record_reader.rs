//! Record Reading
//!
//! [`RecordReader`] drives a [`ChunkReader`] and a chunk decoder and
//! exposes records one at a time, with stable positions, seeking by
//! position or by byte offset, and explicit recovery from damaged
//! regions.
//!
//! ## Positions
//!
//! While the current chunk still has pending records, the reader is at
//! `(chunk_begin, record_index)`; once the chunk is exhausted it is at
//! `(next_chunk_begin, 0)`. Seeking to a position with record index 0
//! never reads the chunk body, which also makes seeking to the end of
//! file cheap and valid.
//!
//! ## Failure and recovery
//!
//! A failed read leaves the reader unhealthy with a [`Recoverable`] flag
//! naming the failed layer: the chunk reader (bad hashes, truncation) or
//! the chunk decoder (bad payload under valid hashes). The caller
//! decides: [`recover`](RecordReader::recover) consumes the flag, skips
//! the damage, reports the [`SkippedRegion`], and the reader is healthy
//! again. A `recovery` callback in the options makes
//! [`read_record`](RecordReader::read_record) do this automatically.
//!
//! Source-level I/O errors are not recoverable here; the byte source
//! itself must be repaired first.

use std::fmt;

use bytes::Bytes;

use riegeli_chunk::{ChunkDecoder, ChunkType, FieldProjection};
use riegeli_core::{Error, Reader, Result};

use crate::chunk_reader::ChunkReader;
use crate::metadata::{self, RecordsMetadata};
use crate::position::{RecordPosition, SkippedRegion};

/// Which substate a failed reader can recover by skipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recoverable {
    #[default]
    None,
    /// Chunk framing failed: bad hashes, truncation, lost sync.
    ChunkReader,
    /// Chunk payload failed to decode under valid checksums.
    ChunkDecoder,
}

/// Invoked with each skipped region when automatic recovery is on.
pub type RecoveryFn = Box<dyn FnMut(&SkippedRegion) + Send>;

#[derive(Default)]
pub struct RecordReaderOptions {
    /// Which field paths transposed chunks materialize.
    pub field_projection: FieldProjection,
    /// When set, recoverable failures are skipped automatically and
    /// reported through this callback.
    pub recovery: Option<RecoveryFn>,
}

impl fmt::Debug for RecordReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordReaderOptions")
            .field("field_projection", &self.field_projection)
            .field("recovery", &self.recovery.as_ref().map(|_| "fn"))
            .finish()
    }
}

/// Reads records from a container file.
pub struct RecordReader<R: Reader> {
    src: ChunkReader<R>,
    /// Begin offset of the chunk currently decoded.
    chunk_begin: u64,
    decoder: ChunkDecoder,
    recoverable: Recoverable,
    recovery: Option<RecoveryFn>,
}

impl<R: Reader> RecordReader<R> {
    pub fn new(src: R, options: RecordReaderOptions) -> Self {
        let src = ChunkReader::new(src);
        let chunk_begin = src.pos();
        Self {
            src,
            chunk_begin,
            decoder: ChunkDecoder::new(options.field_projection),
            recoverable: Recoverable::None,
            recovery: options.recovery,
        }
    }

    /// Fails while a recoverable error is pending; only
    /// [`recover`](Self::recover) restores the reader.
    fn check_healthy(&self) -> Result<()> {
        if self.recoverable != Recoverable::None {
            return Err(Error::invalid_argument(
                "record reader failed earlier; recover it first",
            ));
        }
        Ok(())
    }

    /// Verifies the file signature without consuming any records.
    /// `Ok(false)` on an empty source.
    pub fn check_file_format(&mut self) -> Result<bool> {
        self.check_healthy()?;
        if self.decoder.index() < self.decoder.num_records() {
            return Ok(true);
        }
        self.src.check_file_format().map_err(|e| {
            if e.is_recoverable() {
                self.recoverable = Recoverable::ChunkReader;
            }
            e
        })
    }

    /// Reads the file metadata. Must be called at the beginning of the
    /// file, before any record has been read; `InvalidArgument`
    /// otherwise. A file without a metadata chunk yields empty metadata.
    pub fn read_metadata(&mut self) -> Result<RecordsMetadata> {
        self.check_healthy()?;
        if self.src.pos() != 0 {
            return Err(Error::invalid_argument(
                "read_metadata must be called at the beginning of the file",
            ));
        }
        let Some(signature) = self.read_chunk_at_src()? else {
            return Ok(RecordsMetadata::empty());
        };
        if signature.header.chunk_type != ChunkType::FileSignature {
            self.recoverable = Recoverable::ChunkReader;
            return Err(Error::data_loss(
                "file does not begin with a file signature chunk",
            ));
        }

        self.chunk_begin = self.src.pos();
        let header = match self.src.pull_chunk_header() {
            Ok(Some(header)) => header,
            Ok(None) => return Ok(RecordsMetadata::empty()),
            Err(e) => {
                if e.is_recoverable() {
                    self.recoverable = Recoverable::ChunkReader;
                }
                return Err(e);
            }
        };
        if header.chunk_type != ChunkType::FileMetadata {
            // No metadata chunk; records start here.
            return Ok(RecordsMetadata::empty());
        }
        let Some(chunk) = self.read_chunk_at_src()? else {
            return Ok(RecordsMetadata::empty());
        };
        match metadata::decode_metadata_chunk(&chunk, self.chunk_begin) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                self.recoverable = Recoverable::ChunkDecoder;
                Err(e)
            }
        }
    }

    /// Returns the next record, or `None` at a healthy end of file.
    pub fn read_record(&mut self) -> Result<Option<Bytes>> {
        self.check_healthy()?;
        loop {
            if let Some(record) = self.decoder.read_record() {
                return Ok(Some(record));
            }
            match self.read_next_chunk() {
                Ok(true) => continue,
                Ok(false) => return Ok(None),
                Err(e) if e.is_recoverable() && self.recovery.is_some() => {
                    if let Some(region) = self.recover()? {
                        if let Some(callback) = self.recovery.as_mut() {
                            callback(&region);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The position of the next record to be read.
    pub fn pos(&self) -> RecordPosition {
        if self.decoder.index() < self.decoder.num_records() {
            RecordPosition::new(self.chunk_begin, self.decoder.index())
        } else {
            RecordPosition::new(self.src.pos(), 0)
        }
    }

    /// The position of the most recently read record.
    ///
    /// Valid only directly after a successful
    /// [`read_record`](Self::read_record).
    pub fn last_pos(&self) -> RecordPosition {
        RecordPosition::new(self.chunk_begin, self.decoder.index().saturating_sub(1))
    }

    /// Seeks to an exact record position.
    ///
    /// Seeking to record 0 of a chunk locates it without reading its
    /// body, so positions at the end of the file are valid targets.
    pub fn seek(&mut self, target: RecordPosition) -> Result<()> {
        self.check_healthy()?;
        if target.chunk_begin() == self.chunk_begin {
            if target.record_index() == 0 || self.src.pos() > self.chunk_begin {
                // Chunk already located (and read, unless index is 0).
                self.decoder.set_index(target.record_index());
                return Ok(());
            }
        } else {
            if let Err(e) = self.src.seek(target.chunk_begin()) {
                self.chunk_begin = self.src.pos();
                self.decoder.reset();
                return Err(e);
            }
            if target.record_index() == 0 {
                self.chunk_begin = self.src.pos();
                self.decoder.reset();
                return Ok(());
            }
        }
        if !self.read_next_chunk()? {
            return Ok(()); // End of file; position is there now.
        }
        self.decoder.set_index(target.record_index());
        Ok(())
    }

    /// Seeks to the record containing numeric position `target`
    /// (`chunk_begin + record_index`), locating the chunk through the
    /// block headers.
    pub fn seek_numeric(&mut self, target: u64) -> Result<()> {
        self.check_healthy()?;
        if target >= self.chunk_begin && target <= self.src.pos() {
            // Inside or just after the current chunk.
            self.decoder.set_index(target - self.chunk_begin);
            return Ok(());
        }
        if let Err(e) = self.src.seek_to_chunk_containing(target) {
            self.chunk_begin = self.src.pos();
            self.decoder.reset();
            if e.is_recoverable() {
                self.recoverable = Recoverable::ChunkReader;
            }
            return Err(e);
        }
        if self.src.pos() >= target {
            // At the chunk begin (or past a gap); no need to read it.
            self.chunk_begin = self.src.pos();
            self.decoder.reset();
            return Ok(());
        }
        if !self.read_next_chunk()? {
            return Ok(());
        }
        self.decoder.set_index(target - self.chunk_begin);
        Ok(())
    }

    /// Total size of the underlying file in bytes.
    pub fn size(&mut self) -> Result<u64> {
        self.src.size()
    }

    /// Consumes the recoverable flag, skips the damage, and returns the
    /// skipped region. `Ok(None)` when the reader was healthy.
    pub fn recover(&mut self) -> Result<Option<SkippedRegion>> {
        match std::mem::take(&mut self.recoverable) {
            Recoverable::None => Ok(None),
            Recoverable::ChunkReader => self.src.recover(),
            Recoverable::ChunkDecoder => {
                let index_before = self.decoder.index();
                self.decoder.reset();
                let begin = self.chunk_begin + index_before;
                let end = self.pos().numeric();
                Ok(Some(SkippedRegion::new(begin, end)))
            }
        }
    }

    /// The pending recovery state, if any.
    pub fn recoverable(&self) -> Recoverable {
        self.recoverable
    }

    pub fn into_src(self) -> R {
        self.src.into_src()
    }

    /// Reads and decodes the chunk at the current source position.
    /// `Ok(false)` at a healthy end of file.
    fn read_next_chunk(&mut self) -> Result<bool> {
        self.chunk_begin = self.src.pos();
        let Some(chunk) = self.read_chunk_at_src()? else {
            return Ok(false);
        };
        if let Err(e) = self.decoder.reset_chunk(&chunk, self.chunk_begin) {
            tracing::warn!(chunk_begin = self.chunk_begin, "chunk failed to decode");
            self.recoverable = Recoverable::ChunkDecoder;
            return Err(e);
        }
        Ok(true)
    }

    /// `src.read_chunk` with the chunk-reader recovery flag attached.
    fn read_chunk_at_src(&mut self) -> Result<Option<riegeli_chunk::Chunk>> {
        match self.src.read_chunk() {
            Ok(chunk) => Ok(chunk),
            Err(e) => {
                self.decoder.reset();
                if e.is_recoverable() {
                    self.recoverable = Recoverable::ChunkReader;
                }
                Err(e)
            }
        }
    }
}
