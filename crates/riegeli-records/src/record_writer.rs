//! Record Writing
//!
//! [`RecordWriter`] batches records into chunks and streams them through
//! a [`ChunkWriter`]. A new file always opens with the signature chunk,
//! optionally followed by the metadata chunk. The chunk closer is a
//! decoded-size threshold: once the open batch holds `chunk_size` bytes
//! of records it is encoded and written (or handed to the encode pool in
//! parallel mode).
//!
//! ## Example
//!
//! ```ignore
//! use riegeli_records::{RecordWriter, RecordWriterOptions};
//! use riegeli_core::ChainWriter;
//!
//! let options = RecordWriterOptions {
//!     transpose: true,
//!     ..Default::default()
//! };
//! let mut writer = RecordWriter::new(ChainWriter::new(), options)?;
//! for record in records {
//!     writer.write_record(&record)?;
//! }
//! let dest = writer.close()?;
//! ```
//!
//! ## Ordering in parallel mode
//!
//! With `parallelism > 0`, batches are encoded by worker threads but the
//! file always holds them in submission order; `flush` and `close` block
//! until the pool has drained. Record positions are only available in
//! serial mode, where the open chunk's begin offset is already known.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use riegeli_chunk::{Chunk, ChunkEncoder, CompressorOptions};
use riegeli_core::{Error, Result, Writer};

use crate::chunk_writer::ChunkWriter;
use crate::encode_pool::EncodePool;
use crate::metadata;
use crate::position::RecordPosition;

/// Default chunk closer threshold: 1 MiB of decoded records.
const DEFAULT_CHUNK_SIZE: u64 = 1 << 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordWriterOptions {
    /// Chunk payload compression.
    #[serde(default)]
    pub compression: CompressorOptions,

    /// Close the open chunk once it holds this many decoded bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Lay chunks out transposed (column-wise by field) instead of
    /// simple.
    #[serde(default)]
    pub transpose: bool,

    /// Number of encode worker threads; 0 encodes in line.
    #[serde(default)]
    pub parallelism: u32,

    /// Pad with a padding chunk to a 64 KiB boundary on flush and close.
    #[serde(default)]
    pub pad_to_block_boundary: bool,

    /// Serialized record-type metadata to write after the signature.
    #[serde(skip)]
    pub metadata: Option<Bytes>,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

impl Default for RecordWriterOptions {
    fn default() -> Self {
        Self {
            compression: CompressorOptions::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            transpose: false,
            parallelism: 0,
            pad_to_block_boundary: false,
            metadata: None,
        }
    }
}

enum Sink<W: Writer + Send + 'static> {
    Serial(ChunkWriter<W>),
    Parallel(EncodePool<W>),
    /// Transient state during close, and the terminal state after a
    /// fatal error.
    Finished,
}

/// Batches records into chunks and writes a container file.
pub struct RecordWriter<W: Writer + Send + 'static> {
    sink: Sink<W>,
    options: RecordWriterOptions,
    batch: ChunkEncoder,
    /// Begin offset of the open chunk; exact in serial mode only.
    chunk_begin: Option<u64>,
    last_pos: Option<RecordPosition>,
    healthy: bool,
}

impl<W: Writer + Send + 'static> RecordWriter<W> {
    /// Opens a writer over `dest` (positioned at 0) and writes the
    /// signature (and metadata, when configured) immediately.
    pub fn new(dest: W, options: RecordWriterOptions) -> Result<Self> {
        let mut chunk_writer = ChunkWriter::new(dest);
        chunk_writer.write_chunk(&Chunk::file_signature())?;
        if let Some(serialized) = &options.metadata {
            let chunk = metadata::encode_metadata_chunk(serialized, options.compression)?;
            chunk_writer.write_chunk(&chunk)?;
        }
        let chunk_begin = (options.parallelism == 0).then(|| chunk_writer.pos());
        let sink = if options.parallelism == 0 {
            Sink::Serial(chunk_writer)
        } else {
            Sink::Parallel(EncodePool::start(chunk_writer, options.parallelism)?)
        };
        let batch = ChunkEncoder::new(options.transpose, options.compression);
        Ok(Self {
            sink,
            options,
            batch,
            chunk_begin,
            last_pos: None,
            healthy: true,
        })
    }

    /// Appends one record.
    pub fn write_record(&mut self, record: &[u8]) -> Result<()> {
        self.check_healthy()?;
        if let Err(e) = self.batch.add_record(record) {
            self.healthy = false;
            return Err(e);
        }
        if let Some(begin) = self.chunk_begin {
            self.last_pos = Some(RecordPosition::new(begin, self.batch.num_records() - 1));
        }
        if self.batch.decoded_size() >= self.options.chunk_size {
            self.close_chunk()?;
        }
        Ok(())
    }

    /// Position of the most recently written record; serial mode only.
    pub fn last_pos(&self) -> Option<RecordPosition> {
        self.last_pos
    }

    /// Position the next record will receive; serial mode only.
    pub fn pos(&self) -> Option<RecordPosition> {
        self.chunk_begin
            .map(|begin| RecordPosition::new(begin, self.batch.num_records()))
    }

    /// Closes the open chunk and makes everything written so far
    /// durable; pads to a block boundary when configured.
    pub fn flush(&mut self) -> Result<()> {
        self.check_healthy()?;
        self.close_chunk()?;
        let result = match &mut self.sink {
            Sink::Serial(writer) => {
                if self.options.pad_to_block_boundary {
                    writer.pad_to_block_boundary()?;
                }
                writer.flush()
            }
            Sink::Parallel(pool) => {
                if self.options.pad_to_block_boundary {
                    pool.pad_to_block_boundary()?;
                }
                pool.sync()
            }
            Sink::Finished => Err(Error::internal("record writer already closed")),
        };
        if let Err(e) = result {
            self.healthy = false;
            return Err(e);
        }
        if let Sink::Serial(writer) = &self.sink {
            self.chunk_begin = Some(writer.pos());
        }
        Ok(())
    }

    /// Flushes, drains any workers, and returns the destination.
    pub fn close(mut self) -> Result<W> {
        self.flush()?;
        match std::mem::replace(&mut self.sink, Sink::Finished) {
            Sink::Serial(writer) => Ok(writer.into_dest()),
            Sink::Parallel(pool) => Ok(pool.shutdown()?.into_dest()),
            Sink::Finished => Err(Error::internal("record writer already closed")),
        }
    }

    /// Encodes and dispatches the open batch, if any.
    fn close_chunk(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(
            &mut self.batch,
            ChunkEncoder::new(self.options.transpose, self.options.compression),
        );
        let result = match &mut self.sink {
            Sink::Serial(writer) => batch
                .encode()
                .and_then(|chunk| writer.write_chunk(&chunk)),
            Sink::Parallel(pool) => pool.submit(batch),
            Sink::Finished => Err(Error::internal("record writer already closed")),
        };
        if let Err(e) = result {
            self.healthy = false;
            return Err(e);
        }
        if let Sink::Serial(writer) = &self.sink {
            self.chunk_begin = Some(writer.pos());
        }
        Ok(())
    }

    fn check_healthy(&self) -> Result<()> {
        if !self.healthy {
            return Err(Error::invalid_argument(
                "record writer failed earlier and was not closed",
            ));
        }
        Ok(())
    }
}
