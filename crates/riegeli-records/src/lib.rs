//! Record layer of the Riegeli container format.
//!
//! A Riegeli file is a sequence of checksummed chunks laid over fixed
//! 64 KiB blocks; each block boundary carries a small header pointing at
//! the surrounding chunk boundaries, so a reader can resynchronize after
//! corruption from any block boundary. This crate implements the file
//! layout and the record-facing API on top of `riegeli-chunk`:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │ RecordWriter / RecordReader      records, positions, recovery      │
//! ├────────────────────────────────────────────────────────────────────┤
//! │ ChunkWriter / ChunkReader        chunks over 64 KiB block framing  │
//! ├────────────────────────────────────────────────────────────────────┤
//! │ Writer / Reader (riegeli-core)   bytes                             │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every position handed out by a reader is a stable
//! [`RecordPosition`]; seeking back to it yields the identical record.
//! Damaged regions surface as `DataLoss` errors that [`RecordReader`]
//! can skip via [`RecordReader::recover`], reporting the
//! [`SkippedRegion`].

pub mod block;
pub mod chunk_reader;
pub mod chunk_writer;
pub mod encode_pool;
pub mod metadata;
pub mod position;
pub mod record_reader;
pub mod record_writer;

pub use block::{BlockHeader, BLOCK_HEADER_SIZE, BLOCK_SIZE};
pub use chunk_reader::ChunkReader;
pub use chunk_writer::ChunkWriter;
pub use metadata::RecordsMetadata;
pub use position::{RecordPosition, SkippedRegion};
pub use record_reader::{RecordReader, RecordReaderOptions, Recoverable};
pub use record_writer::{RecordWriter, RecordWriterOptions};
