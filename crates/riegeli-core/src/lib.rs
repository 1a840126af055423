//! Core primitives shared by the Riegeli container crates.
//!
//! This crate holds everything below the chunk layer:
//!
//! - [`Error`] / [`Result`]: the error taxonomy of the whole workspace
//! - [`varint`]: LEB128 encoding used throughout the file format
//! - [`hash`]: the keyed 64-bit HighwayHash MAC used for all checksums
//! - [`Chain`]: a rope of reference-counted byte blocks with cheap
//!   concatenation
//! - [`Reader`] / [`Writer`]: cursor-based byte stream abstractions over
//!   flat buffers, chains, and `std::io` handles
//! - [`ChainBackwardWriter`]: a prepend-only writer, required by the
//!   transposed chunk decoder

pub mod backward_writer;
pub mod chain;
pub mod error;
pub mod hash;
pub mod reader;
pub mod varint;
pub mod writer;

pub use backward_writer::ChainBackwardWriter;
pub use chain::Chain;
pub use error::{Error, Result};
pub use reader::{BytesReader, ChainReader, IoReader, Reader};
pub use writer::{ChainWriter, IoWriter, Writer};
