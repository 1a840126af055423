//! Byte Stream Writing
//!
//! [`Writer`] is the forward, append-only counterpart of
//! [`Reader`](crate::Reader): a position-tracking sink for slices and
//! chains. The framing layer writes through this trait so files,
//! in-memory chains and test buffers all take the same code path.

use std::io;

use crate::chain::Chain;
use crate::error::Result;

/// Append-only byte sink with position tracking.
pub trait Writer {
    /// Number of bytes written so far.
    fn pos(&self) -> u64;

    fn write_slice(&mut self, data: &[u8]) -> Result<()>;

    /// Writes a chain; block-shared destinations may take the blocks
    /// without copying.
    fn write_chain(&mut self, data: &Chain) -> Result<()> {
        for block in data.blocks() {
            self.write_slice(block)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()>;
}

/// Collects writes into a [`Chain`].
#[derive(Default)]
pub struct ChainWriter {
    dest: Chain,
}

impl ChainWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_chain(self) -> Chain {
        self.dest
    }

    pub fn chain(&self) -> &Chain {
        &self.dest
    }
}

impl Writer for ChainWriter {
    fn pos(&self) -> u64 {
        self.dest.len() as u64
    }

    fn write_slice(&mut self, data: &[u8]) -> Result<()> {
        self.dest.append_slice(data);
        Ok(())
    }

    fn write_chain(&mut self, data: &Chain) -> Result<()> {
        self.dest.append_chain(data.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes to any `io::Write` destination, tracking the position itself.
pub struct IoWriter<W: io::Write> {
    inner: W,
    pos: u64,
}

impl<W: io::Write> IoWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, pos: 0 }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> Writer for IoWriter<W> {
    fn pos(&self) -> u64 {
        self.pos
    }

    fn write_slice(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read as _, Seek as _, Write as _};

    #[test]
    fn test_chain_writer_collects() {
        let mut writer = ChainWriter::new();
        writer.write_slice(b"hello ").unwrap();
        writer.write_slice(b"world").unwrap();
        assert_eq!(writer.pos(), 11);
        assert_eq!(writer.into_chain(), &b"hello world"[..]);
    }

    #[test]
    fn test_chain_writer_write_chain_shares() {
        let mut writer = ChainWriter::new();
        let mut chain = Chain::new();
        chain.append_bytes(bytes::Bytes::from(vec![7u8; 5000]));
        writer.write_chain(&chain).unwrap();
        assert_eq!(writer.pos(), 5000);
        assert_eq!(writer.chain().len(), 5000);
    }

    #[test]
    fn test_io_writer_tracks_position() {
        let mut file = tempfile::tempfile().unwrap();
        {
            let mut writer = IoWriter::new(&mut file);
            writer.write_slice(b"abc").unwrap();
            writer.write_slice(b"defg").unwrap();
            assert_eq!(writer.pos(), 7);
            writer.flush().unwrap();
        }
        file.rewind().unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "abcdefg");
    }
}
