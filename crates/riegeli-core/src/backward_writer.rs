//! Backward Writing
//!
//! [`ChainBackwardWriter`] writes from high to low addresses: every
//! prepend lands in front of everything written before. The transposed
//! chunk decoder depends on this: it replays a record's fields in
//! reverse, so when it reaches a submessage's opening tag the length of
//! the already-written content is known and can be prepended as a varint.
//!
//! ## How it works
//!
//! A front block is filled from its end toward its start. When a prepend
//! does not fit in the remaining headroom, the live region of the front
//! block is frozen and pushed onto the finished list, and the write goes
//! to a fresh block, sized exactly for the request when it exceeds the
//! normal block size (the scratch path), so one contiguous span is always
//! produced. `finish` stitches the blocks into a [`Chain`] in forward
//! order.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::chain::Chain;
use crate::varint;

/// Capacity of freshly allocated front blocks.
const BLOCK_CAPACITY: usize = 4096;

/// A prepend-only writer producing a [`Chain`].
pub struct ChainBackwardWriter {
    /// Front block; `front[front_pos..]` is live data.
    front: Vec<u8>,
    front_pos: usize,
    /// Finished blocks in forward (output) order, all after the front.
    done: VecDeque<Bytes>,
    len: u64,
}

impl Default for ChainBackwardWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainBackwardWriter {
    pub fn new() -> Self {
        Self {
            front: Vec::new(),
            front_pos: 0,
            done: VecDeque::new(),
            len: 0,
        }
    }

    /// Total bytes written.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Writes `data` in front of everything written so far.
    pub fn prepend_slice(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if data.len() <= self.front_pos {
            let start = self.front_pos - data.len();
            self.front[start..self.front_pos].copy_from_slice(data);
            self.front_pos = start;
        } else {
            self.rotate_front();
            if data.len() >= BLOCK_CAPACITY {
                // Scratch path: a dedicated block sized for the span.
                self.done.push_front(Bytes::copy_from_slice(data));
            } else {
                self.front = vec![0; BLOCK_CAPACITY];
                self.front_pos = BLOCK_CAPACITY - data.len();
                self.front[self.front_pos..].copy_from_slice(data);
            }
        }
        self.len += data.len() as u64;
    }

    pub fn prepend_u8(&mut self, byte: u8) {
        self.prepend_slice(&[byte]);
    }

    /// Prepends a LEB128 varint.
    pub fn prepend_varint_u64(&mut self, value: u64) {
        let mut buf = [0u8; varint::MAX_LEN_U64];
        let mut cursor = &mut buf[..];
        varint::write_u64(&mut cursor, value);
        let written = varint::MAX_LEN_U64 - cursor.len();
        self.prepend_slice(&buf[..written]);
    }

    /// Finalizes into a chain reading front to back.
    pub fn finish(mut self) -> Chain {
        self.rotate_front();
        let mut chain = Chain::new();
        for block in self.done {
            chain.append_bytes(block);
        }
        chain
    }

    /// Freezes the live region of the front block onto the finished list.
    fn rotate_front(&mut self) {
        if self.front_pos < self.front.len() {
            let live = Bytes::copy_from_slice(&self.front[self.front_pos..]);
            self.done.push_front(live);
        }
        self.front = Vec::new();
        self.front_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_order() {
        let mut writer = ChainBackwardWriter::new();
        writer.prepend_slice(b"world");
        writer.prepend_slice(b"hello ");
        assert_eq!(writer.len(), 11);
        assert_eq!(writer.finish(), &b"hello world"[..]);
    }

    #[test]
    fn test_empty_writer() {
        let writer = ChainBackwardWriter::new();
        assert!(writer.is_empty());
        assert!(writer.finish().is_empty());
    }

    #[test]
    fn test_prepend_u8_and_varint() {
        let mut writer = ChainBackwardWriter::new();
        writer.prepend_slice(b"tail");
        writer.prepend_varint_u64(300);
        writer.prepend_u8(0x42);
        let flat = writer.finish().to_bytes();
        assert_eq!(flat[0], 0x42);
        assert_eq!(
            riegeli_varint_read(&flat[1..3]),
            Some(300),
            "varint bytes: {:?}",
            &flat[1..3]
        );
        assert_eq!(&flat[3..], b"tail");
    }

    fn riegeli_varint_read(mut bytes: &[u8]) -> Option<u64> {
        varint::read_u64(&mut bytes)
    }

    #[test]
    fn test_block_rotation() {
        let mut writer = ChainBackwardWriter::new();
        // Many small prepends crossing several block rotations.
        for i in (0u32..3000).rev() {
            writer.prepend_slice(&i.to_le_bytes());
        }
        let flat = writer.finish().to_bytes();
        assert_eq!(flat.len(), 12_000);
        for i in 0u32..3000 {
            let at = i as usize * 4;
            assert_eq!(u32::from_le_bytes(flat[at..at + 4].try_into().unwrap()), i);
        }
    }

    #[test]
    fn test_scratch_path_large_span() {
        let mut writer = ChainBackwardWriter::new();
        writer.prepend_slice(b"suffix");
        let big = vec![9u8; BLOCK_CAPACITY * 2];
        writer.prepend_slice(&big);
        writer.prepend_slice(b"prefix");
        let flat = writer.finish().to_bytes();
        assert_eq!(&flat[..6], b"prefix");
        assert_eq!(&flat[6..6 + big.len()], &big[..]);
        assert_eq!(&flat[6 + big.len()..], b"suffix");
    }

    #[test]
    fn test_len_tracks_all_paths() {
        let mut writer = ChainBackwardWriter::new();
        writer.prepend_slice(&[1u8; 10]);
        writer.prepend_slice(&[2u8; BLOCK_CAPACITY + 1]);
        writer.prepend_slice(&[3u8; 10]);
        assert_eq!(writer.len(), 10 + BLOCK_CAPACITY as u64 + 1 + 10);
        assert_eq!(writer.finish().len(), BLOCK_CAPACITY + 21);
    }
}
