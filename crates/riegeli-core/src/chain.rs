//! Chain - A Rope of Reference-Counted Byte Blocks
//!
//! `Chain` is the buffer currency of the encode/decode pipeline: an ordered
//! sequence of immutable [`Bytes`] blocks behaving as one logical byte
//! string with cheap concatenation.
//!
//! ## Why a rope?
//!
//! Chunk payloads are assembled from many fragments (size vectors, field
//! buffers, record bytes) and torn back apart on read. Holding them as
//! `Bytes` blocks means:
//!
//! - appending a large buffer is a reference count bump, not a copy
//! - `substr` hands out zero-copy views
//! - a chunk's data can flow from the compressor to the hash to the file
//!   without flattening
//!
//! ## Copy threshold
//!
//! Fragments of up to [`MAX_BYTES_TO_COPY`] bytes are copied into an open
//! tail block instead of becoming blocks of their own, so chains of many
//! tiny appends stay compact. Larger fragments are shared by reference.
//!
//! ## Thread safety
//!
//! Blocks are atomically reference counted and may be shared across
//! threads; a `Chain` instance itself is single-owner and not
//! synchronized.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;

use bytes::{Bytes, BytesMut};

/// Fragments at or under this size are copied instead of shared.
pub const MAX_BYTES_TO_COPY: usize = 255;

/// Capacity of freshly allocated tail blocks.
const TAIL_CAPACITY: usize = 4096;

/// An ordered sequence of immutable byte blocks acting as one byte string.
#[derive(Clone, Default)]
pub struct Chain {
    /// Closed blocks, in order.
    blocks: VecDeque<Bytes>,
    /// Open tail block absorbing small appends. Always logically last.
    tail: BytesMut,
    len: usize,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.tail.clear();
        self.len = 0;
    }

    /// Append a byte slice, copying it.
    ///
    /// Small slices coalesce into the tail block; larger ones get a block
    /// of their own.
    pub fn append_slice(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if data.len() <= MAX_BYTES_TO_COPY {
            if self.tail.capacity() - self.tail.len() < data.len() {
                self.close_tail();
                self.tail.reserve(TAIL_CAPACITY);
            }
            self.tail.extend_from_slice(data);
        } else {
            self.close_tail();
            self.blocks.push_back(Bytes::copy_from_slice(data));
        }
        self.len += data.len();
    }

    /// Append shared bytes without copying (unless small enough to inline).
    pub fn append_bytes(&mut self, data: Bytes) {
        if data.len() <= MAX_BYTES_TO_COPY {
            self.append_slice(&data);
            return;
        }
        self.close_tail();
        self.len += data.len();
        self.blocks.push_back(data);
    }

    /// Append another chain; its blocks are shared, not copied.
    pub fn append_chain(&mut self, mut other: Chain) {
        other.close_tail();
        self.close_tail();
        self.len += other.len;
        self.blocks.append(&mut other.blocks);
    }

    /// Prepend a byte slice, copying it into a new front block.
    pub fn prepend_slice(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.len += data.len();
        self.blocks.push_front(Bytes::copy_from_slice(data));
    }

    /// Prepend shared bytes without copying.
    pub fn prepend_bytes(&mut self, data: Bytes) {
        if data.is_empty() {
            return;
        }
        self.len += data.len();
        self.blocks.push_front(data);
    }

    /// Prepend another chain in front of this one.
    pub fn prepend_chain(&mut self, mut other: Chain) {
        other.close_tail();
        self.len += other.len;
        while let Some(block) = other.blocks.pop_back() {
            self.blocks.push_front(block);
        }
    }

    /// The whole chain as one contiguous slice, if it already is one.
    pub fn try_flat(&self) -> Option<&[u8]> {
        match (self.blocks.len(), self.tail.is_empty()) {
            (0, true) => Some(&[]),
            (0, false) => Some(&self.tail),
            (1, true) => Some(&self.blocks[0]),
            _ => None,
        }
    }

    /// Flatten into a single `Bytes`. Zero-copy when already flat.
    pub fn to_bytes(&self) -> Bytes {
        if self.blocks.len() == 1 && self.tail.is_empty() {
            return self.blocks[0].clone();
        }
        let mut flat = BytesMut::with_capacity(self.len);
        for block in self.blocks() {
            flat.extend_from_slice(block);
        }
        flat.freeze()
    }

    /// A zero-copy sub-chain covering `range` of the logical bytes.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds or inverted.
    pub fn substr(&self, range: Range<usize>) -> Chain {
        assert!(range.start <= range.end && range.end <= self.len);
        let mut result = Chain::new();
        let mut skip = range.start;
        let mut take = range.end - range.start;
        for block in self.blocks.iter() {
            if take == 0 {
                break;
            }
            if skip >= block.len() {
                skip -= block.len();
                continue;
            }
            let end = (skip + take).min(block.len());
            result.append_bytes(block.slice(skip..end));
            take -= end - skip;
            skip = 0;
        }
        if take > 0 {
            let start = skip;
            result.append_slice(&self.tail[start..start + take]);
        }
        result
    }

    /// The blocks as shared handles, in order. Cheap for closed blocks;
    /// the open tail (if any) is copied once.
    pub fn share_blocks(&self) -> Vec<Bytes> {
        let mut shared: Vec<Bytes> = self.blocks.iter().cloned().collect();
        if !self.tail.is_empty() {
            shared.push(Bytes::copy_from_slice(&self.tail));
        }
        shared
    }

    /// Iterate over the blocks in order.
    pub fn blocks(&self) -> impl Iterator<Item = &[u8]> {
        self.blocks
            .iter()
            .map(|block| block.as_ref())
            .chain(std::iter::once(self.tail.as_ref()).filter(|tail: &&[u8]| !tail.is_empty()))
    }

    fn close_tail(&mut self) {
        if !self.tail.is_empty() {
            self.blocks.push_back(self.tail.split().freeze());
        }
    }
}

impl From<Bytes> for Chain {
    fn from(data: Bytes) -> Self {
        let mut chain = Chain::new();
        chain.append_bytes(data);
        chain
    }
}

impl From<Vec<u8>> for Chain {
    fn from(data: Vec<u8>) -> Self {
        Chain::from(Bytes::from(data))
    }
}

impl From<&[u8]> for Chain {
    fn from(data: &[u8]) -> Self {
        let mut chain = Chain::new();
        chain.append_slice(data);
        chain
    }
}

impl PartialEq for Chain {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Chain {}

impl PartialEq<[u8]> for Chain {
    fn eq(&self, other: &[u8]) -> bool {
        self.len == other.len() && self.to_bytes().as_ref() == other
    }
}

impl PartialEq<&[u8]> for Chain {
    fn eq(&self, other: &&[u8]) -> bool {
        self == *other
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.len)
            .field("blocks", &(self.blocks.len() + usize::from(!self.tail.is_empty())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Append / prepend
    // ---------------------------------------------------------------

    #[test]
    fn test_empty_chain() {
        let chain = Chain::new();
        assert_eq!(chain.len(), 0);
        assert!(chain.is_empty());
        assert_eq!(chain.try_flat(), Some(&[][..]));
        assert_eq!(chain.to_bytes(), Bytes::new());
    }

    #[test]
    fn test_append_slice_roundtrip() {
        let mut chain = Chain::new();
        chain.append_slice(b"hello ");
        chain.append_slice(b"world");
        assert_eq!(chain.len(), 11);
        assert_eq!(chain, &b"hello world"[..]);
    }

    #[test]
    fn test_small_appends_coalesce() {
        let mut chain = Chain::new();
        for _ in 0..100 {
            chain.append_slice(b"ab");
        }
        assert_eq!(chain.len(), 200);
        // All 100 fragments fit in one open tail block.
        assert_eq!(chain.blocks().count(), 1);
    }

    #[test]
    fn test_large_append_is_shared() {
        let big = Bytes::from(vec![7u8; 10_000]);
        let mut chain = Chain::new();
        chain.append_slice(b"head");
        chain.append_bytes(big.clone());
        assert_eq!(chain.len(), 10_004);
        // The large block is kept as-is, not copied into the tail.
        assert!(chain.blocks().any(|b| b.len() == 10_000));
    }

    #[test]
    fn test_append_at_copy_threshold() {
        let mut chain = Chain::new();
        chain.append_bytes(Bytes::from(vec![1u8; MAX_BYTES_TO_COPY]));
        chain.append_bytes(Bytes::from(vec![2u8; MAX_BYTES_TO_COPY + 1]));
        assert_eq!(chain.len(), 2 * MAX_BYTES_TO_COPY + 1);
        let flat = chain.to_bytes();
        assert_eq!(&flat[..MAX_BYTES_TO_COPY], &vec![1u8; MAX_BYTES_TO_COPY][..]);
        assert_eq!(&flat[MAX_BYTES_TO_COPY..], &vec![2u8; MAX_BYTES_TO_COPY + 1][..]);
    }

    #[test]
    fn test_prepend() {
        let mut chain = Chain::from(&b"world"[..]);
        chain.prepend_slice(b"hello ");
        assert_eq!(chain, &b"hello world"[..]);
    }

    #[test]
    fn test_append_chain() {
        let mut left = Chain::from(&b"left|"[..]);
        let right = Chain::from(&b"right"[..]);
        left.append_chain(right);
        assert_eq!(left, &b"left|right"[..]);
    }

    #[test]
    fn test_prepend_chain_keeps_order() {
        let mut chain = Chain::from(&b"tail"[..]);
        let mut front = Chain::new();
        front.append_bytes(Bytes::from(vec![b'a'; 300]));
        front.append_bytes(Bytes::from(vec![b'b'; 300]));
        chain.prepend_chain(front);
        let flat = chain.to_bytes();
        assert_eq!(&flat[..300], &vec![b'a'; 300][..]);
        assert_eq!(&flat[300..600], &vec![b'b'; 300][..]);
        assert_eq!(&flat[600..], b"tail");
    }

    // ---------------------------------------------------------------
    // Views
    // ---------------------------------------------------------------

    #[test]
    fn test_try_flat_single_block() {
        let chain = Chain::from(Bytes::from(vec![3u8; 1000]));
        assert_eq!(chain.try_flat().map(|s| s.len()), Some(1000));
    }

    #[test]
    fn test_try_flat_multi_block() {
        let mut chain = Chain::from(Bytes::from(vec![3u8; 1000]));
        chain.append_bytes(Bytes::from(vec![4u8; 1000]));
        assert!(chain.try_flat().is_none());
    }

    #[test]
    fn test_substr_within_one_block() {
        let chain = Chain::from(&b"hello world"[..]);
        assert_eq!(chain.substr(6..11), &b"world"[..]);
    }

    #[test]
    fn test_substr_across_blocks() {
        let mut chain = Chain::new();
        chain.append_bytes(Bytes::from(vec![b'x'; 300]));
        chain.append_bytes(Bytes::from(vec![b'y'; 300]));
        chain.append_slice(b"end");
        let sub = chain.substr(299..302);
        assert_eq!(sub, &b"xyy"[..]);
        let tail = chain.substr(600..603);
        assert_eq!(tail, &b"end"[..]);
    }

    #[test]
    fn test_substr_full_and_empty() {
        let chain = Chain::from(&b"abc"[..]);
        assert_eq!(chain.substr(0..3), chain);
        assert!(chain.substr(1..1).is_empty());
    }

    #[test]
    fn test_blocks_iteration_covers_everything() {
        let mut chain = Chain::new();
        chain.append_slice(b"small");
        chain.append_bytes(Bytes::from(vec![9u8; 999]));
        chain.append_slice(b"more");
        let total: usize = chain.blocks().map(|b| b.len()).sum();
        assert_eq!(total, chain.len());
    }

    #[test]
    fn test_clear() {
        let mut chain = Chain::from(&b"data"[..]);
        chain.clear();
        assert!(chain.is_empty());
        assert_eq!(chain.blocks().count(), 0);
    }

    #[test]
    fn test_clone_shares_blocks() {
        let big = Bytes::from(vec![5u8; 4096]);
        let mut chain = Chain::new();
        chain.append_bytes(big);
        let copy = chain.clone();
        assert_eq!(chain, copy);
    }
}
