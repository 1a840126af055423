//! Block Framing
//!
//! The file is partitioned into fixed 64 KiB blocks. Every block begins
//! with a 24-byte header, including block 0, so the file itself starts
//! with one:
//!
//! ```text
//! ┌──────────────┬────────────────┬────────────────┐
//! │ header hash  │ previous chunk │ next chunk     │
//! │ (8 bytes)    │ (8 bytes)      │ (8 bytes)      │
//! └──────────────┴────────────────┴────────────────┘
//! ```
//!
//! For a header at boundary `p` written while chunk `[b, e)` was in
//! progress: `previous_chunk = p - b` and `next_chunk = e - p`. A zero
//! `previous_chunk` means a chunk begins exactly at this boundary. From
//! any boundary a reader can therefore hop to a chunk boundary in one
//! step, which is what makes recovery after corruption bounded.
//!
//! Chunk positions are logical file offsets; block headers are overlaid
//! transparently, so a chunk of logical size `s` starting at `b`
//! physically ends at `b + s` plus 24 bytes for every boundary it
//! covers.

use bytes::{Buf, BufMut};
use riegeli_core::{hash, Error, Result};

/// Size of one block: the resynchronization granularity of the format.
pub const BLOCK_SIZE: u64 = 1 << 16;

/// Encoded size of a block header.
pub const BLOCK_HEADER_SIZE: u64 = 24;

/// Payload bytes carried by one block.
pub const USABLE_BLOCK_SIZE: u64 = BLOCK_SIZE - BLOCK_HEADER_SIZE;

/// Whether `pos` sits exactly on a block boundary.
pub fn is_block_boundary(pos: u64) -> bool {
    pos % BLOCK_SIZE == 0
}

/// The block boundary at or before `pos`.
pub fn block_begin(pos: u64) -> u64 {
    pos - pos % BLOCK_SIZE
}

/// The first block boundary strictly after `pos`.
pub fn next_block_begin(pos: u64) -> u64 {
    block_begin(pos) + BLOCK_SIZE
}

/// Physical end of a chunk of logical size `size` beginning at `begin`,
/// accounting for every interposed block header.
pub fn chunk_end(begin: u64, size: u64) -> u64 {
    let mut pos = begin;
    let mut remaining = size;
    while remaining > 0 {
        if is_block_boundary(pos) {
            pos += BLOCK_HEADER_SIZE;
        }
        let room = BLOCK_SIZE - pos % BLOCK_SIZE;
        let take = remaining.min(room);
        pos += take;
        remaining -= take;
    }
    pos
}

/// Decoded form of a 24-byte block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Distance back to the begin of the chunk in progress; 0 if a chunk
    /// begins at this boundary.
    pub previous_chunk: u64,
    /// Distance forward to the next chunk begin.
    pub next_chunk: u64,
}

impl BlockHeader {
    pub fn encode(&self) -> [u8; BLOCK_HEADER_SIZE as usize] {
        let mut out = [0u8; BLOCK_HEADER_SIZE as usize];
        {
            let mut rest = &mut out[8..];
            rest.put_u64_le(self.previous_chunk);
            rest.put_u64_le(self.next_chunk);
        }
        let header_hash = hash::hash(&out[8..]);
        out[..8].copy_from_slice(&header_hash.to_le_bytes());
        out
    }

    /// Parses and verifies a header read at boundary `pos`.
    pub fn decode(bytes: &[u8], pos: u64) -> Result<BlockHeader> {
        if bytes.len() < BLOCK_HEADER_SIZE as usize {
            return Err(Error::internal("block header slice too short"));
        }
        let mut cursor = &bytes[..BLOCK_HEADER_SIZE as usize];
        let stored_hash = cursor.get_u64_le();
        if stored_hash != hash::hash(&bytes[8..BLOCK_HEADER_SIZE as usize]) {
            return Err(Error::data_loss(format!(
                "invalid block header hash at {pos}"
            )));
        }
        Ok(BlockHeader {
            previous_chunk: cursor.get_u64_le(),
            next_chunk: cursor.get_u64_le(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_helpers() {
        assert!(is_block_boundary(0));
        assert!(is_block_boundary(BLOCK_SIZE));
        assert!(!is_block_boundary(1));
        assert!(!is_block_boundary(BLOCK_SIZE - 1));
        assert_eq!(block_begin(BLOCK_SIZE + 5), BLOCK_SIZE);
        assert_eq!(next_block_begin(0), BLOCK_SIZE);
        assert_eq!(next_block_begin(BLOCK_SIZE), 2 * BLOCK_SIZE);
    }

    #[test]
    fn test_chunk_end_within_block() {
        // A chunk at 0 pays for block 0's header.
        assert_eq!(chunk_end(0, 40), BLOCK_HEADER_SIZE + 40);
        // A chunk in the middle of a block pays nothing extra.
        assert_eq!(chunk_end(100, 40), 140);
    }

    #[test]
    fn test_chunk_end_spanning_blocks() {
        // Starting right after block 0's header, a chunk of exactly the
        // usable size ends on the next boundary.
        assert_eq!(chunk_end(BLOCK_HEADER_SIZE, USABLE_BLOCK_SIZE), BLOCK_SIZE);
        // One byte more crosses into block 1 and pays its header.
        assert_eq!(
            chunk_end(BLOCK_HEADER_SIZE, USABLE_BLOCK_SIZE + 1),
            BLOCK_SIZE + BLOCK_HEADER_SIZE + 1
        );
        // A large chunk pays one header per covered boundary.
        let size = 3 * USABLE_BLOCK_SIZE;
        assert_eq!(chunk_end(BLOCK_HEADER_SIZE, size), 3 * BLOCK_SIZE);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = BlockHeader {
            previous_chunk: 12_345,
            next_chunk: 678,
        };
        let encoded = header.encode();
        assert_eq!(BlockHeader::decode(&encoded, 65536).unwrap(), header);
    }

    #[test]
    fn test_header_hash_detects_flip() {
        let header = BlockHeader {
            previous_chunk: 1,
            next_chunk: 2,
        };
        let mut encoded = header.encode();
        encoded[9] ^= 0x10;
        let err = BlockHeader::decode(&encoded, 131072).unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("131072"));
    }
}
