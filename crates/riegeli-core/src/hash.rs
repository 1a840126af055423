//! Keyed Hashing for Chunk and Block Headers
//!
//! Every header and data payload in the container is protected by a 64-bit
//! HighwayHash MAC. The key is a fixed constant (the little-endian `u64`
//! readings of the ASCII bytes `"Riegeli/"` and `"records\n"`, repeated)
//! so files hash identically across implementations.

use highway::{HighwayHash, HighwayHasher, Key};

use crate::chain::Chain;

/// The fixed container hash key: `"Riegeli/records\n"` twice, as
/// little-endian u64 words.
const HASH_KEY: [u64; 4] = [
    0x2f69_6c65_6765_6952,
    0x0a73_6472_6f63_6572,
    0x2f69_6c65_6765_6952,
    0x0a73_6472_6f63_6572,
];

/// Hash a contiguous byte slice.
pub fn hash(data: &[u8]) -> u64 {
    let mut hasher = HighwayHasher::new(Key(HASH_KEY));
    hasher.append(data);
    hasher.finalize64()
}

/// Hash a chain, block by block.
///
/// Equal to hashing the flattened bytes: the hasher state only depends on
/// the byte sequence, not on block boundaries.
pub fn hash_chain(data: &Chain) -> u64 {
    let mut hasher = HighwayHasher::new(Key(HASH_KEY));
    for block in data.blocks() {
        hasher.append(block);
    }
    hasher.finalize64()
}
