//! Small CID/hashing helpers shared across the content-addressed modules.

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};

/// Raw codec tag (multicodec `0x55`) used for every opaque block this
/// service writes — internal Merkle nodes, bloom filters, proofs, anchor
/// commits. Matches the tag `block_store::memory::MemoryBlockStore` and
/// `block_store::http::HttpBlockStore` both key blocks under.
pub const RAW_CODEC: u64 = 0x55;

/// Computes the CID a [`crate::block_store::RawBlockStore`] would assign to
/// `bytes`, without writing it. Used where the bloom filter needs a stable
/// digest over a CID's own bytes, not over the block store itself.
pub fn sha256(bytes: &[u8]) -> Vec<u8> {
    Code::Sha2_256.digest(bytes).digest().to_vec()
}

/// The CID `bytes` would be addressed by if written through the block
/// store today.
pub fn cid_for(bytes: &[u8]) -> Cid {
    Cid::new_v1(RAW_CODEC, Code::Sha2_256.digest(bytes))
}
