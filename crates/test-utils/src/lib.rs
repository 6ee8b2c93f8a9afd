//! Shared test utilities for anchor-sequencer.

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use rand::RngCore;

/// Raw codec tag used for the opaque blocks this service writes.
const RAW_CODEC: u64 = 0x55;

/// Builds a content-addressed identifier for arbitrary bytes, the same way
/// the block store adapter does it in production.
pub fn cid_for(bytes: &[u8]) -> Cid {
    let digest = Code::Sha2_256.digest(bytes);
    Cid::new_v1(RAW_CODEC, digest)
}

/// A CID over random bytes, useful as a filler stream id or commit CID in
/// tests that don't care about the referenced content.
pub fn random_cid() -> Cid {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    cid_for(&bytes)
}

/// 32 random bytes, e.g. for a fake transaction hash.
pub fn random_bytes32() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cid_for_is_deterministic() {
        assert_eq!(cid_for(b"hello"), cid_for(b"hello"));
        assert_ne!(cid_for(b"hello"), cid_for(b"world"));
    }
}
