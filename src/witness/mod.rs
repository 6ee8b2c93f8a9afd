//! The Witness Service (spec §4.3, C8): packages a minimal self-contained
//! archive proving one anchor commit's inclusion, and re-verifies one.
//!
//! Grounded on the teacher's `semaphore::Proof` decode/verify pair in
//! spirit (assemble a structure, then walk it back to check an equality),
//! reworked around content-addressed blocks: the "proof" here is a chain
//! of block store reads rather than a zk-SNARK.

use cid::Cid;
use serde::{Deserialize, Serialize};

use crate::block_store::{AnchorCommit, BlockStore, Proof, RawBlockStore};
use crate::error::InvalidWitness;
use crate::merkle::{parse_path, MerkleNode};

/// A content-addressed archive (CAR-like, spec §6): an ordered block list
/// plus a roots list. Hand-rolled rather than pulled from a CAR crate —
/// none exists anywhere in the corpus this was grounded on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WitnessArchive {
    pub roots: Vec<Cid>,
    pub blocks: Vec<(Cid, Vec<u8>)>,
}

impl WitnessArchive {
    fn push_block_if_absent(&mut self, cid: Cid, bytes: Vec<u8>) {
        if !self.blocks.iter().any(|(existing, _)| *existing == cid) {
            self.blocks.push((cid, bytes));
        }
    }

    /// Looks up a block by CID, recomputing its hash to confirm the bytes
    /// actually belong to that CID. A tampered block therefore either
    /// hashes to a different CID than any requested (lookup fails) or, if
    /// by chance its CID key still matches the request, fails this check
    /// (spec §8 tampering invariant).
    pub fn get(&self, cid: &Cid) -> Option<&[u8]> {
        let (_, bytes) = self.blocks.iter().find(|(existing, _)| existing == cid)?;
        (crate::cidutil::cid_for(bytes) == *cid).then_some(bytes.as_slice())
    }
}

/// Builds a witness archive for `anchor_commit_cid` by reading the
/// anchor commit, its proof, its Merkle root, and every internal node on
/// the root-to-leaf path out of `store` (spec §4.3 `buildWitness`).
pub async fn build_witness<S>(
    store: &BlockStore<S>,
    anchor_commit_cid: Cid,
) -> anyhow::Result<WitnessArchive>
where
    S: RawBlockStore,
{
    let mut archive = WitnessArchive::default();

    let commit_bytes = store
        .get(&anchor_commit_cid)
        .await?
        .ok_or_else(|| anyhow::anyhow!("anchor commit {anchor_commit_cid} not found"))?;
    let commit: AnchorCommit = serde_json::from_slice(&commit_bytes)?;
    archive.push_block_if_absent(anchor_commit_cid, commit_bytes);

    let proof_bytes = store
        .get(&commit.proof)
        .await?
        .ok_or_else(|| anyhow::anyhow!("proof {} not found", commit.proof))?;
    let proof: Proof = serde_json::from_slice(&proof_bytes)?;
    archive.push_block_if_absent(commit.proof, proof_bytes);

    let root_cid = proof.root;
    let root_bytes = store
        .get(&root_cid)
        .await?
        .ok_or_else(|| anyhow::anyhow!("merkle root {root_cid} not found"))?;
    archive.push_block_if_absent(root_cid, root_bytes.clone());

    let mut current_bytes = root_bytes;
    for digit in parse_path(&commit.path)? {
        let node: MerkleNode = serde_json::from_slice(&current_bytes)?;
        let next_cid = if digit == 0 { node.left } else { node.right };

        let next_bytes = store
            .get(&next_cid)
            .await?
            .ok_or_else(|| anyhow::anyhow!("internal node {next_cid} not found"))?;
        archive.push_block_if_absent(next_cid, next_bytes.clone());

        current_bytes = next_bytes;
    }

    archive.roots = vec![anchor_commit_cid];
    Ok(archive)
}

/// Walks a witness archive back to its target commit (spec §4.3
/// `verifyWitness`). Returns the anchor commit CID on success.
pub fn verify_witness(archive: &WitnessArchive) -> Result<Cid, InvalidWitness> {
    let anchor_commit_cid = match archive.roots.as_slice() {
        [] => return Err(InvalidWitness::MissingRoot),
        [single] => *single,
        _ => return Err(InvalidWitness::MultipleRoots),
    };

    let commit_bytes = archive
        .get(&anchor_commit_cid)
        .ok_or_else(|| InvalidWitness::MissingAnchorCommit(anchor_commit_cid.to_string()))?;
    let commit: AnchorCommit = serde_json::from_slice(commit_bytes)
        .map_err(|e| InvalidWitness::MalformedPath(e.to_string()))?;

    let proof_bytes = archive
        .get(&commit.proof)
        .ok_or_else(|| InvalidWitness::MissingProof(commit.proof.to_string()))?;
    let proof: Proof = serde_json::from_slice(proof_bytes)
        .map_err(|e| InvalidWitness::MalformedPath(e.to_string()))?;

    let mut current_cid = proof.root;
    let mut current_bytes = archive
        .get(&current_cid)
        .ok_or_else(|| InvalidWitness::MissingMerkleRoot(current_cid.to_string()))?
        .to_vec();

    let digits =
        parse_path(&commit.path).map_err(|e| InvalidWitness::MalformedPath(e.to_string()))?;

    for digit in digits {
        let node: MerkleNode = serde_json::from_slice(&current_bytes)
            .map_err(|e| InvalidWitness::MalformedPath(e.to_string()))?;
        let next_cid = if digit == 0 { node.left } else { node.right };

        let next_bytes = archive
            .get(&next_cid)
            .ok_or_else(|| InvalidWitness::MissingInternalNode(next_cid.to_string()))?;

        current_cid = next_cid;
        current_bytes = next_bytes.to_vec();
    }

    if current_cid != commit.prev {
        return Err(InvalidWitness::TerminalMismatch {
            reached: current_cid.to_string(),
            expected: commit.prev.to_string(),
        });
    }

    Ok(anchor_commit_cid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_store::memory::MemoryBlockStore;
    use crate::orchestrator::candidate::Candidate;

    async fn anchor_one_candidate(
        store: &BlockStore<MemoryBlockStore>,
    ) -> (Cid, crate::merkle::MerkleTree) {
        // The candidate's tip CID must already resolve in the store, the
        // same way a client's previously-published stream commit would.
        let cid = store.put(test_utils::random_bytes32().to_vec()).await.unwrap();
        let candidate = Candidate::for_test(test_utils::random_cid(), cid);
        let tree = crate::merkle::build(store, &[candidate], 0).await.unwrap();
        (cid, tree)
    }

    #[tokio::test]
    async fn build_then_verify_round_trips_to_the_anchor_commit() {
        let store = BlockStore::new(MemoryBlockStore::new());
        let (tip_cid, tree) = anchor_one_candidate(&store).await;

        let proof = Proof {
            block_number: 100,
            block_timestamp: 1_700_000_000,
            root: tree.root,
            chain_id: 1,
            tx_hash: test_utils::random_cid(),
            tx_type: None,
        };
        let proof_cid = store.store_record(&proof).await.unwrap();

        let commit = AnchorCommit {
            id: test_utils::random_cid(),
            prev: tip_cid,
            proof: proof_cid,
            path: tree.leaf_paths[0].clone(),
        };
        let commit_cid = store
            .publish_anchor_commit(&commit, &commit.id)
            .await
            .unwrap();

        let archive = build_witness(&store, commit_cid).await.unwrap();
        let verified = verify_witness(&archive).unwrap();

        assert_eq!(verified, commit_cid);
    }

    #[tokio::test]
    async fn flipping_a_block_byte_breaks_verification() {
        let store = BlockStore::new(MemoryBlockStore::new());
        let (tip_cid, tree) = anchor_one_candidate(&store).await;

        let proof = Proof {
            block_number: 1,
            block_timestamp: 1,
            root: tree.root,
            chain_id: 1,
            tx_hash: test_utils::random_cid(),
            tx_type: None,
        };
        let proof_cid = store.store_record(&proof).await.unwrap();
        let commit = AnchorCommit {
            id: test_utils::random_cid(),
            prev: tip_cid,
            proof: proof_cid,
            path: tree.leaf_paths[0].clone(),
        };
        let commit_cid = store
            .publish_anchor_commit(&commit, &commit.id)
            .await
            .unwrap();

        let mut archive = build_witness(&store, commit_cid).await.unwrap();
        archive.blocks[0].1[0] ^= 0xFF;

        // The archive is self-contained, so the flipped byte doesn't move
        // the commit CID archives are looked up by; decoding either fails
        // outright or no longer round-trips to `prev`.
        let result = verify_witness(&archive);
        assert!(result.is_err() || result.unwrap() != commit_cid);
    }

    #[test]
    fn missing_root_is_rejected() {
        let archive = WitnessArchive::default();
        assert_eq!(verify_witness(&archive), Err(InvalidWitness::MissingRoot));
    }
}
